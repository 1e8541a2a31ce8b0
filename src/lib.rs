//! Guideresto – the persistence layer of a restaurant directory.
//!
//! Restaurants live in cities, belong to a culinary type and collect two kinds
//! of evaluation: anonymous likes and dislikes, and signed reviews carrying one
//! grade per evaluation criterion. All of it is stored in SQLite.
//!
//! * An entity never holds another entity. It holds a [`entity::Handle`],
//!   resolved through the identity caches of a [`session::Session`], so a row
//!   loaded twice within a unit of work is the same value both times.
//! * The [`mapper`] facets translate between rows and entities. Every table
//!   carries a `version` column and writes only succeed if the version the
//!   caller read is still the stored one.
//! * Deleting a restaurant removes its grades, reviews and likes first, in that
//!   order, inside one savepoint.
//! * The two kinds of evaluation each have their own table. The
//!   [`mapper::EvaluationMapper`] reads both when the kind is not known.
//!
//! ## Modules
//! * [`entity`] – Entities, handles and the evaluation hierarchy.
//! * [`datatype`] – Row numbers, versions and the column codecs.
//! * [`cache`] – The per-type identity caches.
//! * [`session`] – A unit of work owning the caches and lending out mappers.
//! * [`mapper`] – One data mapper per entity type plus the abstract evaluation lookups.
//! * [`sequence`] – Row number allocation.
//! * [`persist`] – Schema installation and opening the store.
//! * [`transaction`] – Unit of work boundaries and savepoints.
//! * [`service`] – The use cases, each one unit of work.
//! * [`config`] – Settings and logging bootstrap.
//!
//! ## Quick Start
//! ```
//! use guideresto::config::DatabaseSettings;
//! use guideresto::entity::{Address, Restaurant};
//! use guideresto::persist;
//! use guideresto::service::GuideService;
//!
//! let db = persist::open(&DatabaseSettings::default()).unwrap();
//! let mut guide = GuideService::new(&db);
//! let city = guide.create_city("2000", "Neuchâtel").unwrap();
//! let pizzeria = guide.create_restaurant_type("Pizzeria", None).unwrap();
//! let address = Address { street: "Rue du Seyon 1".into(), city };
//! let mario = guide
//!     .add_restaurant(Restaurant::new("Da Mario", None, None, address, pizzeria))
//!     .unwrap();
//! guide.like_restaurant(mario, "192.168.0.1").unwrap();
//! assert_eq!(guide.likes_of(mario.id()).unwrap(), 1);
//! ```

pub mod cache;
pub mod config;
pub mod datatype;
pub mod entity;
pub mod error;
pub mod mapper;
pub mod persist;
pub mod sequence;
pub mod service;
pub mod session;
pub mod transaction;
