use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use guideresto::config::DatabaseSettings;
use guideresto::datatype::Id;
use guideresto::entity::{Address, BasicEvaluation, City, Restaurant, RestaurantType};
use guideresto::mapper::Mapper;
use guideresto::persist;
use guideresto::session::Session;
use rusqlite::Connection;

const RESTAURANTS: usize = 200;

fn populate(db: &Connection) -> Vec<Id> {
    let mut session = Session::new(db);
    let city = session.cities().create(City::new("2000", "Neuchâtel")).unwrap();
    let restaurant_type = session
        .restaurant_types()
        .create(RestaurantType::new("Italien", None))
        .unwrap();
    let visited = chrono::NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
    (0..RESTAURANTS)
        .map(|n| {
            let address = Address {
                street: format!("Rue du Seyon {n}"),
                city,
            };
            let restaurant = session
                .restaurants()
                .create(Restaurant::new(format!("Restaurant {n}"), None, None, address, restaurant_type))
                .unwrap();
            session
                .basic_evaluations()
                .create(BasicEvaluation::new(restaurant, n % 3 != 0, "10.0.0.1", visited))
                .unwrap();
            restaurant.id()
        })
        .collect()
}

fn find_by_id(c: &mut Criterion) {
    let db = persist::open(&DatabaseSettings::default()).unwrap();
    let ids = populate(&db);

    c.bench_function("find_by_id cached", |b| {
        let mut session = Session::new(&db);
        for &id in &ids {
            session.restaurants().find_by_id(id).unwrap();
        }
        b.iter(|| {
            for &id in &ids {
                black_box(session.restaurants().find_by_id(id).unwrap());
            }
        })
    });
    c.bench_function("find_by_id cold", |b| {
        b.iter(|| {
            let mut session = Session::new(&db);
            for &id in &ids {
                black_box(session.restaurants().find_by_id(id).unwrap());
            }
        })
    });
    c.bench_function("count_likes", |b| {
        let mut session = Session::new(&db);
        b.iter(|| {
            for &id in &ids {
                black_box(session.basic_evaluations().count_likes(id).unwrap());
            }
        })
    });
}

criterion_group!(benches, find_by_id);
criterion_main!(benches);
