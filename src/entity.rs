//! The entity graph: plain data objects and the typed handles linking them.
//!
//! Entities never hold other entities. A reference is a [`Handle`], which is
//! the row number of the target plus a type marker; it is resolved through the
//! identity caches of a [`crate::session::Session`]. Two lookups of the same row
//! within a unit of work therefore hand back equal handles, and a change made
//! through `get_mut` on one is seen through the other.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use chrono::NaiveDate;

use crate::datatype::{Id, Score, Version};

// ------------- Handle -------------
pub struct Handle<T> {
    id: Id,
    marker: PhantomData<fn() -> T>,
}
impl<T> Handle<T> {
    pub(crate) fn new(id: Id) -> Self {
        Self {
            id,
            marker: PhantomData,
        }
    }
    pub fn id(&self) -> Id {
        self.id
    }
}
// Derives would put bounds on T, which handles never need.
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Handle<T> {}
impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl<T> Eq for Handle<T> {}
impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
impl<T> Ord for Handle<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}
impl<T> PartialOrd for Handle<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl<T: Entity> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}#{}", T::NAME, self.id)
    }
}
impl<T: Entity> fmt::Display for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}#{}", T::NAME, self.id)
    }
}

// ------------- Entity -------------
pub trait Entity: Clone + fmt::Debug {
    /// Readable name used in errors and logs.
    const NAME: &'static str;
    /// The table the entity is stored in.
    const TABLE: &'static str;
    /// Unassigned until the entity has been created in the store.
    fn id(&self) -> Option<Id>;
    fn version(&self) -> Version;
    fn handle(&self) -> Option<Handle<Self>> {
        self.id().map(Handle::new)
    }
}

// Identity and version bookkeeping is the same for every entity, only the
// mappers may assign either of them.
macro_rules! persistent {
    ($entity:ident, $name:literal, $table:literal) => {
        impl Entity for $entity {
            const NAME: &'static str = $name;
            const TABLE: &'static str = $table;
            fn id(&self) -> Option<Id> {
                self.id
            }
            fn version(&self) -> Version {
                self.version
            }
        }
        impl $entity {
            pub(crate) fn assign(&mut self, id: Id, version: Version) {
                self.id = Some(id);
                self.version = version;
            }
        }
    };
}

// ------------- City -------------
#[derive(Debug, Clone, PartialEq)]
pub struct City {
    id: Option<Id>,
    version: Version,
    pub zip_code: String,
    pub name: String,
    pub(crate) restaurants: BTreeSet<Handle<Restaurant>>,
}
persistent!(City, "city", "VILLES");

impl City {
    pub fn new(zip_code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            version: 0,
            zip_code: zip_code.into(),
            name: name.into(),
            restaurants: BTreeSet::new(),
        }
    }
    /// Restaurants located in this city.
    pub fn restaurants(&self) -> impl Iterator<Item = Handle<Restaurant>> + '_ {
        self.restaurants.iter().copied()
    }
}
impl fmt::Display for City {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.zip_code, self.name)
    }
}

// ------------- RestaurantType -------------
#[derive(Debug, Clone, PartialEq)]
pub struct RestaurantType {
    id: Option<Id>,
    version: Version,
    pub label: String,
    pub description: Option<String>,
    pub(crate) restaurants: BTreeSet<Handle<Restaurant>>,
}
persistent!(RestaurantType, "restaurant type", "TYPES_GASTRONOMIQUES");

impl RestaurantType {
    pub fn new(label: impl Into<String>, description: Option<String>) -> Self {
        Self {
            id: None,
            version: 0,
            label: label.into(),
            description,
            restaurants: BTreeSet::new(),
        }
    }
    pub fn restaurants(&self) -> impl Iterator<Item = Handle<Restaurant>> + '_ {
        self.restaurants.iter().copied()
    }
}

// ------------- EvaluationCriteria -------------
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationCriteria {
    id: Option<Id>,
    version: Version,
    pub name: String,
    pub description: Option<String>,
}
persistent!(EvaluationCriteria, "evaluation criteria", "CRITERES_EVALUATION");

impl EvaluationCriteria {
    pub fn new(name: impl Into<String>, description: Option<String>) -> Self {
        Self {
            id: None,
            version: 0,
            name: name.into(),
            description,
        }
    }
}

// ------------- Restaurant -------------
/// The street address of a restaurant. Owned by the restaurant, stored in its row.
#[derive(Debug, Clone, PartialEq)]
pub struct Address {
    pub street: String,
    pub city: Handle<City>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Restaurant {
    id: Option<Id>,
    version: Version,
    pub name: String,
    pub description: Option<String>,
    pub website: Option<String>,
    pub address: Address,
    pub restaurant_type: Handle<RestaurantType>,
    pub(crate) evaluations: Vec<Evaluation>,
}
persistent!(Restaurant, "restaurant", "RESTAURANTS");

impl Restaurant {
    pub fn new(
        name: impl Into<String>,
        description: Option<String>,
        website: Option<String>,
        address: Address,
        restaurant_type: Handle<RestaurantType>,
    ) -> Self {
        Self {
            id: None,
            version: 0,
            name: name.into(),
            description,
            website,
            address,
            restaurant_type,
            evaluations: Vec::new(),
        }
    }
    /// Evaluations of both kinds, in the order they were written.
    pub fn evaluations(&self) -> &[Evaluation] {
        &self.evaluations
    }
    pub fn has_evaluations(&self) -> bool {
        !self.evaluations.is_empty()
    }
}

// ------------- Evaluations -------------
/// The concrete tables an evaluation can live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvaluationKind {
    Basic,
    Complete,
}
impl EvaluationKind {
    pub fn table(self) -> &'static str {
        match self {
            Self::Basic => BasicEvaluation::TABLE,
            Self::Complete => CompleteEvaluation::TABLE,
        }
    }
    pub fn from_table(table: &str) -> Option<Self> {
        match table {
            t if t == BasicEvaluation::TABLE => Some(Self::Basic),
            t if t == CompleteEvaluation::TABLE => Some(Self::Complete),
            _ => None,
        }
    }
}

/// An evaluation of either kind. Each variant points into its own table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Evaluation {
    Basic(Handle<BasicEvaluation>),
    Complete(Handle<CompleteEvaluation>),
}
impl Evaluation {
    pub fn id(&self) -> Id {
        match self {
            Self::Basic(h) => h.id(),
            Self::Complete(h) => h.id(),
        }
    }
    pub fn kind(&self) -> EvaluationKind {
        match self {
            Self::Basic(_) => EvaluationKind::Basic,
            Self::Complete(_) => EvaluationKind::Complete,
        }
    }
    pub fn basic(&self) -> Option<Handle<BasicEvaluation>> {
        match self {
            Self::Basic(h) => Some(*h),
            Self::Complete(_) => None,
        }
    }
    pub fn complete(&self) -> Option<Handle<CompleteEvaluation>> {
        match self {
            Self::Complete(h) => Some(*h),
            Self::Basic(_) => None,
        }
    }
}

/// A like or dislike left anonymously, identified by the visitor's IP address.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicEvaluation {
    id: Option<Id>,
    version: Version,
    pub visit_date: NaiveDate,
    pub restaurant: Handle<Restaurant>,
    pub likes: bool,
    pub ip_address: String,
}
persistent!(BasicEvaluation, "basic evaluation", "LIKES");

impl BasicEvaluation {
    pub fn new(
        restaurant: Handle<Restaurant>,
        likes: bool,
        ip_address: impl Into<String>,
        visit_date: NaiveDate,
    ) -> Self {
        Self {
            id: None,
            version: 0,
            visit_date,
            restaurant,
            likes,
            ip_address: ip_address.into(),
        }
    }
}

/// A signed review with a comment and one grade per criterion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompleteEvaluation {
    id: Option<Id>,
    version: Version,
    pub visit_date: NaiveDate,
    pub restaurant: Handle<Restaurant>,
    pub comment: String,
    pub username: String,
    pub(crate) grades: BTreeSet<Handle<Grade>>,
}
persistent!(CompleteEvaluation, "complete evaluation", "COMMENTAIRES");

impl CompleteEvaluation {
    pub fn new(
        restaurant: Handle<Restaurant>,
        comment: impl Into<String>,
        username: impl Into<String>,
        visit_date: NaiveDate,
    ) -> Self {
        Self {
            id: None,
            version: 0,
            visit_date,
            restaurant,
            comment: comment.into(),
            username: username.into(),
            grades: BTreeSet::new(),
        }
    }
    pub fn grades(&self) -> impl Iterator<Item = Handle<Grade>> + '_ {
        self.grades.iter().copied()
    }
}

// ------------- Grade -------------
#[derive(Debug, Clone, PartialEq)]
pub struct Grade {
    id: Option<Id>,
    version: Version,
    pub score: Score,
    pub evaluation: Handle<CompleteEvaluation>,
    pub criteria: Handle<EvaluationCriteria>,
}
persistent!(Grade, "grade", "NOTES");

impl Grade {
    pub fn new(
        score: Score,
        evaluation: Handle<CompleteEvaluation>,
        criteria: Handle<EvaluationCriteria>,
    ) -> Self {
        Self {
            id: None,
            version: 0,
            score,
            evaluation,
            criteria,
        }
    }
}
