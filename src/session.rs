//! A unit of work: the borrowed connection, the sequence source and one
//! identity cache per entity type. Mappers are short-lived facets borrowing
//! the session, so every mapper sees the same caches.

use chrono::NaiveDate;
use rusqlite::Connection;

use crate::cache::IdentityCache;
use crate::datatype::Id;
use crate::entity::{
    BasicEvaluation, City, CompleteEvaluation, Entity, Evaluation, EvaluationCriteria, Grade,
    Handle, Restaurant, RestaurantType,
};
use crate::error::Result;
use crate::mapper::{
    BasicEvaluationMapper, CityMapper, CompleteEvaluationMapper, CriteriaMapper, EvaluationMapper,
    GradeMapper, RestaurantMapper, RestaurantTypeMapper,
};
use crate::sequence::{Sequence, SequenceAllocator, StoredSequences};

pub struct Session<'db> {
    db: &'db Connection,
    sequences: Box<dyn SequenceAllocator + 'db>,
    pub(crate) kept_cities: IdentityCache<City>,
    pub(crate) kept_restaurant_types: IdentityCache<RestaurantType>,
    pub(crate) kept_criteria: IdentityCache<EvaluationCriteria>,
    pub(crate) kept_restaurants: IdentityCache<Restaurant>,
    pub(crate) kept_basic_evaluations: IdentityCache<BasicEvaluation>,
    pub(crate) kept_complete_evaluations: IdentityCache<CompleteEvaluation>,
    pub(crate) kept_grades: IdentityCache<Grade>,
}

/// Entities that have an identity cache in a [`Session`].
pub trait Cached: Entity {
    fn cache<'s>(session: &'s Session<'_>) -> &'s IdentityCache<Self>;
    fn cache_mut<'s>(session: &'s mut Session<'_>) -> &'s mut IdentityCache<Self>;
}

macro_rules! cached {
    ($($entity:ident => $kept:ident),+ $(,)?) => {
        $(
            impl Cached for $entity {
                fn cache<'s>(session: &'s Session<'_>) -> &'s IdentityCache<Self> {
                    &session.$kept
                }
                fn cache_mut<'s>(session: &'s mut Session<'_>) -> &'s mut IdentityCache<Self> {
                    &mut session.$kept
                }
            }
        )+
    };
}

cached! {
    City => kept_cities,
    RestaurantType => kept_restaurant_types,
    EvaluationCriteria => kept_criteria,
    Restaurant => kept_restaurants,
    BasicEvaluation => kept_basic_evaluations,
    CompleteEvaluation => kept_complete_evaluations,
    Grade => kept_grades,
}

/// Borrowed view of an evaluation of either kind.
#[derive(Debug, Clone, Copy)]
pub enum EvaluationView<'a> {
    Basic(&'a BasicEvaluation),
    Complete(&'a CompleteEvaluation),
}
impl EvaluationView<'_> {
    pub fn visit_date(&self) -> NaiveDate {
        match self {
            Self::Basic(e) => e.visit_date,
            Self::Complete(e) => e.visit_date,
        }
    }
    pub fn restaurant(&self) -> Handle<Restaurant> {
        match self {
            Self::Basic(e) => e.restaurant,
            Self::Complete(e) => e.restaurant,
        }
    }
}

impl<'db> Session<'db> {
    pub fn new(db: &'db Connection) -> Self {
        Self::with_sequences(db, StoredSequences)
    }
    pub fn with_sequences(db: &'db Connection, sequences: impl SequenceAllocator + 'db) -> Self {
        Self {
            db,
            sequences: Box::new(sequences),
            kept_cities: IdentityCache::new(),
            kept_restaurant_types: IdentityCache::new(),
            kept_criteria: IdentityCache::new(),
            kept_restaurants: IdentityCache::new(),
            kept_basic_evaluations: IdentityCache::new(),
            kept_complete_evaluations: IdentityCache::new(),
            kept_grades: IdentityCache::new(),
        }
    }
    pub fn connection(&self) -> &'db Connection {
        self.db
    }
    pub(crate) fn allocate(&self, sequence: Sequence) -> Result<Id> {
        self.sequences.allocate(self.db, sequence)
    }

    // functions to reach the kept entities
    pub fn get<T: Cached>(&self, handle: Handle<T>) -> Option<&T> {
        T::cache(self).get(handle.id())
    }
    pub fn get_mut<T: Cached>(&mut self, handle: Handle<T>) -> Option<&mut T> {
        T::cache_mut(self).get_mut(handle.id())
    }
    pub fn cache<T: Cached>(&self) -> &IdentityCache<T> {
        T::cache(self)
    }
    pub fn evaluation(&self, evaluation: Evaluation) -> Option<EvaluationView<'_>> {
        match evaluation {
            Evaluation::Basic(h) => self.get(h).map(EvaluationView::Basic),
            Evaluation::Complete(h) => self.get(h).map(EvaluationView::Complete),
        }
    }
    /// Forgets one row so the next lookup reads it from the store again.
    pub fn evict<T: Cached>(&mut self, id: Id) -> Option<T> {
        T::cache_mut(self).evict(id)
    }
    /// Forgets everything, typically after a rollback.
    pub fn clear(&mut self) {
        self.kept_cities.clear();
        self.kept_restaurant_types.clear();
        self.kept_criteria.clear();
        self.kept_restaurants.clear();
        self.kept_basic_evaluations.clear();
        self.kept_complete_evaluations.clear();
        self.kept_grades.clear();
        tracing::debug!("identity caches cleared");
    }

    // the mappers, one per entity type plus the evaluation hierarchy
    pub fn cities(&mut self) -> CityMapper<'_, 'db> {
        CityMapper::new(self)
    }
    pub fn restaurant_types(&mut self) -> RestaurantTypeMapper<'_, 'db> {
        RestaurantTypeMapper::new(self)
    }
    pub fn evaluation_criteria(&mut self) -> CriteriaMapper<'_, 'db> {
        CriteriaMapper::new(self)
    }
    pub fn restaurants(&mut self) -> RestaurantMapper<'_, 'db> {
        RestaurantMapper::new(self)
    }
    pub fn basic_evaluations(&mut self) -> BasicEvaluationMapper<'_, 'db> {
        BasicEvaluationMapper::new(self)
    }
    pub fn complete_evaluations(&mut self) -> CompleteEvaluationMapper<'_, 'db> {
        CompleteEvaluationMapper::new(self)
    }
    pub fn grades(&mut self) -> GradeMapper<'_, 'db> {
        GradeMapper::new(self)
    }
    pub fn evaluations(&mut self) -> EvaluationMapper<'_, 'db> {
        EvaluationMapper::new(self)
    }
}
