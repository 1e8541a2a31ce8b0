//! The use cases of the guide. Every call runs as one unit of work: it
//! either commits everything it wrote or leaves the store and the caches as
//! if it had never run.

use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::{error, info};

use crate::datatype::{Id, Score};
use crate::entity::{
    BasicEvaluation, City, CompleteEvaluation, Evaluation, EvaluationCriteria, Grade, Handle,
    Restaurant, RestaurantType,
};
use crate::error::Result;
use crate::mapper::{CascadeReport, EvaluationScope, Mapper};
use crate::session::Session;
use crate::transaction::TransactionBoundary;

pub struct GuideService<'db> {
    session: Session<'db>,
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

impl<'db> GuideService<'db> {
    pub fn new(db: &'db Connection) -> Self {
        Self {
            session: Session::new(db),
        }
    }
    pub fn with_session(session: Session<'db>) -> Self {
        Self { session }
    }
    /// Resolves the handles handed out by the use cases.
    pub fn session(&self) -> &Session<'db> {
        &self.session
    }
    pub fn session_mut(&mut self) -> &mut Session<'db> {
        &mut self.session
    }

    fn unit_of_work<R>(
        &mut self,
        use_case: &'static str,
        work: impl FnOnce(&mut Session<'db>) -> Result<R>,
    ) -> Result<R> {
        let db = self.session.connection();
        db.begin()?;
        let outcome = work(&mut self.session).and_then(|r| db.commit().map(|()| r));
        if let Err(e) = &outcome {
            if let Err(undo) = db.rollback() {
                error!(use_case, error = %undo, "rollback failed");
            }
            self.session.clear();
            error!(use_case, error = %e, "unit of work abandoned");
        }
        outcome
    }

    // ------------- restaurants -------------
    pub fn restaurants(&mut self) -> Result<Vec<Handle<Restaurant>>> {
        self.unit_of_work("restaurants", |s| s.restaurants().find_all())
    }
    pub fn restaurant(&mut self, id: Id) -> Result<Option<Handle<Restaurant>>> {
        self.unit_of_work("restaurant", |s| s.restaurants().find_by_id(id))
    }
    pub fn restaurant_by_name(&mut self, name: &str) -> Result<Option<Handle<Restaurant>>> {
        self.unit_of_work("restaurant_by_name", |s| s.restaurants().find_by_name(name))
    }
    pub fn restaurants_by_name_like(&mut self, part: &str) -> Result<Vec<Handle<Restaurant>>> {
        self.unit_of_work("restaurants_by_name_like", |s| {
            s.restaurants().find_by_name_like(part)
        })
    }
    pub fn restaurants_by_city_name(&mut self, part: &str) -> Result<Vec<Handle<Restaurant>>> {
        self.unit_of_work("restaurants_by_city_name", |s| {
            s.restaurants().find_by_city_name_like(part)
        })
    }
    pub fn restaurants_by_type_label(&mut self, label: &str) -> Result<Vec<Handle<Restaurant>>> {
        self.unit_of_work("restaurants_by_type_label", |s| {
            s.restaurants().find_by_type_label(label)
        })
    }
    pub fn add_restaurant(&mut self, restaurant: Restaurant) -> Result<Handle<Restaurant>> {
        self.unit_of_work("add_restaurant", |s| s.restaurants().create(restaurant))
    }
    pub fn edit_restaurant(&mut self, restaurant: Restaurant) -> Result<Handle<Restaurant>> {
        self.unit_of_work("edit_restaurant", |s| s.restaurants().update(restaurant))
    }
    /// Removes the restaurant together with its evaluations and their grades.
    pub fn delete_restaurant(&mut self, id: Id) -> Result<CascadeReport> {
        let report = self.unit_of_work("delete_restaurant", |s| {
            let Some(handle) = s.restaurants().find_by_id(id)? else {
                return Ok(CascadeReport::default());
            };
            match s.get(handle).cloned() {
                Some(restaurant) => s.restaurants().delete_cascade(&restaurant),
                None => Ok(CascadeReport::default()),
            }
        })?;
        info!(id, removed = report.total(), "restaurant removed from the guide");
        Ok(report)
    }

    // ------------- cities and types -------------
    pub fn cities(&mut self) -> Result<Vec<Handle<City>>> {
        self.unit_of_work("cities", |s| s.cities().find_all())
    }
    pub fn city_by_zip_code(&mut self, zip_code: &str) -> Result<Option<Handle<City>>> {
        self.unit_of_work("city_by_zip_code", |s| s.cities().find_by_zip_code(zip_code))
    }
    pub fn create_city(&mut self, zip_code: &str, name: &str) -> Result<Handle<City>> {
        self.unit_of_work("create_city", |s| s.cities().create(City::new(zip_code, name)))
    }
    pub fn restaurant_types(&mut self) -> Result<Vec<Handle<RestaurantType>>> {
        self.unit_of_work("restaurant_types", |s| s.restaurant_types().find_all())
    }
    pub fn type_by_label(&mut self, label: &str) -> Result<Option<Handle<RestaurantType>>> {
        self.unit_of_work("type_by_label", |s| s.restaurant_types().find_by_label(label))
    }
    pub fn create_restaurant_type(
        &mut self,
        label: &str,
        description: Option<String>,
    ) -> Result<Handle<RestaurantType>> {
        self.unit_of_work("create_restaurant_type", |s| {
            s.restaurant_types()
                .create(RestaurantType::new(label, description))
        })
    }

    // ------------- evaluations -------------
    pub fn evaluation_criteria(&mut self) -> Result<Vec<Handle<EvaluationCriteria>>> {
        self.unit_of_work("evaluation_criteria", |s| s.evaluation_criteria().find_all())
    }
    pub fn create_evaluation_criteria(
        &mut self,
        name: &str,
        description: Option<String>,
    ) -> Result<Handle<EvaluationCriteria>> {
        self.unit_of_work("create_evaluation_criteria", |s| {
            s.evaluation_criteria()
                .create(EvaluationCriteria::new(name, description))
        })
    }
    pub fn like_restaurant(
        &mut self,
        restaurant: Handle<Restaurant>,
        ip_address: &str,
    ) -> Result<Handle<BasicEvaluation>> {
        self.unit_of_work("like_restaurant", |s| {
            s.basic_evaluations()
                .create(BasicEvaluation::new(restaurant, true, ip_address, today()))
        })
    }
    pub fn dislike_restaurant(
        &mut self,
        restaurant: Handle<Restaurant>,
        ip_address: &str,
    ) -> Result<Handle<BasicEvaluation>> {
        self.unit_of_work("dislike_restaurant", |s| {
            s.basic_evaluations()
                .create(BasicEvaluation::new(restaurant, false, ip_address, today()))
        })
    }
    /// A signed review with one grade per criterion, written all at once.
    pub fn add_evaluation(
        &mut self,
        restaurant: Handle<Restaurant>,
        username: &str,
        comment: &str,
        grades: &[(Handle<EvaluationCriteria>, u8)],
    ) -> Result<Handle<CompleteEvaluation>> {
        self.unit_of_work("add_evaluation", |s| {
            let evaluation = s.complete_evaluations().create(CompleteEvaluation::new(
                restaurant,
                comment,
                username,
                today(),
            ))?;
            for &(criteria, score) in grades {
                s.grades()
                    .create(Grade::new(Score::new(score)?, evaluation, criteria))?;
            }
            Ok(evaluation)
        })
    }
    /// Most recent first.
    pub fn complete_evaluations_of(
        &mut self,
        restaurant: Id,
    ) -> Result<Vec<Handle<CompleteEvaluation>>> {
        self.unit_of_work("complete_evaluations_of", |s| {
            s.complete_evaluations().find_by_restaurant_id(restaurant)
        })
    }
    pub fn basic_evaluations_of(&mut self, restaurant: Id) -> Result<Vec<Handle<BasicEvaluation>>> {
        self.unit_of_work("basic_evaluations_of", |s| {
            s.basic_evaluations().find_by_restaurant_id(restaurant)
        })
    }
    /// Both kinds together, most recent first.
    pub fn evaluations_of(&mut self, restaurant: Id) -> Result<Vec<Evaluation>> {
        self.unit_of_work("evaluations_of", |s| {
            s.evaluations()
                .find_by_restaurant_id(restaurant, EvaluationScope::All)
        })
    }
    pub fn likes_of(&mut self, restaurant: Id) -> Result<usize> {
        self.unit_of_work("likes_of", |s| s.basic_evaluations().count_likes(restaurant))
    }
    pub fn dislikes_of(&mut self, restaurant: Id) -> Result<usize> {
        self.unit_of_work("dislikes_of", |s| {
            s.basic_evaluations().count_dislikes(restaurant)
        })
    }
}
