use chrono::NaiveDate;
use rusqlite::Row;

use super::{
    collect, count, delete_versioned, expect_current, first, kept, lost_race, missing_reference,
    owner_of, require_new, stored_reference, Mapper,
};
use crate::datatype::{Appreciation, Id, Version};
use crate::entity::{BasicEvaluation, Entity, Evaluation, Handle, Restaurant};
use crate::error::{classify, GuideError, Result};
use crate::sequence::Sequence;
use crate::session::Session;

pub(crate) const SELECT: &str =
    "select numero, appreciation, date_eval, adresse_ip, fk_rest, version from LIKES";

pub(crate) struct BasicRow {
    pub id: Id,
    pub appreciation: Appreciation,
    pub visit_date: NaiveDate,
    pub ip_address: String,
    pub restaurant: Id,
    pub version: Version,
}
impl BasicRow {
    pub fn read(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            appreciation: r.get(1)?,
            visit_date: r.get(2)?,
            ip_address: r.get(3)?,
            restaurant: r.get(4)?,
            version: r.get(5)?,
        })
    }
}

/// Likes and dislikes of one restaurant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LikeTally {
    pub likes: usize,
    pub dislikes: usize,
}

pub struct BasicEvaluationMapper<'s, 'db> {
    session: &'s mut Session<'db>,
}

impl<'s, 'db> BasicEvaluationMapper<'s, 'db> {
    pub(crate) fn new(session: &'s mut Session<'db>) -> Self {
        Self { session }
    }

    pub(crate) fn materialize(&mut self, row: BasicRow) -> Result<Handle<BasicEvaluation>> {
        if let Some(handle) = kept(self.session, row.id) {
            return Ok(handle);
        }
        let restaurant = self
            .session
            .restaurants()
            .find_by_id(row.restaurant)?
            .ok_or_else(|| {
                missing_reference::<Restaurant>(BasicEvaluation::NAME, row.id, row.restaurant)
            })?;
        let mut evaluation = BasicEvaluation::new(
            restaurant,
            row.appreciation.likes(),
            row.ip_address,
            row.visit_date,
        );
        evaluation.assign(row.id, row.version);
        self.session.kept_basic_evaluations.put(evaluation);
        Ok(Handle::new(row.id))
    }

    /// Likes and dislikes of a restaurant, oldest first.
    pub fn find_by_restaurant_id(&mut self, restaurant: Id) -> Result<Vec<Handle<BasicEvaluation>>> {
        let rows = collect(
            self.session.connection(),
            &format!("{SELECT} where fk_rest = ? order by numero"),
            [restaurant],
            BasicRow::read,
        )?;
        rows.into_iter().map(|row| self.materialize(row)).collect()
    }
    pub fn count_likes(&mut self, restaurant: Id) -> Result<usize> {
        count(
            self.session.connection(),
            "select count(*) from LIKES where fk_rest = ? and trim(appreciation) in ('T', '1')",
            [restaurant],
        )
    }
    pub fn count_dislikes(&mut self, restaurant: Id) -> Result<usize> {
        count(
            self.session.connection(),
            "select count(*) from LIKES where fk_rest = ? and trim(appreciation) in ('F', '0')",
            [restaurant],
        )
    }
    /// Counts over the loaded evaluations rather than in the store.
    pub fn tally(&mut self, restaurant: Id) -> Result<LikeTally> {
        let mut tally = LikeTally::default();
        for handle in self.find_by_restaurant_id(restaurant)? {
            match self.session.get(handle) {
                Some(evaluation) if evaluation.likes => tally.likes += 1,
                Some(_) => tally.dislikes += 1,
                None => {}
            }
        }
        Ok(tally)
    }

    fn require_restaurant(&mut self, evaluation: &BasicEvaluation) -> Result<()> {
        let restaurant = evaluation.restaurant.id();
        match self.session.restaurants().find_by_id(restaurant)? {
            Some(_) => Ok(()),
            None => Err(GuideError::ConstraintViolation {
                table: BasicEvaluation::TABLE,
                column: "fk_rest",
                value: restaurant.to_string(),
            }),
        }
    }
    fn attach(&mut self, handle: Handle<BasicEvaluation>, restaurant: Handle<Restaurant>) {
        if let Some(restaurant) = self.session.get_mut(restaurant) {
            let evaluation = Evaluation::Basic(handle);
            if !restaurant.evaluations.contains(&evaluation) {
                restaurant.evaluations.push(evaluation);
            }
        }
    }
    fn detach(&mut self, handle: Handle<BasicEvaluation>, restaurant: Handle<Restaurant>) {
        if let Some(restaurant) = self.session.get_mut(restaurant) {
            restaurant
                .evaluations
                .retain(|e| *e != Evaluation::Basic(handle));
        }
    }
}

impl Mapper for BasicEvaluationMapper<'_, '_> {
    type Entity = BasicEvaluation;

    fn find_by_id(&mut self, id: Id) -> Result<Option<Handle<BasicEvaluation>>> {
        if let Some(handle) = kept(self.session, id) {
            return Ok(Some(handle));
        }
        let row = first(
            self.session.connection(),
            &format!("{SELECT} where numero = ?"),
            [id],
            BasicRow::read,
        )?;
        row.map(|row| self.materialize(row)).transpose()
    }
    fn find_all(&mut self) -> Result<Vec<Handle<BasicEvaluation>>> {
        let rows = collect(
            self.session.connection(),
            &format!("{SELECT} order by numero"),
            [],
            BasicRow::read,
        )?;
        rows.into_iter().map(|row| self.materialize(row)).collect()
    }
    fn create(&mut self, mut evaluation: BasicEvaluation) -> Result<Handle<BasicEvaluation>> {
        require_new(&evaluation)?;
        self.require_restaurant(&evaluation)?;
        let db = self.session.connection();
        let id = self.session.allocate(Sequence::Evaluations)?;
        db.prepare_cached(
            "
            insert into LIKES (numero, appreciation, date_eval, adresse_ip, fk_rest, version)
                values (?, ?, ?, ?, ?, 0)
        ",
        )?
        .execute(rusqlite::params![
            id,
            Appreciation(evaluation.likes),
            evaluation.visit_date,
            evaluation.ip_address,
            evaluation.restaurant.id(),
        ])
        .map_err(|e| classify(e, BasicEvaluation::TABLE, "fk_rest", evaluation.restaurant.id()))?;
        evaluation.assign(id, 0);
        let restaurant = evaluation.restaurant;
        tracing::info!(id, %restaurant, likes = evaluation.likes, "basic evaluation created");
        self.session.kept_basic_evaluations.put(evaluation);
        let handle = Handle::new(id);
        self.attach(handle, restaurant);
        Ok(handle)
    }
    fn update(&mut self, mut evaluation: BasicEvaluation) -> Result<Handle<BasicEvaluation>> {
        let db = self.session.connection();
        let id = expect_current(db, &evaluation)?;
        self.require_restaurant(&evaluation)?;
        let stored_restaurant = stored_reference::<BasicEvaluation>(db, id, "fk_rest")?;
        let version = evaluation.version();
        let changed = db
            .prepare_cached(
                "
                update LIKES
                    set appreciation = ?, date_eval = ?, adresse_ip = ?, fk_rest = ?,
                        version = version + 1
                    where numero = ? and version = ?
            ",
            )?
            .execute(rusqlite::params![
                Appreciation(evaluation.likes),
                evaluation.visit_date,
                evaluation.ip_address,
                evaluation.restaurant.id(),
                id,
                version,
            ])
            .map_err(|e| classify(e, BasicEvaluation::TABLE, "fk_rest", evaluation.restaurant.id()))?;
        if changed == 0 {
            return Err(lost_race::<BasicEvaluation>(db, id, version));
        }
        evaluation.assign(id, version + 1);
        let handle = Handle::new(id);
        let restaurant = evaluation.restaurant;
        if stored_restaurant != restaurant.id() {
            self.detach(handle, Handle::new(stored_restaurant));
        }
        self.session.kept_basic_evaluations.put(evaluation);
        self.attach(handle, restaurant);
        Ok(handle)
    }
    fn delete(&mut self, evaluation: &BasicEvaluation) -> Result<bool> {
        let Some(id) = evaluation.id() else {
            return Ok(false);
        };
        let db = self.session.connection();
        let stored_restaurant = owner_of::<BasicEvaluation>(db, id, "fk_rest")?;
        let removed = delete_versioned::<BasicEvaluation>(db, id, evaluation.version(), "numero")?;
        let handle = Handle::new(id);
        if let Some(previous) = self.session.kept_basic_evaluations.evict(id) {
            self.detach(handle, previous.restaurant);
        }
        self.detach(handle, evaluation.restaurant);
        if let Some(restaurant) = stored_restaurant {
            self.detach(handle, Handle::new(restaurant));
        }
        Ok(removed)
    }
    fn resolve(&self, handle: Handle<BasicEvaluation>) -> Option<&BasicEvaluation> {
        self.session.get(handle)
    }
}
