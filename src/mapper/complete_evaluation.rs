use chrono::NaiveDate;
use rusqlite::Row;

use super::{
    collect, conflict, delete_versioned, expect_current, first, ids, kept, lost_race,
    missing_reference, require_new, run_cascade, stored_reference, stored_version, CascadeReport,
    CascadeStep, Mapper, Stored,
};
use crate::datatype::{Id, Version};
use crate::entity::{CompleteEvaluation, Entity, Evaluation, Handle, Restaurant};
use crate::error::{classify, GuideError, Result};
use crate::sequence::Sequence;
use crate::session::Session;
use crate::transaction::within_savepoint;

pub(crate) const SELECT: &str =
    "select numero, date_eval, commentaire, nom_utilisateur, fk_rest, version from COMMENTAIRES";

/// Grades go before the evaluation they belong to.
pub(crate) const COMPLETE_EVALUATION_CASCADE: [CascadeStep; 1] = [CascadeStep {
    table: "NOTES",
    column: "fk_comm",
    sql: "delete from NOTES where fk_comm = ?",
}];

pub(crate) struct CompleteRow {
    pub id: Id,
    pub visit_date: NaiveDate,
    pub comment: String,
    pub username: String,
    pub restaurant: Id,
    pub version: Version,
}
impl CompleteRow {
    pub fn read(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            visit_date: r.get(1)?,
            comment: r.get(2)?,
            username: r.get(3)?,
            restaurant: r.get(4)?,
            version: r.get(5)?,
        })
    }
}

pub struct CompleteEvaluationMapper<'s, 'db> {
    session: &'s mut Session<'db>,
}

impl<'s, 'db> CompleteEvaluationMapper<'s, 'db> {
    pub(crate) fn new(session: &'s mut Session<'db>) -> Self {
        Self { session }
    }

    pub(crate) fn materialize(&mut self, row: CompleteRow) -> Result<Handle<CompleteEvaluation>> {
        if let Some(handle) = kept(self.session, row.id) {
            return Ok(handle);
        }
        let restaurant = self
            .session
            .restaurants()
            .find_by_id(row.restaurant)?
            .ok_or_else(|| {
                missing_reference::<Restaurant>(CompleteEvaluation::NAME, row.id, row.restaurant)
            })?;
        let grades = ids(
            self.session.connection(),
            "select numero from NOTES where fk_comm = ? order by numero",
            [row.id],
        )?;
        let mut evaluation =
            CompleteEvaluation::new(restaurant, row.comment, row.username, row.visit_date);
        evaluation.assign(row.id, row.version);
        evaluation.grades = grades.into_iter().map(Handle::new).collect();
        self.session.kept_complete_evaluations.put(evaluation);
        Ok(Handle::new(row.id))
    }

    /// Most recent visit first; same-day evaluations newest first.
    pub fn find_by_restaurant_id(
        &mut self,
        restaurant: Id,
    ) -> Result<Vec<Handle<CompleteEvaluation>>> {
        let rows = collect(
            self.session.connection(),
            &format!("{SELECT} where fk_rest = ? order by date_eval desc, numero desc"),
            [restaurant],
            CompleteRow::read,
        )?;
        rows.into_iter().map(|row| self.materialize(row)).collect()
    }

    /// Removes the evaluation and its grades, all or nothing.
    pub fn delete_cascade(&mut self, evaluation: &CompleteEvaluation) -> Result<CascadeReport> {
        let Some(id) = evaluation.id() else {
            return Ok(CascadeReport::default());
        };
        let db = self.session.connection();
        let version = evaluation.version();
        match stored_version::<CompleteEvaluation>(db, id, version)? {
            Stored::Current => {}
            Stored::Missing => {
                self.forget(evaluation);
                return Ok(CascadeReport::default());
            }
            Stored::Stale(found) => return Err(conflict::<CompleteEvaluation>(id, version, found)),
        }
        let stored_restaurant = stored_reference::<CompleteEvaluation>(db, id, "fk_rest")?;
        let grades = ids(db, "select numero from NOTES where fk_comm = ?", [id])?;
        let report = within_savepoint(db, "delete_complete_evaluation", || {
            let mut report = CascadeReport::default();
            run_cascade(db, &COMPLETE_EVALUATION_CASCADE, id, &mut report)?;
            if !delete_versioned::<CompleteEvaluation>(db, id, version, "fk_comm")? {
                return Err(GuideError::NotFound {
                    entity: CompleteEvaluation::NAME,
                    id,
                });
            }
            report.record(CompleteEvaluation::TABLE, 1)?;
            Ok(report)
        })?;
        for grade in grades {
            self.session.kept_grades.evict(grade);
        }
        self.session.kept_complete_evaluations.evict(id);
        self.detach(Handle::new(id), Handle::new(stored_restaurant));
        tracing::info!(id, grades = report.grades, "complete evaluation deleted");
        Ok(report)
    }

    // the rows are already gone; drop what the session still holds of them
    fn forget(&mut self, evaluation: &CompleteEvaluation) {
        let Some(id) = evaluation.id() else {
            return;
        };
        let previous = self.session.kept_complete_evaluations.evict(id);
        let kept = previous.as_ref().unwrap_or(evaluation);
        for grade in &kept.grades {
            self.session.kept_grades.evict(grade.id());
        }
        let handle = Handle::new(id);
        self.detach(handle, kept.restaurant);
        self.detach(handle, evaluation.restaurant);
    }

    fn require_restaurant(&mut self, evaluation: &CompleteEvaluation) -> Result<()> {
        let restaurant = evaluation.restaurant.id();
        match self.session.restaurants().find_by_id(restaurant)? {
            Some(_) => Ok(()),
            None => Err(GuideError::ConstraintViolation {
                table: CompleteEvaluation::TABLE,
                column: "fk_rest",
                value: restaurant.to_string(),
            }),
        }
    }
    fn attach(&mut self, handle: Handle<CompleteEvaluation>, restaurant: Handle<Restaurant>) {
        if let Some(restaurant) = self.session.get_mut(restaurant) {
            let evaluation = Evaluation::Complete(handle);
            if !restaurant.evaluations.contains(&evaluation) {
                restaurant.evaluations.push(evaluation);
            }
        }
    }
    fn detach(&mut self, handle: Handle<CompleteEvaluation>, restaurant: Handle<Restaurant>) {
        if let Some(restaurant) = self.session.get_mut(restaurant) {
            restaurant
                .evaluations
                .retain(|e| *e != Evaluation::Complete(handle));
        }
    }
}

impl Mapper for CompleteEvaluationMapper<'_, '_> {
    type Entity = CompleteEvaluation;

    fn find_by_id(&mut self, id: Id) -> Result<Option<Handle<CompleteEvaluation>>> {
        if let Some(handle) = kept(self.session, id) {
            return Ok(Some(handle));
        }
        let row = first(
            self.session.connection(),
            &format!("{SELECT} where numero = ?"),
            [id],
            CompleteRow::read,
        )?;
        row.map(|row| self.materialize(row)).transpose()
    }
    fn find_all(&mut self) -> Result<Vec<Handle<CompleteEvaluation>>> {
        let rows = collect(
            self.session.connection(),
            &format!("{SELECT} order by numero"),
            [],
            CompleteRow::read,
        )?;
        rows.into_iter().map(|row| self.materialize(row)).collect()
    }
    fn create(&mut self, mut evaluation: CompleteEvaluation) -> Result<Handle<CompleteEvaluation>> {
        require_new(&evaluation)?;
        self.require_restaurant(&evaluation)?;
        let db = self.session.connection();
        let id = self.session.allocate(Sequence::Evaluations)?;
        db.prepare_cached(
            "
            insert into COMMENTAIRES (numero, date_eval, commentaire, nom_utilisateur, fk_rest, version)
                values (?, ?, ?, ?, ?, 0)
        ",
        )?
        .execute(rusqlite::params![
            id,
            evaluation.visit_date,
            evaluation.comment,
            evaluation.username,
            evaluation.restaurant.id(),
        ])
        .map_err(|e| classify(e, CompleteEvaluation::TABLE, "fk_rest", evaluation.restaurant.id()))?;
        evaluation.assign(id, 0);
        evaluation.grades.clear();
        let restaurant = evaluation.restaurant;
        tracing::info!(id, %restaurant, username = %evaluation.username, "complete evaluation created");
        self.session.kept_complete_evaluations.put(evaluation);
        let handle = Handle::new(id);
        self.attach(handle, restaurant);
        Ok(handle)
    }
    fn update(&mut self, mut evaluation: CompleteEvaluation) -> Result<Handle<CompleteEvaluation>> {
        let db = self.session.connection();
        let id = expect_current(db, &evaluation)?;
        self.require_restaurant(&evaluation)?;
        let stored_restaurant = stored_reference::<CompleteEvaluation>(db, id, "fk_rest")?;
        let version = evaluation.version();
        let changed = db
            .prepare_cached(
                "
                update COMMENTAIRES
                    set date_eval = ?, commentaire = ?, nom_utilisateur = ?, fk_rest = ?,
                        version = version + 1
                    where numero = ? and version = ?
            ",
            )?
            .execute(rusqlite::params![
                evaluation.visit_date,
                evaluation.comment,
                evaluation.username,
                evaluation.restaurant.id(),
                id,
                version,
            ])
            .map_err(|e| classify(e, CompleteEvaluation::TABLE, "fk_rest", evaluation.restaurant.id()))?;
        if changed == 0 {
            return Err(lost_race::<CompleteEvaluation>(db, id, version));
        }
        evaluation.assign(id, version + 1);
        let handle = Handle::new(id);
        let restaurant = evaluation.restaurant;
        if stored_restaurant != restaurant.id() {
            self.detach(handle, Handle::new(stored_restaurant));
        }
        match self.session.kept_complete_evaluations.evict(id) {
            Some(previous) => evaluation.grades = previous.grades,
            None => {
                let grades = ids(db, "select numero from NOTES where fk_comm = ? order by numero", [id])?;
                evaluation.grades = grades.into_iter().map(Handle::new).collect();
            }
        }
        self.session.kept_complete_evaluations.put(evaluation);
        self.attach(handle, restaurant);
        Ok(handle)
    }
    fn delete(&mut self, evaluation: &CompleteEvaluation) -> Result<bool> {
        Ok(self.delete_cascade(evaluation)?.complete_evaluations == 1)
    }
    fn resolve(&self, handle: Handle<CompleteEvaluation>) -> Option<&CompleteEvaluation> {
        self.session.get(handle)
    }
}
