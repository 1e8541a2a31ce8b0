use rusqlite::Row;

use super::{
    collect, delete_versioned, expect_current, first, kept, lost_race, missing_reference,
    owner_of, require_new, stored_reference, Mapper,
};
use crate::datatype::{Id, Score, Version};
use crate::entity::{CompleteEvaluation, Entity, EvaluationCriteria, Grade, Handle};
use crate::error::{classify, GuideError, Result};
use crate::sequence::Sequence;
use crate::session::Session;

const SELECT: &str = "select numero, note, fk_comm, fk_crit, version from NOTES";

struct GradeRow {
    id: Id,
    score: Score,
    evaluation: Id,
    criteria: Id,
    version: Version,
}
impl GradeRow {
    fn read(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            score: r.get(1)?,
            evaluation: r.get(2)?,
            criteria: r.get(3)?,
            version: r.get(4)?,
        })
    }
}

pub struct GradeMapper<'s, 'db> {
    session: &'s mut Session<'db>,
}

impl<'s, 'db> GradeMapper<'s, 'db> {
    pub(crate) fn new(session: &'s mut Session<'db>) -> Self {
        Self { session }
    }

    fn materialize(&mut self, row: GradeRow) -> Result<Handle<Grade>> {
        if let Some(handle) = kept(self.session, row.id) {
            return Ok(handle);
        }
        let evaluation = self
            .session
            .complete_evaluations()
            .find_by_id(row.evaluation)?
            .ok_or_else(|| {
                missing_reference::<CompleteEvaluation>(Grade::NAME, row.id, row.evaluation)
            })?;
        let criteria = self
            .session
            .evaluation_criteria()
            .find_by_id(row.criteria)?
            .ok_or_else(|| missing_reference::<EvaluationCriteria>(Grade::NAME, row.id, row.criteria))?;
        let mut grade = Grade::new(row.score, evaluation, criteria);
        grade.assign(row.id, row.version);
        self.session.kept_grades.put(grade);
        let handle = Handle::new(row.id);
        self.attach(handle, evaluation);
        Ok(handle)
    }
    fn materialize_all(&mut self, rows: Vec<GradeRow>) -> Result<Vec<Handle<Grade>>> {
        rows.into_iter().map(|row| self.materialize(row)).collect()
    }

    pub fn find_by_evaluation_id(&mut self, evaluation: Id) -> Result<Vec<Handle<Grade>>> {
        let rows = collect(
            self.session.connection(),
            &format!("{SELECT} where fk_comm = ? order by numero"),
            [evaluation],
            GradeRow::read,
        )?;
        self.materialize_all(rows)
    }

    fn require_references(&mut self, grade: &Grade) -> Result<()> {
        let evaluation = grade.evaluation.id();
        if self.session.complete_evaluations().find_by_id(evaluation)?.is_none() {
            return Err(GuideError::ConstraintViolation {
                table: Grade::TABLE,
                column: "fk_comm",
                value: evaluation.to_string(),
            });
        }
        let criteria = grade.criteria.id();
        if self.session.evaluation_criteria().find_by_id(criteria)?.is_none() {
            return Err(GuideError::ConstraintViolation {
                table: Grade::TABLE,
                column: "fk_crit",
                value: criteria.to_string(),
            });
        }
        Ok(())
    }
    fn attach(&mut self, handle: Handle<Grade>, evaluation: Handle<CompleteEvaluation>) {
        if let Some(evaluation) = self.session.get_mut(evaluation) {
            evaluation.grades.insert(handle);
        }
    }
    fn detach(&mut self, handle: Handle<Grade>, evaluation: Handle<CompleteEvaluation>) {
        if let Some(evaluation) = self.session.get_mut(evaluation) {
            evaluation.grades.remove(&handle);
        }
    }
}

impl Mapper for GradeMapper<'_, '_> {
    type Entity = Grade;

    fn find_by_id(&mut self, id: Id) -> Result<Option<Handle<Grade>>> {
        if let Some(handle) = kept(self.session, id) {
            return Ok(Some(handle));
        }
        let row = first(
            self.session.connection(),
            &format!("{SELECT} where numero = ?"),
            [id],
            GradeRow::read,
        )?;
        row.map(|row| self.materialize(row)).transpose()
    }
    fn find_all(&mut self) -> Result<Vec<Handle<Grade>>> {
        let rows = collect(
            self.session.connection(),
            &format!("{SELECT} order by numero"),
            [],
            GradeRow::read,
        )?;
        self.materialize_all(rows)
    }
    /// A second grade for the same criterion of one evaluation is refused.
    fn create(&mut self, mut grade: Grade) -> Result<Handle<Grade>> {
        require_new(&grade)?;
        self.require_references(&grade)?;
        let db = self.session.connection();
        let id = self.session.allocate(Sequence::Grades)?;
        db.prepare_cached(
            "insert into NOTES (numero, note, fk_comm, fk_crit, version) values (?, ?, ?, ?, 0)",
        )?
        .execute(rusqlite::params![
            id,
            grade.score,
            grade.evaluation.id(),
            grade.criteria.id()
        ])
        .map_err(|e| classify(e, Grade::TABLE, "fk_crit", grade.criteria.id()))?;
        grade.assign(id, 0);
        let evaluation = grade.evaluation;
        tracing::debug!(id, %evaluation, score = %grade.score, "grade created");
        self.session.kept_grades.put(grade);
        let handle = Handle::new(id);
        self.attach(handle, evaluation);
        Ok(handle)
    }
    fn update(&mut self, mut grade: Grade) -> Result<Handle<Grade>> {
        let db = self.session.connection();
        let id = expect_current(db, &grade)?;
        self.require_references(&grade)?;
        let stored_evaluation = stored_reference::<Grade>(db, id, "fk_comm")?;
        let version = grade.version();
        let changed = db
            .prepare_cached(
                "
                update NOTES
                    set note = ?, fk_comm = ?, fk_crit = ?, version = version + 1
                    where numero = ? and version = ?
            ",
            )?
            .execute(rusqlite::params![
                grade.score,
                grade.evaluation.id(),
                grade.criteria.id(),
                id,
                version
            ])
            .map_err(|e| classify(e, Grade::TABLE, "fk_crit", grade.criteria.id()))?;
        if changed == 0 {
            return Err(lost_race::<Grade>(db, id, version));
        }
        grade.assign(id, version + 1);
        let handle = Handle::new(id);
        let evaluation = grade.evaluation;
        if stored_evaluation != evaluation.id() {
            self.detach(handle, Handle::new(stored_evaluation));
        }
        self.session.kept_grades.put(grade);
        self.attach(handle, evaluation);
        Ok(handle)
    }
    fn delete(&mut self, grade: &Grade) -> Result<bool> {
        let Some(id) = grade.id() else {
            return Ok(false);
        };
        let db = self.session.connection();
        let stored_evaluation = owner_of::<Grade>(db, id, "fk_comm")?;
        let removed = delete_versioned::<Grade>(db, id, grade.version(), "numero")?;
        let handle = Handle::new(id);
        if let Some(previous) = self.session.kept_grades.evict(id) {
            self.detach(handle, previous.evaluation);
        }
        self.detach(handle, grade.evaluation);
        if let Some(evaluation) = stored_evaluation {
            self.detach(handle, Handle::new(evaluation));
        }
        Ok(removed)
    }
    fn resolve(&self, handle: Handle<Grade>) -> Option<&Grade> {
        self.session.get(handle)
    }
}
