use rusqlite::Row;

use super::{collect, delete_versioned, expect_current, first, kept, lost_race, require_new, Mapper};
use crate::datatype::{Id, Version};
use crate::entity::{Entity, EvaluationCriteria, Handle};
use crate::error::{classify, Result};
use crate::sequence::Sequence;
use crate::session::Session;

const SELECT: &str = "select numero, nom, description, version from CRITERES_EVALUATION";

struct CriteriaRow {
    id: Id,
    name: String,
    description: Option<String>,
    version: Version,
}
impl CriteriaRow {
    fn read(r: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: r.get(0)?,
            name: r.get(1)?,
            description: r.get(2)?,
            version: r.get(3)?,
        })
    }
}

pub struct CriteriaMapper<'s, 'db> {
    session: &'s mut Session<'db>,
}

impl<'s, 'db> CriteriaMapper<'s, 'db> {
    pub(crate) fn new(session: &'s mut Session<'db>) -> Self {
        Self { session }
    }

    fn materialize(&mut self, row: CriteriaRow) -> Handle<EvaluationCriteria> {
        if let Some(handle) = kept(self.session, row.id) {
            return handle;
        }
        let mut criteria = EvaluationCriteria::new(row.name, row.description);
        criteria.assign(row.id, row.version);
        self.session.kept_criteria.put(criteria);
        Handle::new(row.id)
    }

    pub fn find_by_name(&mut self, name: &str) -> Result<Option<Handle<EvaluationCriteria>>> {
        let row = first(
            self.session.connection(),
            &format!("{SELECT} where nom = ?"),
            [name],
            CriteriaRow::read,
        )?;
        Ok(row.map(|row| self.materialize(row)))
    }
}

impl Mapper for CriteriaMapper<'_, '_> {
    type Entity = EvaluationCriteria;

    fn find_by_id(&mut self, id: Id) -> Result<Option<Handle<EvaluationCriteria>>> {
        if let Some(handle) = kept(self.session, id) {
            return Ok(Some(handle));
        }
        let row = first(
            self.session.connection(),
            &format!("{SELECT} where numero = ?"),
            [id],
            CriteriaRow::read,
        )?;
        Ok(row.map(|row| self.materialize(row)))
    }
    fn find_all(&mut self) -> Result<Vec<Handle<EvaluationCriteria>>> {
        let rows = collect(
            self.session.connection(),
            &format!("{SELECT} order by numero"),
            [],
            CriteriaRow::read,
        )?;
        Ok(rows.into_iter().map(|row| self.materialize(row)).collect())
    }
    fn create(&mut self, mut criteria: EvaluationCriteria) -> Result<Handle<EvaluationCriteria>> {
        require_new(&criteria)?;
        let db = self.session.connection();
        let id = self.session.allocate(Sequence::Criteria)?;
        db.prepare_cached(
            "insert into CRITERES_EVALUATION (numero, nom, description, version) values (?, ?, ?, 0)",
        )?
        .execute(rusqlite::params![id, criteria.name, criteria.description])
        .map_err(|e| classify(e, EvaluationCriteria::TABLE, "nom", &criteria.name))?;
        criteria.assign(id, 0);
        tracing::info!(id, name = %criteria.name, "evaluation criteria created");
        self.session.kept_criteria.put(criteria);
        Ok(Handle::new(id))
    }
    fn update(&mut self, mut criteria: EvaluationCriteria) -> Result<Handle<EvaluationCriteria>> {
        let db = self.session.connection();
        let id = expect_current(db, &criteria)?;
        let version = criteria.version();
        let changed = db
            .prepare_cached(
                "
                update CRITERES_EVALUATION
                    set nom = ?, description = ?, version = version + 1
                    where numero = ? and version = ?
            ",
            )?
            .execute(rusqlite::params![criteria.name, criteria.description, id, version])
            .map_err(|e| classify(e, EvaluationCriteria::TABLE, "nom", &criteria.name))?;
        if changed == 0 {
            return Err(lost_race::<EvaluationCriteria>(db, id, version));
        }
        criteria.assign(id, version + 1);
        self.session.kept_criteria.put(criteria);
        Ok(Handle::new(id))
    }
    fn delete(&mut self, criteria: &EvaluationCriteria) -> Result<bool> {
        let Some(id) = criteria.id() else {
            return Ok(false);
        };
        let removed = delete_versioned::<EvaluationCriteria>(
            self.session.connection(),
            id,
            criteria.version(),
            "fk_crit",
        )?;
        self.session.kept_criteria.evict(id);
        Ok(removed)
    }
    fn resolve(&self, handle: Handle<EvaluationCriteria>) -> Option<&EvaluationCriteria> {
        self.session.get(handle)
    }
}
