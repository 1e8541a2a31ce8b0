//! Evaluations looked up without knowing their kind. Each kind keeps its own
//! table; the lookups read both and tag every row with the table it came from.

use rusqlite::types::Type;
use rusqlite::Row;

use super::basic_evaluation::BasicRow;
use super::complete_evaluation::CompleteRow;
use super::{collect, Mapper};
use crate::datatype::Id;
use crate::entity::{Evaluation, EvaluationKind, Handle};
use crate::error::{GuideError, Result};
use crate::session::Session;

// Both concrete tables, with their columns lined up and a leading source tag.
const TAGGED: &str = "
    select * from (
        select 'LIKES' as source, numero, date_eval, fk_rest, version,
               appreciation, adresse_ip, null as commentaire, null as nom_utilisateur
        from LIKES
        union all
        select 'COMMENTAIRES', numero, date_eval, fk_rest, version,
               null, null, commentaire, nom_utilisateur
        from COMMENTAIRES
    )";

/// Which kinds of evaluation a lookup should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvaluationScope {
    #[default]
    All,
    Basic,
    Complete,
}

enum TaggedRow {
    Basic(BasicRow),
    Complete(CompleteRow),
}
impl TaggedRow {
    fn read(r: &Row<'_>) -> rusqlite::Result<Self> {
        let source: String = r.get(0)?;
        match EvaluationKind::from_table(&source) {
            Some(EvaluationKind::Basic) => Ok(Self::Basic(BasicRow {
                id: r.get(1)?,
                visit_date: r.get(2)?,
                restaurant: r.get(3)?,
                version: r.get(4)?,
                appreciation: r.get(5)?,
                ip_address: r.get(6)?,
            })),
            Some(EvaluationKind::Complete) => Ok(Self::Complete(CompleteRow {
                id: r.get(1)?,
                visit_date: r.get(2)?,
                restaurant: r.get(3)?,
                version: r.get(4)?,
                comment: r.get(7)?,
                username: r.get(8)?,
            })),
            None => Err(rusqlite::Error::FromSqlConversionFailure(
                0,
                Type::Text,
                format!("unknown evaluation source {source}").into(),
            )),
        }
    }
}

pub struct EvaluationMapper<'s, 'db> {
    session: &'s mut Session<'db>,
}

impl<'s, 'db> EvaluationMapper<'s, 'db> {
    pub(crate) fn new(session: &'s mut Session<'db>) -> Self {
        Self { session }
    }

    fn materialize(&mut self, row: TaggedRow) -> Result<Evaluation> {
        Ok(match row {
            TaggedRow::Basic(row) => {
                Evaluation::Basic(self.session.basic_evaluations().materialize(row)?)
            }
            TaggedRow::Complete(row) => {
                Evaluation::Complete(self.session.complete_evaluations().materialize(row)?)
            }
        })
    }
    fn materialize_all(&mut self, rows: Vec<TaggedRow>) -> Result<Vec<Evaluation>> {
        rows.into_iter().map(|row| self.materialize(row)).collect()
    }

    /// The evaluation with this number, whichever table holds it.
    pub fn find_by_id(&mut self, id: Id) -> Result<Option<Evaluation>> {
        if self.session.kept_basic_evaluations.contains(id) {
            return Ok(Some(Evaluation::Basic(Handle::new(id))));
        }
        if self.session.kept_complete_evaluations.contains(id) {
            return Ok(Some(Evaluation::Complete(Handle::new(id))));
        }
        let mut rows = collect(
            self.session.connection(),
            &format!("{TAGGED} where numero = ?"),
            [id],
            TaggedRow::read,
        )?;
        if rows.len() > 1 {
            return Err(GuideError::DataCorruption {
                message: format!("evaluation {id} is stored in both evaluation tables"),
            });
        }
        rows.pop().map(|row| self.materialize(row)).transpose()
    }
    pub fn find_all(&mut self) -> Result<Vec<Evaluation>> {
        let rows = collect(
            self.session.connection(),
            &format!("{TAGGED} order by numero"),
            [],
            TaggedRow::read,
        )?;
        self.materialize_all(rows)
    }
    /// Evaluations of one restaurant, most recent visit first. Basic-only
    /// lookups keep their oldest-first order.
    pub fn find_by_restaurant_id(
        &mut self,
        restaurant: Id,
        scope: EvaluationScope,
    ) -> Result<Vec<Evaluation>> {
        match scope {
            EvaluationScope::All => {
                let rows = collect(
                    self.session.connection(),
                    &format!("{TAGGED} where fk_rest = ? order by date_eval desc, numero desc"),
                    [restaurant],
                    TaggedRow::read,
                )?;
                self.materialize_all(rows)
            }
            EvaluationScope::Basic => Ok(self
                .session
                .basic_evaluations()
                .find_by_restaurant_id(restaurant)?
                .into_iter()
                .map(Evaluation::Basic)
                .collect()),
            EvaluationScope::Complete => Ok(self
                .session
                .complete_evaluations()
                .find_by_restaurant_id(restaurant)?
                .into_iter()
                .map(Evaluation::Complete)
                .collect()),
        }
    }
    /// Deletes through the mapper of the evaluation's own kind. `false` when
    /// no evaluation has this number.
    pub fn delete_by_id(&mut self, id: Id) -> Result<bool> {
        match self.find_by_id(id)? {
            None => Ok(false),
            Some(Evaluation::Basic(_)) => self.session.basic_evaluations().delete_by_id(id),
            Some(Evaluation::Complete(_)) => self.session.complete_evaluations().delete_by_id(id),
        }
    }
    pub fn delete(&mut self, evaluation: Evaluation) -> Result<bool> {
        self.delete_by_id(evaluation.id())
    }
}
