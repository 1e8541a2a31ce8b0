//! Data mappers: one facet per entity type, all borrowing the same
//! [`Session`](crate::session::Session).
//!
//! Every finder hands back [`Handle`]s. A row that is already kept in the
//! session's identity cache is never rebuilt from the store, so two lookups of
//! the same row always resolve to the same in-memory value.
//!
//! Writes are guarded by the `version` column. `update` and `delete` compare
//! the version carried by the entity with the stored one before writing, and
//! the write itself only touches the row if the version is still the same.

use rusqlite::{Connection, OptionalExtension, Params, Row};

use crate::datatype::{Id, Version};
use crate::entity::{Entity, Handle};
use crate::error::{GuideError, Result};
use crate::session::{Cached, Session};

mod basic_evaluation;
mod city;
mod complete_evaluation;
mod criteria;
mod evaluation;
mod grade;
mod restaurant;
mod restaurant_type;

pub use basic_evaluation::{BasicEvaluationMapper, LikeTally};
pub use city::CityMapper;
pub use complete_evaluation::CompleteEvaluationMapper;
pub use criteria::CriteriaMapper;
pub use evaluation::{EvaluationMapper, EvaluationScope};
pub use grade::GradeMapper;
pub use restaurant::RestaurantMapper;
pub use restaurant_type::RestaurantTypeMapper;

/// The operations every entity mapper offers.
pub trait Mapper {
    type Entity: Cached;

    fn find_by_id(&mut self, id: Id) -> Result<Option<Handle<Self::Entity>>>;
    fn find_all(&mut self) -> Result<Vec<Handle<Self::Entity>>>;
    /// Inserts a new entity, assigning its row number and version 0.
    fn create(&mut self, entity: Self::Entity) -> Result<Handle<Self::Entity>>;
    /// Writes the entity back and bumps its version.
    fn update(&mut self, entity: Self::Entity) -> Result<Handle<Self::Entity>>;
    /// Removes the entity. `false` when its row was already gone.
    fn delete(&mut self, entity: &Self::Entity) -> Result<bool>;
    /// The kept value behind a handle.
    fn resolve(&self, handle: Handle<Self::Entity>) -> Option<&Self::Entity>;

    fn delete_by_id(&mut self, id: Id) -> Result<bool> {
        let Some(handle) = self.find_by_id(id)? else {
            return Ok(false);
        };
        let entity = detached(self.resolve(handle), handle)?;
        self.delete(&entity)
    }
    /// Writes back whatever was changed on the kept value through `get_mut`.
    fn save(&mut self, handle: Handle<Self::Entity>) -> Result<Handle<Self::Entity>> {
        let entity = detached(self.resolve(handle), handle)?;
        self.update(entity)
    }
}

fn detached<T: Entity>(kept: Option<&T>, handle: Handle<T>) -> Result<T> {
    kept.cloned().ok_or(GuideError::NotFound {
        entity: T::NAME,
        id: handle.id(),
    })
}

/// Rows removed per table by a cascading delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeReport {
    pub grades: usize,
    pub complete_evaluations: usize,
    pub basic_evaluations: usize,
    pub restaurants: usize,
}
impl CascadeReport {
    pub fn total(&self) -> usize {
        self.grades + self.complete_evaluations + self.basic_evaluations + self.restaurants
    }
    pub(crate) fn record(&mut self, table: &str, removed: usize) -> Result<()> {
        let tally = match table {
            "NOTES" => &mut self.grades,
            "COMMENTAIRES" => &mut self.complete_evaluations,
            "LIKES" => &mut self.basic_evaluations,
            "RESTAURANTS" => &mut self.restaurants,
            _ => {
                return Err(GuideError::Invariant(format!(
                    "cascade removed rows from {table}, which is not part of any cascade"
                )));
            }
        };
        *tally += removed;
        Ok(())
    }
}

/// One statement of a cascading delete, bound to the id of the root row.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CascadeStep {
    pub table: &'static str,
    pub column: &'static str,
    pub sql: &'static str,
}

pub(crate) fn run_cascade(
    db: &Connection,
    steps: &[CascadeStep],
    root: Id,
    report: &mut CascadeReport,
) -> Result<()> {
    for step in steps {
        let removed = db
            .prepare_cached(step.sql)?
            .execute([root])
            .map_err(|e| crate::error::classify(e, step.table, step.column, root))?;
        tracing::trace!(table = step.table, removed, root, "cascade step");
        report.record(step.table, removed)?;
    }
    Ok(())
}

// ------------- row helpers -------------
pub(crate) fn collect<T, P: Params>(
    db: &Connection,
    sql: &str,
    params: P,
    read: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>> {
    let mut statement = db.prepare_cached(sql)?;
    let rows = statement.query_map(params, read)?;
    Ok(rows.collect::<rusqlite::Result<Vec<T>>>()?)
}

pub(crate) fn first<T, P: Params>(
    db: &Connection,
    sql: &str,
    params: P,
    read: impl FnOnce(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Option<T>> {
    Ok(db.prepare_cached(sql)?.query_row(params, read).optional()?)
}

pub(crate) fn ids<P: Params>(db: &Connection, sql: &str, params: P) -> Result<Vec<Id>> {
    collect(db, sql, params, |r| r.get(0))
}

pub(crate) fn count<P: Params>(db: &Connection, sql: &str, params: P) -> Result<usize> {
    let n: i64 = db.prepare_cached(sql)?.query_row(params, |r| r.get(0))?;
    usize::try_from(n).map_err(|_| GuideError::DataCorruption {
        message: format!("negative count {n}"),
    })
}

/// The handle of a kept row, if the session already holds it.
pub(crate) fn kept<T: Cached>(session: &Session<'_>, id: Id) -> Option<Handle<T>> {
    if T::cache(session).contains(id) {
        tracing::debug!(entity = T::NAME, id, "cache hit");
        Some(Handle::new(id))
    } else {
        None
    }
}

// ------------- optimistic locking -------------
/// What the store holds for a row compared to the version we carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stored {
    Missing,
    Current,
    Stale(Version),
}

pub(crate) fn stored_version<T: Entity>(db: &Connection, id: Id, expected: Version) -> Result<Stored> {
    let found: Option<Version> = first(
        db,
        &format!("select version from {} where numero = ?", T::TABLE),
        [id],
        |r| r.get(0),
    )?;
    Ok(match found {
        None => Stored::Missing,
        Some(v) if v == expected => Stored::Current,
        Some(v) => Stored::Stale(v),
    })
}

pub(crate) fn conflict<T: Entity>(id: Id, expected: Version, found: Version) -> GuideError {
    tracing::warn!(entity = T::NAME, id, expected, found, "stale version");
    GuideError::Conflict {
        entity: T::NAME,
        id,
        expected,
        found,
    }
}

/// Fails unless the stored row exists with the version the entity carries.
pub(crate) fn expect_current<T: Entity>(db: &Connection, entity: &T) -> Result<Id> {
    let id = require_id(entity)?;
    match stored_version::<T>(db, id, entity.version())? {
        Stored::Current => Ok(id),
        Stored::Missing => Err(GuideError::NotFound {
            entity: T::NAME,
            id,
        }),
        Stored::Stale(found) => Err(conflict::<T>(id, entity.version(), found)),
    }
}

/// A foreign key of a stored row, read before the row is rewritten. The kept
/// value may already carry the new reference when it was edited in place.
pub(crate) fn stored_reference<T: Entity>(db: &Connection, id: Id, column: &str) -> Result<Id> {
    first(
        db,
        &format!("select {column} from {} where numero = ?", T::TABLE),
        [id],
        |r| r.get(0),
    )?
    .ok_or(GuideError::NotFound {
        entity: T::NAME,
        id,
    })
}

/// Like [`stored_reference`], but a missing row is `None`.
pub(crate) fn owner_of<T: Entity>(db: &Connection, id: Id, column: &str) -> Result<Option<Id>> {
    match stored_reference::<T>(db, id, column) {
        Ok(owner) => Ok(Some(owner)),
        Err(GuideError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Explains a compare-and-swap that touched no row.
pub(crate) fn lost_race<T: Entity>(db: &Connection, id: Id, expected: Version) -> GuideError {
    match stored_version::<T>(db, id, expected) {
        Ok(Stored::Missing) => GuideError::NotFound {
            entity: T::NAME,
            id,
        },
        Ok(Stored::Stale(found)) => conflict::<T>(id, expected, found),
        Ok(Stored::Current) => GuideError::Invariant(format!(
            "{} {id} kept version {expected} but the write touched nothing",
            T::NAME
        )),
        Err(e) => e,
    }
}

/// Deletes one row if it still has the expected version. `false` when it was
/// already gone.
pub(crate) fn delete_versioned<T: Entity>(
    db: &Connection,
    id: Id,
    version: Version,
    column: &'static str,
) -> Result<bool> {
    let removed = db
        .prepare_cached(&format!(
            "delete from {} where numero = ? and version = ?",
            T::TABLE
        ))?
        .execute(rusqlite::params![id, version])
        .map_err(|e| crate::error::classify(e, T::TABLE, column, id))?;
    if removed == 1 {
        return Ok(true);
    }
    match lost_race::<T>(db, id, version) {
        GuideError::NotFound { .. } => Ok(false),
        e => Err(e),
    }
}

pub(crate) fn require_id<T: Entity>(entity: &T) -> Result<Id> {
    entity
        .id()
        .ok_or_else(|| GuideError::Invalid(format!("this {} has never been created", T::NAME)))
}

pub(crate) fn require_new<T: Entity>(entity: &T) -> Result<()> {
    match entity.id() {
        None => Ok(()),
        Some(id) => Err(GuideError::Invalid(format!(
            "{} {id} already exists and cannot be created again",
            T::NAME
        ))),
    }
}

pub(crate) fn missing_reference<T: Entity>(owner: &'static str, id: Id, target: Id) -> GuideError {
    GuideError::DataCorruption {
        message: format!("{owner} {id} refers to missing {} {target}", T::NAME),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cascade_report_counts_per_table() {
        let mut report = CascadeReport::default();
        report.record("NOTES", 3).unwrap();
        report.record("COMMENTAIRES", 1).unwrap();
        report.record("LIKES", 2).unwrap();
        report.record("RESTAURANTS", 1).unwrap();
        assert_eq!(report.grades, 3);
        assert_eq!(report.total(), 7);
    }

    #[test]
    fn cascade_report_refuses_unknown_tables() {
        let mut report = CascadeReport::default();
        let err = report.record("NOTE", 2).unwrap_err();
        assert!(matches!(err, GuideError::Invariant(_)));
        assert_eq!(report.total(), 0);
    }

    #[test]
    fn every_cascade_step_is_counted() {
        let steps = super::restaurant::RESTAURANT_CASCADE
            .iter()
            .chain(super::complete_evaluation::COMPLETE_EVALUATION_CASCADE.iter());
        for step in steps {
            let mut report = CascadeReport::default();
            report.record(step.table, 1).unwrap();
            assert_eq!(report.total(), 1, "{}", step.table);
        }
    }
}
