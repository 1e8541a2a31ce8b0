//! The unit-of-work boundary. Services own it; mappers only ever nest a
//! savepoint inside whatever the caller has opened.

use rusqlite::Connection;

use crate::error::{GuideError, Result};

pub trait TransactionBoundary {
    fn begin(&self) -> Result<()>;
    fn commit(&self) -> Result<()>;
    fn rollback(&self) -> Result<()>;
}

impl TransactionBoundary for Connection {
    fn begin(&self) -> Result<()> {
        if !self.is_autocommit() {
            return Err(GuideError::Invariant(
                "a unit of work is already open on this connection".into(),
            ));
        }
        self.execute_batch("begin immediate")?;
        tracing::debug!("unit of work started");
        Ok(())
    }
    fn commit(&self) -> Result<()> {
        self.execute_batch("commit")?;
        tracing::debug!("unit of work committed");
        Ok(())
    }
    fn rollback(&self) -> Result<()> {
        if self.is_autocommit() {
            // nothing open, the store already discarded it
            return Ok(());
        }
        self.execute_batch("rollback")?;
        tracing::debug!("unit of work rolled back");
        Ok(())
    }
}

/// Runs `work` under a named savepoint: its statements all stay or all go.
pub fn within_savepoint<R>(
    db: &Connection,
    name: &str,
    work: impl FnOnce() -> Result<R>,
) -> Result<R> {
    db.execute_batch(&format!("savepoint {name}"))?;
    match work() {
        Ok(outcome) => {
            db.execute_batch(&format!("release {name}"))?;
            Ok(outcome)
        }
        Err(e) => {
            if let Err(undo) = db.execute_batch(&format!("rollback to {name}; release {name}")) {
                tracing::error!(savepoint = name, error = %undo, "could not undo savepoint");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        let db = Connection::open_in_memory().unwrap();
        db.execute_batch("create table T (v integer)").unwrap();
        db
    }

    fn count(db: &Connection) -> i64 {
        db.query_row("select count(*) from T", [], |r| r.get(0)).unwrap()
    }

    #[test]
    fn savepoint_undoes_partial_work() {
        let db = setup();
        let outcome: Result<()> = within_savepoint(&db, "partial", || {
            db.execute("insert into T values (1)", [])?;
            Err(GuideError::Invalid("stop".into()))
        });
        assert!(outcome.is_err());
        assert_eq!(count(&db), 0);
    }

    #[test]
    fn savepoint_nests_in_a_unit_of_work() {
        let db = setup();
        db.begin().unwrap();
        within_savepoint(&db, "nested", || {
            db.execute("insert into T values (1)", [])?;
            Ok(())
        })
        .unwrap();
        assert!(!db.is_autocommit());
        db.rollback().unwrap();
        assert_eq!(count(&db), 0);
    }

    #[test]
    fn nested_begin_is_refused() {
        let db = setup();
        db.begin().unwrap();
        assert!(matches!(db.begin(), Err(GuideError::Invariant(_))));
        db.commit().unwrap();
    }
}
