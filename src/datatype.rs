// used for persistence
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

// used to print out readable forms of a data type
use std::fmt;

use crate::error::{GuideError, Result};

/// Row number of an entity, the `numero` column of every table.
pub type Id = i64;
/// Optimistic locking counter, the `version` column of every table.
pub type Version = i64;

// ------------- Appreciation -------------
/// The like/dislike flag of a basic evaluation as stored in `LIKES.appreciation`.
///
/// Written as `'T'` or `'F'`. Reading compares by value and also accepts the
/// legacy `'1'`/`'0'` codes; anything else is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Appreciation(pub bool);

impl Appreciation {
    pub const LIKE: char = 'T';
    pub const DISLIKE: char = 'F';

    pub fn code(self) -> char {
        if self.0 { Self::LIKE } else { Self::DISLIKE }
    }
    pub fn decode(code: &str) -> Option<Self> {
        match code.trim() {
            "T" | "1" => Some(Self(true)),
            "F" | "0" => Some(Self(false)),
            _ => None,
        }
    }
    pub fn likes(self) -> bool {
        self.0
    }
}
impl From<bool> for Appreciation {
    fn from(likes: bool) -> Self {
        Self(likes)
    }
}
impl ToSql for Appreciation {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code().to_string()))
    }
}
impl FromSql for Appreciation {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let code = value.as_str()?;
        Appreciation::decode(code)
            .ok_or_else(|| FromSqlError::Other(format!("unknown appreciation code '{code}'").into()))
    }
}
impl fmt::Display for Appreciation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", if self.0 { "like" } else { "dislike" })
    }
}

// ------------- Score -------------
/// A grade given to one criterion, always within 1..=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Score(u8);

impl Score {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: u8) -> Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(GuideError::Invalid(format!(
                "a grade must be between {} and {}, got {value}",
                Self::MIN,
                Self::MAX
            )))
        }
    }
    pub fn value(self) -> u8 {
        self.0
    }
}
impl TryFrom<i64> for Score {
    type Error = GuideError;
    fn try_from(value: i64) -> Result<Self> {
        u8::try_from(value)
            .map_err(|_| GuideError::Invalid(format!("a grade must be between 1 and 5, got {value}")))
            .and_then(Score::new)
    }
}
impl ToSql for Score {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(i64::from(self.0)))
    }
}
impl FromSql for Score {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = value.as_i64()?;
        Score::try_from(raw).map_err(|_| FromSqlError::OutOfRange(raw))
    }
}
impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.0, Self::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn appreciation_round_trips_through_its_code() {
        for likes in [true, false] {
            let code = Appreciation(likes).code().to_string();
            assert_eq!(Appreciation::decode(&code), Some(Appreciation(likes)));
        }
    }

    #[test]
    fn appreciation_accepts_legacy_codes_by_value() {
        let one = String::from("1");
        assert_eq!(Appreciation::decode(&one), Some(Appreciation(true)));
        assert_eq!(Appreciation::decode("0"), Some(Appreciation(false)));
        assert_eq!(Appreciation::decode("Y"), None);
    }

    #[test]
    fn appreciation_survives_the_store() {
        let db = Connection::open_in_memory().unwrap();
        db.execute_batch("create table A (code text)").unwrap();
        db.execute("insert into A values (?1)", [Appreciation(true)]).unwrap();
        let stored: String = db.query_row("select code from A", [], |r| r.get(0)).unwrap();
        assert_eq!(stored, "T");
        let read: Appreciation = db.query_row("select code from A", [], |r| r.get(0)).unwrap();
        assert!(read.likes());
        db.execute("update A set code = 'x'", []).unwrap();
        assert!(db.query_row("select code from A", [], |r| r.get::<_, Appreciation>(0)).is_err());
    }

    #[test]
    fn score_is_bounded() {
        assert!(Score::new(0).is_err());
        assert!(Score::new(6).is_err());
        assert!(Score::try_from(-3).is_err());
        assert_eq!(Score::new(5).unwrap().value(), 5);
        assert_eq!(Score::try_from(1).unwrap().value(), 1);
    }
}
