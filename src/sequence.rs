// used for persistence
use rusqlite::{Connection, OptionalExtension};

use crate::datatype::Id;
use crate::error::{GuideError, Result};

/// The counters handing out row numbers, one per table. Both evaluation tables
/// draw from `SEQ_EVAL` so an evaluation number is unique across them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sequence {
    Cities,
    RestaurantTypes,
    Restaurants,
    Evaluations,
    Grades,
    Criteria,
}

impl Sequence {
    pub const ALL: [Sequence; 6] = [
        Sequence::Cities,
        Sequence::RestaurantTypes,
        Sequence::Restaurants,
        Sequence::Evaluations,
        Sequence::Grades,
        Sequence::Criteria,
    ];
    pub fn name(self) -> &'static str {
        match self {
            Self::Cities => "SEQ_VILLES",
            Self::RestaurantTypes => "SEQ_TYPES_GASTRONOMIQUES",
            Self::Restaurants => "SEQ_RESTAURANTS",
            Self::Evaluations => "SEQ_EVAL",
            Self::Grades => "SEQ_NOTES",
            Self::Criteria => "SEQ_CRITERES_EVALUATION",
        }
    }
    /// Tables whose row numbers come from this counter.
    pub fn tables(self) -> &'static [&'static str] {
        match self {
            Self::Cities => &["VILLES"],
            Self::RestaurantTypes => &["TYPES_GASTRONOMIQUES"],
            Self::Restaurants => &["RESTAURANTS"],
            Self::Evaluations => &["LIKES", "COMMENTAIRES"],
            Self::Grades => &["NOTES"],
            Self::Criteria => &["CRITERES_EVALUATION"],
        }
    }
}

/// Source of fresh row numbers. Values handed out are strictly increasing per
/// sequence and never handed out twice.
pub trait SequenceAllocator {
    fn allocate(&self, db: &Connection, sequence: Sequence) -> Result<Id>;
}

/// Counters kept in the `SEQUENCES` table of the store itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct StoredSequences;

impl SequenceAllocator for StoredSequences {
    fn allocate(&self, db: &Connection, sequence: Sequence) -> Result<Id> {
        let next = db
            .prepare_cached(
                "
                update SEQUENCES
                    set current_value = current_value + 1
                    where name = ?
                    returning current_value
            ",
            )?
            .query_row([sequence.name()], |r| r.get::<_, Id>(0))
            .optional()?;
        match next {
            Some(id) => {
                tracing::trace!(sequence = sequence.name(), id, "allocated");
                Ok(id)
            }
            None => Err(GuideError::Invariant(format!(
                "sequence {} is not installed",
                sequence.name()
            ))),
        }
    }
}
