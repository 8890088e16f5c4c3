use std::{fmt, str::FromStr};

use jiff::civil::Date;
use thiserror::Error;

/// The seven ageing buckets of the fact table, in column order.  A document
/// with age `d` days falls in the first bucket whose upper bound is `>= d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AgeingBucket {
    Day30,
    Day60,
    Day90,
    Day120,
    Day150,
    Day180,
    Day180AndAbove,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown ageing bucket {0:?}")]
pub struct ParseError(pub String);

impl AgeingBucket {
    pub const ALL: [AgeingBucket; 7] = [
        AgeingBucket::Day30,
        AgeingBucket::Day60,
        AgeingBucket::Day90,
        AgeingBucket::Day120,
        AgeingBucket::Day150,
        AgeingBucket::Day180,
        AgeingBucket::Day180AndAbove,
    ];

    /// Classify an age in days.  Negative ages (documents dated after the
    /// snapshot) end up in the first bucket.
    pub fn for_age(days: i64) -> AgeingBucket {
        match days {
            i64::MIN..=30 => AgeingBucket::Day30,
            31..=60 => AgeingBucket::Day60,
            61..=90 => AgeingBucket::Day90,
            91..=120 => AgeingBucket::Day120,
            121..=150 => AgeingBucket::Day150,
            151..=180 => AgeingBucket::Day180,
            _ => AgeingBucket::Day180AndAbove,
        }
    }

    /// Bucket of a document dated `document_date` as at `as_at_date`.
    pub fn for_dates(document_date: Date, as_at_date: Date) -> AgeingBucket {
        AgeingBucket::for_age((as_at_date - document_date).get_days().into())
    }

    /// Inclusive upper bound in days, `None` for the open ended bucket.
    pub fn max_days(&self) -> Option<i64> {
        match self {
            AgeingBucket::Day30 => Some(30),
            AgeingBucket::Day60 => Some(60),
            AgeingBucket::Day90 => Some(90),
            AgeingBucket::Day120 => Some(120),
            AgeingBucket::Day150 => Some(150),
            AgeingBucket::Day180 => Some(180),
            AgeingBucket::Day180AndAbove => None,
        }
    }

    /// Name of the fact table column.
    pub fn column(&self) -> &'static str {
        match self {
            AgeingBucket::Day30 => "day_30",
            AgeingBucket::Day60 => "day_60",
            AgeingBucket::Day90 => "day_90",
            AgeingBucket::Day120 => "day_120",
            AgeingBucket::Day150 => "day_150",
            AgeingBucket::Day180 => "day_180",
            AgeingBucket::Day180AndAbove => "day_180_and_above",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for AgeingBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for AgeingBucket {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgeingBucket::ALL
            .into_iter()
            .find(|b| b.column().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseError(s.to_string()))
    }
}
