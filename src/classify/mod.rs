//! Decision table turning raw/reported joined rows into diagnostics.
//!
//! Slot 0 carries the raw count computed from the directory's actual entries,
//! slot 1 the reported count stored by the optimizer. The merge engine joins
//! any number of sources; this stage only accepts exactly those two.

use std::fmt;

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::{
    observability::log_warn,
    record::{KeyToken, Record},
    stream::merge::JoinedRow,
};

/// Slots a classified row must have.
pub const CLASSIFIED_SLOTS: usize = 2;

/// Outcome recorded for one directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Status {
    /// Both counts present and equal.
    CountOkay,
    /// Both counts present and different.
    CountMismatch,
    /// Raw count of zero with no reported count.
    MissingOptimizedCount,
    /// Non-zero raw count with no reported count.
    MismatchNoOptimizedCount,
    /// Reported count of zero for a directory with no raw count.
    LeakedOptimizedCount,
    /// Non-zero reported count for a directory with no raw count.
    MismatchNoEntries,
}

impl Status {
    /// Every status, in table order.
    pub const ALL: [Status; 6] = [
        Status::CountOkay,
        Status::CountMismatch,
        Status::MissingOptimizedCount,
        Status::MismatchNoOptimizedCount,
        Status::LeakedOptimizedCount,
        Status::MismatchNoEntries,
    ];

    /// Message written to the `status` field.
    pub fn message(&self) -> &'static str {
        match self {
            Status::CountOkay => "count okay",
            Status::CountMismatch => "error: count mismatch",
            Status::MissingOptimizedCount => "warn: missing optimized count",
            Status::MismatchNoOptimizedCount => "error: count mismatch (no optimized count)",
            Status::LeakedOptimizedCount => "warn: leaked optimized count",
            Status::MismatchNoEntries => "error: count mismatch (no entries)",
        }
    }

    /// Whether the status is an error rather than a warning or success.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Status::CountMismatch | Status::MismatchNoOptimizedCount | Status::MismatchNoEntries
        )
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl Serialize for Status {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.message())
    }
}

/// One output record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Decoded directory name.
    pub dirname: String,
    /// Raw entry count, 0 when absent.
    pub ndirents: u64,
    /// Reported count, 0 when absent.
    pub nreported: u64,
    /// Classification.
    pub status: Status,
}

/// Rows the classifier cannot handle.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// The row does not have exactly two slots.
    #[error("expected two slots per row, found {found}")]
    Arity {
        /// Slots present on the row.
        found: usize,
    },
    /// Neither slot is populated.
    #[error("row for {key} has no populated slot")]
    EmptyRow {
        /// Key of the offending row.
        key: KeyToken,
    },
    /// The key literal could not be decoded.
    #[error("cannot decode key {key}: {source}")]
    Key {
        /// Key of the offending row.
        key: KeyToken,
        /// Decoder failure.
        #[source]
        source: serde_json::Error,
    },
}

/// Applies the raw/reported decision table.
#[derive(Debug, Clone, Copy, Default)]
pub struct Classifier {
    verbose: bool,
}

impl Classifier {
    /// When `verbose` is false, rows whose counts agree produce no diagnostic.
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Status for a raw/reported pair; `None` only when both are absent.
    pub fn status(raw: Option<u64>, reported: Option<u64>) -> Option<Status> {
        // A zero reported count next to a raw count means nothing was optimized.
        let reported_on_raw = reported.filter(|count| *count != 0);
        let status = match (raw, reported) {
            (Some(raw), _) => match reported_on_raw {
                Some(reported) if reported == raw => Status::CountOkay,
                Some(_) => Status::CountMismatch,
                None if raw == 0 => Status::MissingOptimizedCount,
                None => Status::MismatchNoOptimizedCount,
            },
            (None, Some(0)) => Status::LeakedOptimizedCount,
            (None, Some(_)) => Status::MismatchNoEntries,
            (None, None) => return None,
        };
        Some(status)
    }

    /// Classify one joined row. Returns `Ok(None)` for suppressed rows.
    pub fn classify(&self, row: JoinedRow) -> Result<Option<Diagnostic>, ClassifyError> {
        let JoinedRow { key, slots } = row;
        let [raw, reported]: [Option<Record>; CLASSIFIED_SLOTS] = slots
            .try_into()
            .map_err(|slots: Vec<_>| ClassifyError::Arity { found: slots.len() })?;
        let raw = raw.map(|record| record.count);
        let reported = reported.map(|record| record.count);

        let Some(status) = Self::status(raw, reported) else {
            return Err(ClassifyError::EmptyRow { key });
        };
        if raw == Some(0) {
            log_warn!(
                component = "classify",
                event = "zero_raw_count",
                key = %key,
                reported = ?reported,
                status = %status,
            );
        }
        if status == Status::CountOkay && !self.verbose {
            return Ok(None);
        }

        let dirname = key
            .decode()
            .map_err(|source| ClassifyError::Key {
                key: key.clone(),
                source,
            })?;
        Ok(Some(Diagnostic {
            dirname,
            ndirents: raw.unwrap_or(0),
            nreported: reported.unwrap_or(0),
            status,
        }))
    }
}
