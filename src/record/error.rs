use std::fmt;

use thiserror::Error;

/// Reason a line was rejected by the record parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParseWarningKind {
    /// The line did not split into a count followed by a single key literal.
    FieldCount,
    /// The count is not a canonical non-negative decimal integer.
    NonCanonicalCount,
    /// The key is not a syntactically valid JSON literal.
    InvalidLiteral,
    /// The key is valid JSON but does not decode to a string.
    NotAString,
}

impl ParseWarningKind {
    /// Every reason code, in reporting order.
    pub const ALL: [ParseWarningKind; 4] = [
        ParseWarningKind::FieldCount,
        ParseWarningKind::NonCanonicalCount,
        ParseWarningKind::InvalidLiteral,
        ParseWarningKind::NotAString,
    ];

    /// Stable reason code used in logs and summaries.
    pub fn code(&self) -> &'static str {
        match self {
            ParseWarningKind::FieldCount => "field_count",
            ParseWarningKind::NonCanonicalCount => "non_canonical_count",
            ParseWarningKind::InvalidLiteral => "invalid_literal",
            ParseWarningKind::NotAString => "not_a_string",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            ParseWarningKind::FieldCount => 0,
            ParseWarningKind::NonCanonicalCount => 1,
            ParseWarningKind::InvalidLiteral => 2,
            ParseWarningKind::NotAString => 3,
        }
    }
}

impl fmt::Display for ParseWarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Recoverable rejection of a single input line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {kind}")]
pub struct ParseWarning {
    /// 1-based line number within its source.
    pub line: u64,
    /// Why the line was dropped.
    pub kind: ParseWarningKind,
}
