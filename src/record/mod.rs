//! Count-keyed input records and the line parser that produces them.
//!
//! Each input line carries a count followed by a JSON string literal naming
//! the directory. The literal is kept exactly as written: sources are sorted
//! by their serialized form, so ordering and joining never look at the
//! decoded string.

mod error;

use std::fmt;

pub use error::{ParseWarning, ParseWarningKind};
use serde_json::Value;

/// Serialized JSON string literal used to order and join records.
///
/// Comparison is byte-wise on the literal, which is what the producers sort by.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyToken(String);

impl KeyToken {
    /// Validate that `literal` is exactly one JSON string literal.
    pub fn parse(literal: &str) -> Result<Self, ParseWarningKind> {
        match serde_json::from_str::<Value>(literal) {
            Ok(Value::String(_)) => Ok(Self(literal.to_owned())),
            Ok(_) => Err(ParseWarningKind::NotAString),
            Err(_) => Err(ParseWarningKind::InvalidLiteral),
        }
    }

    /// Literal text as it appeared in the input, quotes included.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the literal into the directory name it denotes.
    pub fn decode(&self) -> Result<String, serde_json::Error> {
        serde_json::from_str(&self.0)
    }
}

impl fmt::Display for KeyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Count attached to the key.
    pub count: u64,
    /// Ordering token.
    pub key: KeyToken,
}

impl Record {
    /// Build a record from an already validated token.
    pub fn new(count: u64, key: KeyToken) -> Self {
        Self { count, key }
    }
}

/// Parse `<count> <ws>+ <json-string-literal>` with surrounding whitespace ignored.
///
/// The line must split on whitespace into exactly two fields, so a literal
/// containing a space is a field-count error. The count must be canonical:
/// rendering the parsed value back must give the original text, which rules
/// out signs, leading zeros and fractions.
pub fn parse_line(line: &str) -> Result<Record, ParseWarningKind> {
    let mut fields = line.split_whitespace();
    let (Some(count_field), Some(literal), None) = (fields.next(), fields.next(), fields.next())
    else {
        return Err(ParseWarningKind::FieldCount);
    };

    let count = parse_canonical_count(count_field)?;
    let key = KeyToken::parse(literal)?;
    Ok(Record { count, key })
}

fn parse_canonical_count(field: &str) -> Result<u64, ParseWarningKind> {
    let count: u64 = field
        .parse()
        .map_err(|_| ParseWarningKind::NonCanonicalCount)?;
    if count.to_string() != field {
        return Err(ParseWarningKind::NonCanonicalCount);
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(literal: &str) -> KeyToken {
        KeyToken::parse(literal).expect("valid literal")
    }

    #[test]
    fn parses_count_and_keeps_literal_verbatim() {
        let record = parse_line("  42   \"dir\\/a\"  ").expect("record");
        assert_eq!(record.count, 42);
        assert_eq!(record.key.as_str(), "\"dir\\/a\"");
        assert_eq!(record.key.decode().expect("decode"), "dir/a");
    }

    #[test]
    fn literal_with_a_space_is_three_fields() {
        assert_eq!(parse_line("7 \"my dir\""), Err(ParseWarningKind::FieldCount));
        assert_eq!(parse_line("7\t\"my\tdir\""), Err(ParseWarningKind::FieldCount));
        // Escaped whitespace keeps the literal a single field.
        let record = parse_line("7\t\"my\\u0020dir\"").expect("record");
        assert_eq!(record.count, 7);
        assert_eq!(record.key.decode().expect("decode"), "my dir");
    }

    #[test]
    fn rejects_non_canonical_counts() {
        for line in [
            "007 \"a\"",
            "+5 \"a\"",
            "-5 \"a\"",
            "5.0 \"a\"",
            "five \"a\"",
            "18446744073709551616 \"a\"",
        ] {
            assert_eq!(
                parse_line(line),
                Err(ParseWarningKind::NonCanonicalCount),
                "{line}"
            );
        }
        assert_eq!(parse_line("0 \"a\"").map(|r| r.count), Ok(0));
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert_eq!(parse_line("5"), Err(ParseWarningKind::FieldCount));
        assert_eq!(parse_line("5   "), Err(ParseWarningKind::FieldCount));
        assert_eq!(
            parse_line("5 \"a\" \"b\""),
            Err(ParseWarningKind::FieldCount)
        );
        assert_eq!(parse_line(""), Err(ParseWarningKind::FieldCount));
    }

    #[test]
    fn rejects_malformed_or_non_string_literals() {
        assert_eq!(parse_line("5 bogus"), Err(ParseWarningKind::InvalidLiteral));
        assert_eq!(parse_line("5 \"open"), Err(ParseWarningKind::InvalidLiteral));
        assert_eq!(parse_line("5 \"a\"x"), Err(ParseWarningKind::InvalidLiteral));
        assert_eq!(parse_line("5 12"), Err(ParseWarningKind::NotAString));
        assert_eq!(parse_line("5 null"), Err(ParseWarningKind::NotAString));
        assert_eq!(parse_line("5 [\"a\"]"), Err(ParseWarningKind::NotAString));
    }

    #[test]
    fn tokens_order_by_serialized_form() {
        // "\u0061" decodes to "a" but sorts by its escaped spelling.
        let escaped = key("\"\\u0061\"");
        let plain = key("\"a\"");
        assert!(escaped < plain);
        assert_ne!(escaped, plain);
        assert_eq!(escaped.decode().expect("decode"), "a");
    }
}
