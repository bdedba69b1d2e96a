#![deny(missing_docs)]
//! Streaming audit of directory entry counts.
//!
//! Two line-oriented inputs carry `<count> <json-string>` records sorted by the
//! serialized key: the raw counts computed from actual directory entries and the
//! counts previously reported by the optimizer. The crate joins them with an
//! N-way sorted merge, classifies every key through a fixed decision table and
//! writes one JSON diagnostic per line.
//!
//! ```no_run
//! use dirent_audit::{audit, AuditOptions, DiagnosticSink, RecordStream};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let options = AuditOptions::default();
//! let raw = tokio::fs::File::open("raw.txt").await?;
//! let reported = tokio::fs::File::open("reported.txt").await?;
//! let sources = vec![
//!     RecordStream::new("raw", raw, &options),
//!     RecordStream::new("reported", reported, &options),
//! ];
//! let summary = audit(sources, DiagnosticSink::new(tokio::io::stdout(), &options), &options).await?;
//! println!("{} rows, {} warnings", summary.rows, summary.warnings());
//! # Ok(())
//! # }
//! ```

pub(crate) mod observability;

/// Pipeline driver and run summaries.
pub mod audit;

/// Decision table for raw/reported rows.
pub mod classify;

/// Runtime options.
pub mod option;

/// Input records and the line parser.
pub mod record;

/// JSON-lines diagnostic output.
pub mod sink;

/// Record sources and the merge engine.
pub mod stream;

pub use crate::{
    audit::{audit, Audit, AuditError, AuditSummary, Outcome, SourceSummary},
    classify::{Classifier, ClassifyError, Diagnostic, Status},
    option::AuditOptions,
    record::{parse_line, KeyToken, ParseWarning, ParseWarningKind, Record},
    sink::{DiagnosticCodec, DiagnosticSink},
    stream::{
        merge::{JoinedRow, MergeError, MergeStream},
        ParseStats, RecordStream, SourceError,
    },
};
