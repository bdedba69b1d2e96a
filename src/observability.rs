//! `tracing` macros shared by every pipeline stage.
//!
//! Events go to target `dirent_audit`, so `RUST_LOG=dirent_audit=debug` turns on
//! the whole pipeline without touching dependencies. Only the binary installs a
//! subscriber.
//!
//! Every event names its stage and what happened:
//!
//! | `component` | `event` | level |
//! |---|---|---|
//! | `parser` | `line_dropped`, `source_exhausted` | warn, debug |
//! | `merge` | `merge_failed`, `merge_finished` | error, debug |
//! | `classify` | `zero_raw_count` | warn |
//! | `audit` | `source_rejected`, `lines_dropped`, `audit_completed` | error, warn, info |
//!
//! Events about one input carry `source` set to that input's label (`raw` or
//! `reported` from the CLI). `line_dropped` adds the 1-based `line` and the
//! `reason` code of [`ParseWarningKind`](crate::record::ParseWarningKind).
//! Nothing is logged per emitted row.

/// Target of every event the crate emits.
pub(crate) const AUDIT_TARGET: &str = "dirent_audit";

/// `info` event on the audit target.
///
/// ```ignore
/// log_info!(component = "audit", event = "audit_completed", rows = 12);
/// ```
macro_rules! log_info {
    ($($field:tt)*) => {
        ::tracing::info!(target: $crate::observability::AUDIT_TARGET, $($field)*)
    };
}

macro_rules! log_debug {
    ($($field:tt)*) => {
        ::tracing::debug!(target: $crate::observability::AUDIT_TARGET, $($field)*)
    };
}

/// Dropped input and table discrepancies.
macro_rules! log_warn {
    ($($field:tt)*) => {
        ::tracing::warn!(target: $crate::observability::AUDIT_TARGET, $($field)*)
    };
}

/// Fatal conditions, logged once before the error is returned.
macro_rules! log_error {
    ($($field:tt)*) => {
        ::tracing::error!(target: $crate::observability::AUDIT_TARGET, $($field)*)
    };
}

pub(crate) use {log_debug, log_error, log_info, log_warn};
