//! Per-source record streams and the merge engine that joins them.

pub mod merge;

use std::{
    fmt, io,
    pin::Pin,
    task::{Context, Poll},
};

use futures::{ready, Stream};
use pin_project_lite::pin_project;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

use crate::{
    observability::{log_debug, log_warn},
    option::AuditOptions,
    record::{parse_line, ParseWarning, ParseWarningKind, Record},
};

/// Fatal failures raised while reading a source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The underlying reader failed (including invalid UTF-8).
    #[error("source io error: {0}")]
    Io(#[from] io::Error),
    /// A line exceeded the configured maximum length.
    #[error("line exceeds the maximum length of {max} bytes")]
    LineTooLong {
        /// Configured limit.
        max: usize,
    },
}

impl SourceError {
    fn from_codec(err: LinesCodecError, max: usize) -> Self {
        match err {
            LinesCodecError::MaxLineLengthExceeded => SourceError::LineTooLong { max },
            LinesCodecError::Io(err) => SourceError::Io(err),
        }
    }
}

/// Line accounting for one source.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ParseStats {
    /// Lines read, blank ones included.
    pub lines: u64,
    /// Blank lines skipped without a warning.
    pub blank: u64,
    /// Lines turned into records.
    pub records: u64,
    warnings: [u64; ParseWarningKind::ALL.len()],
}

impl ParseStats {
    /// Total number of dropped lines.
    pub fn warnings(&self) -> u64 {
        self.warnings.iter().sum()
    }

    /// Dropped lines for one reason code.
    pub fn warnings_for(&self, kind: ParseWarningKind) -> u64 {
        self.warnings[kind.index()]
    }

    /// Fold another source's counters into this one.
    pub fn merge(&mut self, other: &ParseStats) {
        self.lines += other.lines;
        self.blank += other.blank;
        self.records += other.records;
        for (total, add) in self.warnings.iter_mut().zip(other.warnings.iter()) {
            *total += add;
        }
    }

    pub(crate) fn record_warning(&mut self, warning: &ParseWarning) {
        self.warnings[warning.kind.index()] += 1;
    }
}

pin_project! {
    /// Turns a line-oriented reader into a stream of [`Record`]s.
    ///
    /// Malformed lines are dropped and counted in [`ParseStats`]; only reader
    /// failures end the stream with an error. Blank lines are not warnings: they
    /// are skipped and only counted in [`ParseStats::blank`], unlike any other
    /// line that fails to split into two fields. At most one record is produced
    /// per poll, so nothing is read ahead of demand beyond the reader's own buffer.
    pub struct RecordStream<R> {
        #[pin]
        lines: FramedRead<R, LinesCodec>,
        label: String,
        max_line_length: usize,
        line_no: u64,
        stats: ParseStats,
        done: bool,
    }
}

impl<R> RecordStream<R>
where
    R: AsyncRead,
{
    /// Wrap `reader`; `label` names the source in log events.
    pub fn new(label: impl Into<String>, reader: R, options: &AuditOptions) -> Self {
        let max_line_length = options.line_limit();
        Self {
            lines: FramedRead::new(reader, LinesCodec::new_with_max_length(max_line_length)),
            label: label.into(),
            max_line_length,
            line_no: 0,
            stats: ParseStats::default(),
            done: false,
        }
    }

    /// Name given to this source.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> &ParseStats {
        &self.stats
    }
}

impl<R> Stream for RecordStream<R>
where
    R: AsyncRead,
{
    type Item = Result<Record, SourceError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        if *this.done {
            return Poll::Ready(None);
        }
        loop {
            let line = match ready!(this.lines.as_mut().poll_next(cx)) {
                Some(Ok(line)) => line,
                Some(Err(err)) => {
                    *this.done = true;
                    return Poll::Ready(Some(Err(SourceError::from_codec(
                        err,
                        *this.max_line_length,
                    ))));
                }
                None => {
                    *this.done = true;
                    log_debug!(
                        component = "parser",
                        event = "source_exhausted",
                        source = %this.label,
                        lines = this.stats.lines,
                        records = this.stats.records,
                        warnings = this.stats.warnings(),
                    );
                    return Poll::Ready(None);
                }
            };

            *this.line_no += 1;
            this.stats.lines += 1;
            if line.trim().is_empty() {
                this.stats.blank += 1;
                continue;
            }

            match parse_line(&line) {
                Ok(record) => {
                    this.stats.records += 1;
                    return Poll::Ready(Some(Ok(record)));
                }
                Err(kind) => {
                    let warning = ParseWarning {
                        line: *this.line_no,
                        kind,
                    };
                    this.stats.record_warning(&warning);
                    log_warn!(
                        component = "parser",
                        event = "line_dropped",
                        source = %this.label,
                        line = warning.line,
                        reason = kind.code(),
                    );
                }
            }
        }
    }
}

impl<R> fmt::Debug for RecordStream<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordStream")
            .field("label", &self.label)
            .field("line_no", &self.line_no)
            .field("stats", &self.stats)
            .finish()
    }
}
