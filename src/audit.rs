//! Drives parsed sources through the merge, the classifier and the sink.
//!
//! The pump reserves sink capacity before it pulls a joined row, so a row is
//! only ever produced when its diagnostic has somewhere to go. Whatever stops
//! the run first (a source error, an order violation, a sink failure) becomes
//! the run's result; a run never reports success after a fatal error.

use std::{
    error::Error as StdError,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use futures::{ready, Sink, Stream};
use pin_project_lite::pin_project;
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::{
    classify::{ClassifyError, Classifier, Diagnostic, Status, CLASSIFIED_SLOTS},
    observability::{log_error, log_info, log_warn},
    option::AuditOptions,
    stream::{
        merge::{MergeError, MergeStream},
        ParseStats, RecordStream, SourceError,
    },
};

/// Fatal audit failures.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The audit was not given exactly a raw and a reported source.
    #[error("audit needs exactly two sources, got {found}")]
    Arity {
        /// Number of sources supplied.
        found: usize,
    },
    /// Reading or joining the sources failed.
    #[error("merge failed: {0}")]
    Merge(#[from] MergeError<SourceError>),
    /// A joined row could not be classified.
    #[error("classification failed: {0}")]
    Classify(#[from] ClassifyError),
    /// Writing diagnostics failed.
    #[error("diagnostic sink failed: {0}")]
    Sink(#[source] Box<dyn StdError + Send + Sync>),
}

/// How a completed run went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every input line was well formed.
    Clean,
    /// Some input lines were dropped.
    Warnings,
}

/// Per-source accounting in a summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSummary {
    /// Source label.
    pub label: String,
    /// Line counters.
    pub stats: ParseStats,
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditSummary {
    /// Joined rows produced by the merge.
    pub rows: u64,
    /// Diagnostics handed to the sink.
    pub emitted: u64,
    /// Rows whose diagnostic was suppressed.
    pub suppressed: u64,
    /// Sources, in slot order.
    pub sources: Vec<SourceSummary>,
    statuses: [u64; Status::ALL.len()],
}

impl AuditSummary {
    /// Dropped input lines across all sources.
    pub fn warnings(&self) -> u64 {
        self.sources.iter().map(|source| source.stats.warnings()).sum()
    }

    /// Line counters of all sources added together.
    pub fn parse_stats(&self) -> ParseStats {
        let mut total = ParseStats::default();
        for source in &self.sources {
            total.merge(&source.stats);
        }
        total
    }

    /// Rows classified with `status`, suppressed ones included.
    pub fn status_count(&self, status: Status) -> u64 {
        self.statuses[status.index()]
    }

    /// Rows classified with an error status.
    pub fn errors(&self) -> u64 {
        Status::ALL
            .iter()
            .filter(|status| status.is_error())
            .map(|status| self.status_count(*status))
            .sum()
    }

    /// Whether the run completed cleanly or with dropped lines.
    pub fn outcome(&self) -> Outcome {
        if self.warnings() == 0 {
            Outcome::Clean
        } else {
            Outcome::Warnings
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PumpPhase {
    Pulling,
    Closing,
}

pin_project! {
    /// Future running one audit to completion.
    #[must_use = "futures do nothing unless polled"]
    pub struct Audit<R, Si> {
        merge: MergeStream<RecordStream<R>>,
        #[pin]
        sink: Si,
        classifier: Classifier,
        phase: PumpPhase,
        rows: u64,
        emitted: u64,
        suppressed: u64,
        statuses: [u64; Status::ALL.len()],
    }
}

impl<R, Si> Audit<R, Si>
where
    R: AsyncRead + Unpin,
    Si: Sink<Diagnostic>,
    Si::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    /// Prepare a run over `[raw, reported]`. Fails before reading anything if
    /// the source count is wrong.
    pub fn new(
        sources: Vec<RecordStream<R>>,
        sink: Si,
        options: &AuditOptions,
    ) -> Result<Self, AuditError> {
        if sources.len() != CLASSIFIED_SLOTS {
            return Err(AuditError::Arity {
                found: sources.len(),
            });
        }
        Ok(Self {
            merge: MergeStream::new(sources),
            sink,
            classifier: Classifier::new(options.is_verbose()),
            phase: PumpPhase::Pulling,
            rows: 0,
            emitted: 0,
            suppressed: 0,
            statuses: [0; Status::ALL.len()],
        })
    }

    /// Joined rows pulled so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Diagnostics handed to the sink so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}

fn sink_error<E>(err: E) -> AuditError
where
    E: Into<Box<dyn StdError + Send + Sync>>,
{
    AuditError::Sink(err.into())
}

impl<R, Si> Future for Audit<R, Si>
where
    R: AsyncRead + Unpin,
    Si: Sink<Diagnostic>,
    Si::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    type Output = Result<AuditSummary, AuditError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();
        loop {
            match *this.phase {
                PumpPhase::Pulling => {
                    ready!(this.sink.as_mut().poll_ready(cx)).map_err(sink_error)?;

                    let row = match Pin::new(&mut *this.merge).poll_next(cx) {
                        Poll::Ready(Some(Ok(row))) => row,
                        Poll::Ready(Some(Err(err))) => {
                            if let MergeError::Source { index, .. }
                            | MergeError::OrderViolation { index, .. } = &err
                            {
                                log_error!(
                                    component = "audit",
                                    event = "source_rejected",
                                    source = this.merge.sources()[*index].label(),
                                    error = %err,
                                );
                            }
                            return Poll::Ready(Err(err.into()));
                        }
                        Poll::Ready(None) => {
                            *this.phase = PumpPhase::Closing;
                            continue;
                        }
                        Poll::Pending => {
                            // Sources are stalled; push out what is already buffered.
                            if let Poll::Ready(Err(err)) = this.sink.as_mut().poll_flush(cx) {
                                return Poll::Ready(Err(sink_error(err)));
                            }
                            return Poll::Pending;
                        }
                    };

                    *this.rows += 1;
                    let raw = row.slots.first().and_then(Option::as_ref).map(|r| r.count);
                    let reported = row.slots.get(1).and_then(Option::as_ref).map(|r| r.count);
                    if let Some(status) = Classifier::status(raw, reported) {
                        this.statuses[status.index()] += 1;
                    }
                    match this.classifier.classify(row)? {
                        Some(diagnostic) => {
                            this.sink
                                .as_mut()
                                .start_send(diagnostic)
                                .map_err(sink_error)?;
                            *this.emitted += 1;
                        }
                        None => *this.suppressed += 1,
                    }
                }
                PumpPhase::Closing => {
                    ready!(this.sink.as_mut().poll_close(cx)).map_err(sink_error)?;

                    let summary = AuditSummary {
                        rows: *this.rows,
                        emitted: *this.emitted,
                        suppressed: *this.suppressed,
                        sources: this
                            .merge
                            .sources()
                            .iter()
                            .map(|source| SourceSummary {
                                label: source.label().to_owned(),
                                stats: *source.stats(),
                            })
                            .collect(),
                        statuses: *this.statuses,
                    };
                    if summary.warnings() > 0 {
                        log_warn!(
                            component = "audit",
                            event = "lines_dropped",
                            warnings = summary.warnings(),
                        );
                    }
                    log_info!(
                        component = "audit",
                        event = "audit_completed",
                        rows = summary.rows,
                        emitted = summary.emitted,
                        suppressed = summary.suppressed,
                        errors = summary.errors(),
                        warnings = summary.warnings(),
                    );
                    return Poll::Ready(Ok(summary));
                }
            }
        }
    }
}

/// Run a full audit of `[raw, reported]` into `sink`.
pub async fn audit<R, Si>(
    sources: Vec<RecordStream<R>>,
    sink: Si,
    options: &AuditOptions,
) -> Result<AuditSummary, AuditError>
where
    R: AsyncRead + Unpin,
    Si: Sink<Diagnostic>,
    Si::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    Audit::new(sources, sink, options)?.await
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, convert::Infallible};

    use futures::FutureExt;

    use super::*;
    use crate::sink::DiagnosticSink;

    fn sources(raw: &'static str, reported: &'static str) -> Vec<RecordStream<&'static [u8]>> {
        let options = AuditOptions::default();
        vec![
            RecordStream::new("raw", raw.as_bytes(), &options),
            RecordStream::new("reported", reported.as_bytes(), &options),
        ]
    }

    /// Sink that accepts an item only while it has permits.
    #[derive(Default)]
    struct GatedSink {
        permits: usize,
        accepted: VecDeque<Diagnostic>,
        closed: bool,
    }

    impl Sink<Diagnostic> for GatedSink {
        type Error = Infallible;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            if self.permits > 0 {
                Poll::Ready(Ok(()))
            } else {
                Poll::Pending
            }
        }

        fn start_send(mut self: Pin<&mut Self>, item: Diagnostic) -> Result<(), Infallible> {
            assert!(self.permits > 0, "item sent without capacity");
            self.permits -= 1;
            self.accepted.push_back(item);
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<Result<(), Infallible>> {
            self.closed = true;
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn end_to_end_scenario() {
        let mut output = Vec::new();
        let summary = audit(
            sources("3 \"a\"\n5 \"b\"\n2 \"c\"\n", "3 \"a\"\n0 \"b\"\n7 \"d\"\n"),
            DiagnosticSink::new(&mut output, &AuditOptions::default()),
            &AuditOptions::default(),
        )
        .await
        .expect("audit");

        let output = String::from_utf8(output).expect("utf8");
        assert_eq!(
            output,
            concat!(
                r#"{"dirname":"b","ndirents":5,"nreported":0,"status":"error: count mismatch (no optimized count)"}"#,
                "\n",
                r#"{"dirname":"c","ndirents":2,"nreported":0,"status":"error: count mismatch (no optimized count)"}"#,
                "\n",
                r#"{"dirname":"d","ndirents":0,"nreported":7,"status":"error: count mismatch (no entries)"}"#,
                "\n",
            )
        );
        assert_eq!(summary.rows, 4);
        assert_eq!(summary.emitted, 3);
        assert_eq!(summary.suppressed, 1);
        assert_eq!(summary.errors(), 3);
        assert_eq!(summary.status_count(Status::CountOkay), 1);
        assert_eq!(summary.outcome(), Outcome::Clean);
    }

    #[tokio::test]
    async fn verbose_mode_emits_agreeing_rows() {
        let options = AuditOptions::default().verbose(true);
        let mut output = Vec::new();
        let summary = audit(
            sources("3 \"a\"\n", "3 \"a\"\n"),
            DiagnosticSink::new(&mut output, &options),
            &options,
        )
        .await
        .expect("audit");
        assert_eq!(summary.emitted, 1);
        assert_eq!(
            String::from_utf8(output).expect("utf8"),
            "{\"dirname\":\"a\",\"ndirents\":3,\"nreported\":3,\"status\":\"count okay\"}\n"
        );
    }

    #[tokio::test]
    async fn dropped_lines_make_a_warning_outcome() {
        let summary = audit(
            sources("3 \"a\"\n5 bogus\n", "3 \"a\"\n"),
            DiagnosticSink::new(Vec::new(), &AuditOptions::default()),
            &AuditOptions::default(),
        )
        .await
        .expect("audit");
        assert_eq!(summary.warnings(), 1);
        assert_eq!(summary.sources[0].stats.warnings(), 1);
        assert_eq!(summary.sources[1].stats.warnings(), 0);
        assert_eq!(summary.parse_stats().records, 2);
        assert_eq!(summary.outcome(), Outcome::Warnings);
    }

    #[tokio::test]
    async fn disorder_is_fatal_and_stops_output() {
        let mut output = Vec::new();
        let result = audit(
            sources("1 \"a\"\n1 \"c\"\n1 \"b\"\n1 \"d\"\n", "2 \"a\"\n"),
            DiagnosticSink::new(&mut output, &AuditOptions::default()),
            &AuditOptions::default(),
        )
        .await;
        assert!(matches!(
            result,
            Err(AuditError::Merge(MergeError::OrderViolation { index: 0, .. }))
        ));
        let output = String::from_utf8(output).expect("utf8");
        assert!(!output.contains("\"b\""));
        assert!(!output.contains("\"d\""));
    }

    #[test]
    fn wrong_source_count_is_rejected_up_front() {
        let options = AuditOptions::default();
        let three = vec![
            RecordStream::new("a", &b""[..], &options),
            RecordStream::new("b", &b""[..], &options),
            RecordStream::new("c", &b""[..], &options),
        ];
        assert!(matches!(
            Audit::new(three, GatedSink::default(), &options),
            Err(AuditError::Arity { found: 3 })
        ));
    }

    #[test]
    fn never_pulls_a_row_without_sink_capacity() {
        let options = AuditOptions::default();
        let mut run = Box::pin(
            Audit::new(
                sources("1 \"a\"\n2 \"b\"\n3 \"c\"\n", ""),
                GatedSink::default(),
                &options,
            )
            .expect("audit"),
        );

        assert!(run.as_mut().now_or_never().is_none());
        assert_eq!(run.rows(), 0, "no capacity, no rows");

        for expected in 1..=3 {
            run.as_mut().project().sink.get_mut().permits = 1;
            assert!(run.as_mut().now_or_never().is_none());
            assert_eq!(run.rows(), expected);
            assert_eq!(run.emitted(), expected);
        }

        run.as_mut().project().sink.get_mut().permits = 1;
        let summary = run
            .as_mut()
            .now_or_never()
            .expect("finished")
            .expect("audit ok");
        assert_eq!(summary.emitted, 3);
        assert!(run.as_mut().project().sink.get_mut().closed);
    }
}
