//! N-way sorted full outer join over record streams.
//!
//! Every source must yield strictly increasing keys. The merge keeps at most one
//! pulled-but-unjoined record per source and only pulls when its consumer polls,
//! so a slow or stalled consumer stalls every source behind it.

use std::{
    error::Error as StdError,
    pin::Pin,
    task::{Context, Poll},
};

use futures::{stream::FusedStream, Stream};
use pin_project_lite::pin_project;
use thiserror::Error;

use crate::{
    observability::{log_debug, log_error},
    record::{KeyToken, Record},
};

/// One output row of the join: a key and, per source, the record carrying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedRow {
    /// Key shared by every populated slot.
    pub key: KeyToken,
    /// One slot per source, in source order; `None` when that source lacks the key.
    pub slots: Vec<Option<Record>>,
}

impl JoinedRow {
    /// Number of populated slots.
    pub fn populated(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }
}

/// Fatal merge failures. Each one terminates the stream.
#[derive(Debug, Error)]
pub enum MergeError<E>
where
    E: StdError + 'static,
{
    /// A source reported an error of its own.
    #[error("source {index} failed: {error}")]
    Source {
        /// Index of the failing source.
        index: usize,
        /// Underlying failure.
        #[source]
        error: E,
    },
    /// A source yielded a key not greater than one already joined from it.
    #[error("source {index} is out of order: {key} follows {previous}")]
    OrderViolation {
        /// Index of the offending source.
        index: usize,
        /// Key that broke the order.
        key: KeyToken,
        /// Last key joined from the same source.
        previous: KeyToken,
    },
    /// The merge was about to finish while a source still held data.
    #[error("source {index} still holds data at end of merge")]
    Unconsumed {
        /// Index of the source with leftover data.
        index: usize,
    },
}

#[derive(Debug, Default)]
struct SourceState {
    next: Option<Record>,
    last_key: Option<KeyToken>,
    ended: bool,
}

impl SourceState {
    fn needs_pull(&self) -> bool {
        self.next.is_none() && !self.ended
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MergePhase {
    Running,
    Finished,
    Failed,
}

pin_project! {
    /// Stream that joins multiple key-ordered record sources into [`JoinedRow`]s.
    pub struct MergeStream<S> {
        sources: Vec<S>,
        states: Vec<SourceState>,
        phase: MergePhase,
        rows: u64,
    }
}

impl<S> MergeStream<S> {
    /// Join `sources`; slot `i` of every row belongs to `sources[i]`.
    pub fn new(sources: Vec<S>) -> Self {
        let states = sources.iter().map(|_| SourceState::default()).collect();
        Self {
            sources,
            states,
            phase: MergePhase::Running,
            rows: 0,
        }
    }

    /// The joined sources, in slot order.
    pub fn sources(&self) -> &[S] {
        &self.sources
    }

    /// Rows emitted so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Records pulled from sources but not yet joined into a row.
    pub fn pending_records(&self) -> usize {
        self.states
            .iter()
            .filter(|state| state.next.is_some())
            .count()
    }
}

impl<S, E> MergeStream<S>
where
    S: Stream<Item = Result<Record, E>> + Unpin,
    E: StdError + 'static,
{
    /// Pull into every empty, live slot. Returns `Ok(true)` if some source had
    /// nothing ready yet.
    fn fill(
        sources: &mut [S],
        states: &mut [SourceState],
        cx: &mut Context<'_>,
    ) -> Result<bool, MergeError<E>> {
        let mut blocked = false;
        for (index, (source, state)) in sources.iter_mut().zip(states.iter_mut()).enumerate() {
            if !state.needs_pull() {
                continue;
            }
            match Pin::new(source).poll_next(cx) {
                Poll::Pending => blocked = true,
                Poll::Ready(None) => state.ended = true,
                Poll::Ready(Some(Err(error))) => return Err(MergeError::Source { index, error }),
                Poll::Ready(Some(Ok(record))) => {
                    if let Some(previous) = &state.last_key {
                        if record.key <= *previous {
                            return Err(MergeError::OrderViolation {
                                index,
                                key: record.key,
                                previous: previous.clone(),
                            });
                        }
                    }
                    state.next = Some(record);
                }
            }
        }
        Ok(blocked)
    }

    fn finish(states: &[SourceState]) -> Result<(), MergeError<E>> {
        match states
            .iter()
            .position(|state| !state.ended || state.next.is_some())
        {
            Some(index) => Err(MergeError::Unconsumed { index }),
            None => Ok(()),
        }
    }
}

impl<S, E> Stream for MergeStream<S>
where
    S: Stream<Item = Result<Record, E>> + Unpin,
    E: StdError + 'static,
{
    type Item = Result<JoinedRow, MergeError<E>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if *this.phase != MergePhase::Running {
            return Poll::Ready(None);
        }

        match Self::fill(this.sources, this.states, cx) {
            Ok(true) => return Poll::Pending,
            Ok(false) => {}
            Err(err) => {
                *this.phase = MergePhase::Failed;
                log_error!(
                    component = "merge",
                    event = "merge_failed",
                    rows = *this.rows,
                    error = %err,
                );
                return Poll::Ready(Some(Err(err)));
            }
        }

        let min_key = this
            .states
            .iter()
            .filter_map(|state| state.next.as_ref().map(|record| &record.key))
            .min()
            .cloned();

        let Some(key) = min_key else {
            if let Err(err) = Self::finish(this.states) {
                *this.phase = MergePhase::Failed;
                return Poll::Ready(Some(Err(err)));
            }
            *this.phase = MergePhase::Finished;
            log_debug!(
                component = "merge",
                event = "merge_finished",
                sources = this.states.len(),
                rows = *this.rows,
            );
            return Poll::Ready(None);
        };

        let slots = this
            .states
            .iter_mut()
            .map(|state| {
                if state.next.as_ref().is_some_and(|record| record.key == key) {
                    state.last_key = Some(key.clone());
                    state.next.take()
                } else {
                    None
                }
            })
            .collect();
        *this.rows += 1;

        Poll::Ready(Some(Ok(JoinedRow { key, slots })))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.phase {
            MergePhase::Running => (0, None),
            MergePhase::Finished | MergePhase::Failed => (0, Some(0)),
        }
    }
}

impl<S, E> FusedStream for MergeStream<S>
where
    S: Stream<Item = Result<Record, E>> + Unpin,
    E: StdError + 'static,
{
    fn is_terminated(&self) -> bool {
        self.phase != MergePhase::Running
    }
}
