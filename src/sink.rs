//! JSON-lines output for diagnostics.

use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use bytes::{BufMut, BytesMut};
use futures::Sink;
use pin_project_lite::pin_project;
use tokio::io::AsyncWrite;
use tokio_util::codec::{Encoder, FramedWrite};

use crate::{classify::Diagnostic, option::AuditOptions};

/// Encodes one diagnostic as a single JSON object followed by `\n`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiagnosticCodec;

impl Encoder<Diagnostic> for DiagnosticCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Diagnostic, dst: &mut BytesMut) -> Result<(), Self::Error> {
        serde_json::to_writer((&mut *dst).writer(), &item)?;
        dst.put_u8(b'\n');
        Ok(())
    }
}

pin_project! {
    /// [`Sink`] of diagnostics onto an async writer.
    ///
    /// `poll_ready` only reports capacity while fewer than the configured
    /// write-buffer bytes are pending; beyond that it flushes first. Callers that
    /// wait on `poll_ready` before producing a diagnostic therefore never run
    /// ahead of the writer.
    #[derive(Debug)]
    pub struct DiagnosticSink<W> {
        #[pin]
        inner: FramedWrite<W, DiagnosticCodec>,
        written: u64,
    }
}

impl<W> DiagnosticSink<W>
where
    W: AsyncWrite,
{
    /// Wrap `writer`, using the options' write buffer as backpressure boundary.
    pub fn new(writer: W, options: &AuditOptions) -> Self {
        let mut inner = FramedWrite::new(writer, DiagnosticCodec);
        inner.set_backpressure_boundary(options.write_buffer_limit());
        Self { inner, written: 0 }
    }

    /// Diagnostics accepted so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Bytes encoded but not yet handed to the writer.
    pub fn pending_bytes(&self) -> usize {
        self.inner.write_buffer().len()
    }

    /// Recover the writer. Unflushed diagnostics are lost.
    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}

impl<W> Sink<Diagnostic> for DiagnosticSink<W>
where
    W: AsyncWrite,
{
    type Error = io::Error;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_ready(cx)
    }

    fn start_send(self: Pin<&mut Self>, item: Diagnostic) -> Result<(), Self::Error> {
        let this = self.project();
        this.inner.start_send(item)?;
        *this.written += 1;
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.project().inner.poll_close(cx)
    }
}
