//! Runtime knobs for an audit run.

/// Default upper bound on a single input line, in bytes.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// Default number of buffered output bytes before the sink applies backpressure.
pub const DEFAULT_WRITE_BUFFER: usize = 8 * 1024;

/// Options shared by the parser, classifier and sink stages.
///
/// Built by value, mirroring how callers chain adjustments:
///
/// ```
/// use dirent_audit::AuditOptions;
///
/// let options = AuditOptions::default().verbose(true).write_buffer(512);
/// assert!(options.is_verbose());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditOptions {
    pub(crate) verbose: bool,
    pub(crate) max_line_length: usize,
    pub(crate) write_buffer: usize,
}

impl Default for AuditOptions {
    fn default() -> Self {
        AuditOptions {
            verbose: false,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            write_buffer: DEFAULT_WRITE_BUFFER,
        }
    }
}

impl AuditOptions {
    /// Emit `count okay` diagnostics instead of suppressing them.
    pub fn verbose(self, verbose: bool) -> Self {
        AuditOptions { verbose, ..self }
    }

    /// Longest accepted input line; longer lines abort the run.
    pub fn max_line_length(self, max_line_length: usize) -> Self {
        AuditOptions {
            max_line_length: max_line_length.max(1),
            ..self
        }
    }

    /// Buffered output bytes at which the sink stops accepting diagnostics
    /// until it has flushed.
    pub fn write_buffer(self, write_buffer: usize) -> Self {
        AuditOptions {
            write_buffer: write_buffer.max(1),
            ..self
        }
    }

    /// Whether `count okay` diagnostics are emitted.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Configured maximum input line length.
    pub fn line_limit(&self) -> usize {
        self.max_line_length
    }

    /// Configured output backpressure boundary.
    pub fn write_buffer_limit(&self) -> usize {
        self.write_buffer
    }
}
