//! Where a cell's output goes.

use std::io::{self, Write};

/// Receiver of everything a cell prints. Implementations decide whether
/// output reaches a terminal, a notebook front end or a test buffer.
pub trait OutputSink {
    fn stdout(&mut self, text: &str);
    fn stderr(&mut self, text: &str);
    /// Rich text such as `%help`. Plain sinks may print it verbatim.
    fn markdown(&mut self, text: &str) {
        self.stdout(text);
    }

    /// Whether ANSI styling reaches a terminal.
    fn color(&self) -> bool {
        false
    }
}

/// Writes straight to the process's stdout and stderr.
#[derive(Debug, Default)]
pub struct StdioSink;

fn write_through(mut out: impl Write, text: &str) -> io::Result<()> {
    out.write_all(text.as_bytes())?;
    out.flush()
}

impl OutputSink for StdioSink {
    fn stdout(&mut self, text: &str) {
        if let Err(err) = write_through(io::stdout().lock(), text) {
            tracing::debug!(error = %err, "dropped stdout output");
        }
    }

    fn stderr(&mut self, text: &str) {
        if let Err(err) = write_through(io::stderr().lock(), text) {
            tracing::debug!(error = %err, "dropped stderr output");
        }
    }

    fn color(&self) -> bool {
        crate::colors::enabled()
    }
}

/// Collects output in memory.
#[derive(Debug, Default, Clone)]
pub struct BufferSink {
    pub stdout: String,
    pub stderr: String,
    pub markdown: String,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.stdout.clear();
        self.stderr.clear();
        self.markdown.clear();
    }
}

impl OutputSink for BufferSink {
    fn stdout(&mut self, text: &str) {
        self.stdout.push_str(text);
    }

    fn stderr(&mut self, text: &str) {
        self.stderr.push_str(text);
    }

    fn markdown(&mut self, text: &str) {
        self.markdown.push_str(text);
    }
}

/// Forwards to another sink, rewriting stderr one complete line at a time.
///
/// Used while a program runs so that file references in panics and stack
/// traces point at cells; buffering by line keeps a reference split across
/// two reads intact.
pub struct RewriteStderr<'a, F: Fn(&str) -> String> {
    inner: &'a mut dyn OutputSink,
    rewrite: F,
    pending: String,
}

impl<'a, F: Fn(&str) -> String> RewriteStderr<'a, F> {
    pub fn new(inner: &'a mut dyn OutputSink, rewrite: F) -> Self {
        Self {
            inner,
            rewrite,
            pending: String::new(),
        }
    }

    /// Emit whatever is left without a trailing newline.
    pub fn finish(mut self) {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.inner.stderr(&(self.rewrite)(&rest));
        }
    }
}

impl<F: Fn(&str) -> String> OutputSink for RewriteStderr<'_, F> {
    fn stdout(&mut self, text: &str) {
        self.inner.stdout(text);
    }

    fn stderr(&mut self, text: &str) {
        self.pending.push_str(text);
        if let Some(end) = self.pending.rfind('\n') {
            let complete: String = self.pending.drain(..=end).collect();
            self.inner.stderr(&(self.rewrite)(&complete));
        }
    }

    fn markdown(&mut self, text: &str) {
        self.inner.markdown(text);
    }

    fn color(&self) -> bool {
        self.inner.color()
    }
}
