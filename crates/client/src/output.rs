//! Shared stdout/stderr sinks.
//!
//! Frames from many sessions arrive concurrently; each write happens under
//! one lock so a frame is never interleaved with another.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

/// Where a client run prints streamed content and server messages.
#[derive(Clone)]
pub struct Printer {
    out: Sink,
    err: Sink,
}

impl std::fmt::Debug for Printer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Printer").finish_non_exhaustive()
    }
}

impl Default for Printer {
    fn default() -> Self {
        Self::stdio()
    }
}

impl Printer {
    /// Prints to the process's stdout and stderr.
    pub fn stdio() -> Self {
        Self::new(Box::new(io::stdout()), Box::new(io::stderr()))
    }

    /// Prints into arbitrary writers.
    pub fn new(out: Box<dyn Write + Send>, err: Box<dyn Write + Send>) -> Self {
        Self {
            out: Arc::new(Mutex::new(out)),
            err: Arc::new(Mutex::new(err)),
        }
    }

    /// Writes `bytes` to the content stream.
    pub fn content(&self, bytes: &[u8]) -> io::Result<()> {
        write_locked(&self.out, bytes)
    }

    /// Writes one message line to the diagnostics stream.
    pub fn message(&self, line: &str) -> io::Result<()> {
        let mut text = line.to_owned();
        if !text.ends_with('\n') {
            text.push('\n');
        }
        write_locked(&self.err, text.as_bytes())
    }
}

fn write_locked(sink: &Sink, bytes: &[u8]) -> io::Result<()> {
    let mut guard = sink
        .lock()
        .map_err(|_| io::Error::other("output lock poisoned"))?;
    guard.write_all(bytes)?;
    guard.flush()
}

/// A cloneable in-memory writer, handy as a [`Printer`] target in tests.
#[derive(Clone, Debug, Default)]
pub struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    /// Everything written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().map(|buf| buf.clone()).unwrap_or_default()
    }

    /// [`Capture::contents`] as text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .map_err(|_| io::Error::other("capture lock poisoned"))?
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_end_with_newlines_and_content_is_verbatim() {
        let out = Capture::default();
        let err = Capture::default();
        let printer = Printer::new(Box::new(out.clone()), Box::new(err.clone()));
        printer.content(b"a\nb").unwrap();
        printer.message("hello").unwrap();
        assert_eq!(out.contents(), b"a\nb");
        assert_eq!(err.text(), "hello\n");
    }
}
