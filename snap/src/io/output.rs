//! Product output stream.
//!
//! Every line the user is meant to read goes through one [`Output`] handle.
//! [`Output::pause`] and [`Output::resume`] are the hook for a front end that
//! owns the terminal, such as a modal line editor embedding the runner: while
//! paused, writes are buffered. The built-in directive reader consumes whole
//! stdin lines and never pauses. [`DirectWriter`] bypasses the buffer for
//! messages that must appear immediately.

use std::io::{self, IsTerminal, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use crossterm::style::Stylize;

struct Inner {
    sink: Box<dyn Write + Send>,
    paused: bool,
    pending: Vec<u8>,
}

/// Cloneable handle over the shared sink.
#[derive(Clone)]
pub struct Output {
    inner: Arc<Mutex<Inner>>,
}

impl Output {
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                sink,
                paused: false,
                pending: Vec::new(),
            })),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves plain bytes behind; keep writing.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Buffer subsequent writes until `resume`.
    pub fn pause(&self) {
        self.lock().paused = true;
    }

    /// Flush anything buffered while paused.
    pub fn resume(&self) -> io::Result<()> {
        let mut inner = self.lock();
        inner.paused = false;
        let pending = std::mem::take(&mut inner.pending);
        inner.sink.write_all(&pending)?;
        inner.sink.flush()
    }

    /// Writer that ignores the pause buffer.
    pub fn direct(&self) -> DirectWriter {
        DirectWriter {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Write one line; output errors are not worth failing a run over.
    pub fn line(&self, text: impl AsRef<str>) {
        let mut handle = self.clone();
        if writeln!(handle, "{}", text.as_ref()).is_err() {
            tracing::debug!("output write failed");
        }
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.lock();
        if inner.paused {
            inner.pending.extend_from_slice(buf);
            return Ok(buf.len());
        }
        inner.sink.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut inner = self.lock();
        if inner.paused {
            return Ok(());
        }
        inner.sink.flush()
    }
}

/// Side channel that writes straight to the sink even while paused.
#[derive(Clone)]
pub struct DirectWriter {
    inner: Arc<Mutex<Inner>>,
}

impl DirectWriter {
    pub fn line(&self, text: &str) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let written = writeln!(inner.sink, "{text}").and_then(|()| inner.sink.flush());
        if written.is_err() {
            tracing::debug!("direct write failed");
        }
    }
}

/// Terminal styling for headers and status marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Style {
    color: bool,
}

impl Style {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    /// Colors unless `NO_COLOR` is set or stdout is not a terminal.
    pub fn detect() -> Self {
        let no_color = std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty());
        Self::new(!no_color && io::stdout().is_terminal())
    }

    pub fn plain() -> Self {
        Self::new(false)
    }

    pub fn header(&self, text: &str) -> String {
        if self.color {
            text.bold().cyan().to_string()
        } else {
            text.to_string()
        }
    }

    pub fn success(&self, text: &str) -> String {
        if self.color {
            text.green().to_string()
        } else {
            text.to_string()
        }
    }

    pub fn failure(&self, text: &str) -> String {
        if self.color {
            text.red().bold().to_string()
        } else {
            text.to_string()
        }
    }

    pub fn dim(&self, text: &str) -> String {
        if self.color {
            text.dark_grey().to_string()
        } else {
            text.to_string()
        }
    }
}
