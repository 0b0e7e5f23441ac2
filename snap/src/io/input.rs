//! Line input from the user.
//!
//! Stdin is read on a background thread and handed over a channel so that
//! consumers can poll with a timeout and notice cancellation.

use std::io::{self, BufRead, BufReader, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, warn};

use crate::cancel::{CancelToken, POLL_INTERVAL};
use crate::error::Cancelled;
use crate::io::output::Output;
use crate::queue::DirectiveQueue;

/// Source of user lines.
pub trait LineReader {
    /// Next line without its newline; `None` at end of input.
    fn next_line(&mut self, cancel: &CancelToken) -> Result<Option<String>>;
}

/// Lines delivered through a channel; stdin in production, any reader in tests.
pub struct StdinLines {
    rx: Receiver<io::Result<String>>,
}

impl StdinLines {
    pub fn spawn<R: BufRead + Send + 'static>(reader: R) -> Self {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for line in reader.lines() {
                let failed = line.is_err();
                if tx.send(line).is_err() || failed {
                    break;
                }
            }
        });
        Self { rx }
    }

    /// Lines from the process's stdin.
    pub fn stdin() -> Self {
        Self::spawn(BufReader::new(io::stdin()))
    }
}

impl LineReader for StdinLines {
    fn next_line(&mut self, cancel: &CancelToken) -> Result<Option<String>> {
        loop {
            if cancel.is_cancelled() {
                return Err(Cancelled.into());
            }
            match self.rx.recv_timeout(POLL_INTERVAL) {
                Ok(line) => return line.map(Some).context("read input line"),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Ok(None),
            }
        }
    }
}

/// Forward non-empty stdin lines to `queue` for the rest of the process.
pub fn spawn_directive_reader(queue: DirectiveQueue, out: Output) {
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!(err = %e, "directive reader stopped");
                    break;
                }
            };
            let directive = line.trim();
            if directive.is_empty() {
                continue;
            }
            queue.enqueue(directive);
            out.line(format!("Queued: {directive} ({} pending)", queue.len()));
        }
        debug!("directive reader reached end of input");
    });
}

/// Ask a yes/no question; anything but `y`/`yes` is no.
pub fn confirm(input: &mut dyn BufRead, out: &mut dyn Write, prompt: &str) -> Result<bool> {
    write!(out, "{prompt} [y/N] ").context("write prompt")?;
    out.flush().context("flush prompt")?;
    let mut answer = String::new();
    input.read_line(&mut answer).context("read answer")?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

/// Offer numbered options and return the chosen index.
///
/// Invalid answers re-prompt; end of input is an error.
pub fn choose(
    input: &mut dyn BufRead,
    out: &mut dyn Write,
    prompt: &str,
    options: &[&str],
) -> Result<usize> {
    loop {
        writeln!(out, "{prompt}").context("write prompt")?;
        for (i, option) in options.iter().enumerate() {
            writeln!(out, "  {}. {option}", i + 1).context("write option")?;
        }
        write!(out, "> ").context("write prompt")?;
        out.flush().context("flush prompt")?;

        let mut answer = String::new();
        if input.read_line(&mut answer).context("read answer")? == 0 {
            return Err(anyhow!("no choice made (end of input)"));
        }
        if let Ok(n) = answer.trim().parse::<usize>()
            && (1..=options.len()).contains(&n)
        {
            return Ok(n - 1);
        }
        writeln!(out, "Please enter a number from 1 to {}.", options.len())
            .context("write hint")?;
    }
}
