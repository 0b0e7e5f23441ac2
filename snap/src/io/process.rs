//! Helpers for running child processes with streamed stdout and bounded stderr.

use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::cancel::{CancelToken, POLL_INTERVAL};
use crate::error::Cancelled;

/// Exit status plus whatever stderr was kept.
#[derive(Debug)]
pub struct StreamOutcome {
    pub status: ExitStatus,
    pub stderr: Vec<u8>,
    pub stderr_truncated: usize,
}

impl StreamOutcome {
    /// Last `max_lines` lines of captured stderr.
    pub fn stderr_tail(&self, max_lines: usize) -> String {
        let text = String::from_utf8_lossy(&self.stderr);
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = lines.len().saturating_sub(max_lines);
        lines[start..].join("\n")
    }
}

/// Run `cmd`, copying each stdout line into `out` as it arrives.
///
/// Stderr is drained on its own thread and keeps at most `stderr_limit` bytes.
/// The cancel token is polled while waiting; on cancellation the child is
/// killed and `Cancelled` is returned.
#[instrument(skip_all, fields(stderr_limit))]
pub fn run_streaming(
    mut cmd: Command,
    cancel: &CancelToken,
    out: &mut dyn Write,
    stderr_limit: usize,
) -> Result<StreamOutcome> {
    cancel.check()?;
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let (tx, rx) = mpsc::channel::<Vec<u8>>();
    thread::spawn(move || forward_lines(stdout, &tx));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, stderr_limit));

    loop {
        if cancel.is_cancelled() {
            return Err(kill_cancelled(&mut child));
        }
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(line) => {
                if let Err(e) = out.write_all(&line).and_then(|()| out.flush()) {
                    warn!(err = %e, "output closed, killing child process");
                    kill_and_reap(&mut child);
                    return Err(e).context("write child output");
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let status = loop {
        if cancel.is_cancelled() {
            return Err(kill_cancelled(&mut child));
        }
        if let Some(status) = child
            .wait_timeout(POLL_INTERVAL)
            .context("wait for command")?
        {
            break status;
        }
    };

    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;
    if stderr_truncated > 0 {
        warn!(stderr_truncated, "stderr truncated");
    }

    debug!(exit_code = ?status.code(), "command finished");
    Ok(StreamOutcome {
        status,
        stderr,
        stderr_truncated,
    })
}

/// Render an exit status the way error messages show it.
pub fn describe_status(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("status {code}");
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("signal {signal}");
        }
    }
    "unknown status".to_string()
}

fn kill_cancelled(child: &mut Child) -> anyhow::Error {
    warn!("cancelled, killing child process");
    kill_and_reap(child);
    Cancelled.into()
}

fn kill_and_reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!(err = %e, "kill child failed");
    }
    if let Err(e) = child.wait() {
        debug!(err = %e, "wait after kill failed");
    }
}

fn forward_lines<R: Read>(reader: R, tx: &mpsc::Sender<Vec<u8>>) {
    let mut reader = BufReader::new(reader);
    loop {
        let mut line = Vec::new();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {
                if tx.send(line).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(err = %e, "read child stdout failed");
                break;
            }
        }
    }
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

/// Keep the last `limit` bytes of a stream; count what was dropped.
fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() > limit {
            let excess = buf.len() - limit;
            buf.drain(..excess);
            truncated += excess;
        }
    }

    Ok((buf, truncated))
}
