//! User directives queued while a run is in progress.
//!
//! Producers (the stdin reader thread) enqueue lines at any time; the runner
//! is the only consumer and drains the queue between steps.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::core::types::{ModelHint, agent_args};
use crate::io::executor::Executor;
use crate::io::output::{Output, Style};
use crate::io::prompt::with_suffixes;

/// Thread-safe FIFO of directive lines.
#[derive(Debug, Clone, Default)]
pub struct DirectiveQueue {
    inner: Arc<Mutex<VecDeque<String>>>,
}

impl DirectiveQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn enqueue(&self, directive: impl Into<String>) {
        self.lock().push_back(directive.into());
    }

    /// Take everything queued so far, oldest first.
    pub fn drain_all(&self) -> Vec<String> {
        self.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Outcome of one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub ran: usize,
    pub failed: usize,
    /// Not run because the run was cancelled.
    pub skipped: usize,
}

/// Run every queued directive as a continued, fast-model agent call.
///
/// A failing directive is reported and the drain goes on. Once the token is
/// cancelled the remaining directives are listed as skipped; the caller turns
/// that into a cancellation.
pub fn drain_directives(
    queue: &DirectiveQueue,
    executor: &dyn Executor,
    cancel: &CancelToken,
    out: &Output,
    style: Style,
) -> DrainReport {
    let directives = queue.drain_all();
    let total = directives.len();
    let mut report = DrainReport::default();

    for (i, directive) in directives.iter().enumerate() {
        if cancel.is_cancelled() {
            for skipped in &directives[i..] {
                out.line(style.dim(&format!("Skipped queued prompt: {skipped}")));
            }
            report.skipped = total - i;
            warn!(skipped = report.skipped, "directive drain cancelled");
            return report;
        }

        out.line(style.header(&format!("Queued prompt {}/{total}: {directive}", i + 1)));
        let prompt = with_suffixes(directive, true);
        let mut sink = out.clone();
        match executor.run(cancel, &mut sink, ModelHint::Fast, &agent_args(prompt, true)) {
            Ok(()) => report.ran += 1,
            Err(err) => {
                report.failed += 1;
                out.line(style.failure(&format!("Queued prompt failed: {err:#}")));
            }
        }
    }

    if total > 0 {
        info!(ran = report.ran, failed = report.failed, "directives drained");
    }
    report
}
