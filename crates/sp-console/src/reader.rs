// SPDX-License-Identifier: MIT OR Apache-2.0
//! [`CancellableLineReader`]: one blocking line read that a timeout can
//! abandon.

use crate::source::{AbandonOutcome, AbandonPendingRead, LineSource, SourceRead};
use crate::state::CancelState;
use sp_error::{CancelFailureKind, ProcessError, Result};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Result of a cancellable read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    /// A line, without its trailing `\n` or `\r\n`.
    Line(String),
    /// The timeout fired first and the read was abandoned.
    Cancelled,
    /// End of input.
    Closed,
}

impl LineRead {
    /// The line, if one was read.
    pub fn into_line(self) -> Option<String> {
        match self {
            LineRead::Line(line) => Some(line),
            _ => None,
        }
    }
}

/// Strip one trailing `\n` or `\r\n`.
pub(crate) fn strip_line_ending(mut line: String) -> String {
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    line
}

/// Reads lines from `S`, abandoning a read through `A` when it takes too
/// long.
///
/// Each call runs a watcher thread next to the blocking read. If the
/// deadline passes first the watcher abandons the pending read, retrying
/// until the read has actually returned, because an abandon request can
/// land before the read is registered with the kernel. The call joins the
/// watcher before returning, so no abandon request outlives it.
#[derive(Debug)]
pub struct CancellableLineReader<S, A> {
    source: S,
    canceller: A,
}

impl<S: LineSource, A: AbandonPendingRead> CancellableLineReader<S, A> {
    /// Pair a line source with the canceller for its handle.
    pub fn new(source: S, canceller: A) -> Self {
        Self { source, canceller }
    }

    /// Read one line, giving up after `timeout`. A timeout too large to
    /// express as a deadline never fires.
    pub fn read_line(&mut self, timeout: Duration) -> Result<LineRead> {
        self.read(Instant::now().checked_add(timeout))
    }

    /// Read one line, giving up at `deadline`.
    ///
    /// # Errors
    ///
    /// `CancelFailure` if the read was abandoned by someone else, if an
    /// abandon request failed with an unexpected OS code, or if the watcher
    /// thread panicked. `Io` if the source failed.
    pub fn read_line_until(&mut self, deadline: Instant) -> Result<LineRead> {
        self.read(Some(deadline))
    }

    fn read(&mut self, deadline: Option<Instant>) -> Result<LineRead> {
        let state = CancelState::new();
        let canceller = &self.canceller;
        let source = &mut self.source;

        let (read, cancel_started, watcher) = thread::scope(|scope| {
            let watcher = scope.spawn(|| watch(&state, canceller, deadline));
            let read = source.read_line();
            let cancel_started = state.finish_read();
            (read, cancel_started, watcher.join())
        });

        let watcher = watcher.map_err(|_| ProcessError::CancelFailure {
            kind: CancelFailureKind::WatcherPanicked,
        })?;
        watcher?;

        match read? {
            SourceRead::Line(line) => Ok(LineRead::Line(strip_line_ending(line))),
            SourceRead::Eof => Ok(LineRead::Closed),
            SourceRead::Abandoned if cancel_started => {
                debug!(target: "sp.console", "read abandoned on timeout");
                Ok(LineRead::Cancelled)
            }
            SourceRead::Abandoned => Err(ProcessError::CancelFailure {
                kind: CancelFailureKind::ForeignCancellation,
            }),
        }
    }

    /// Give back the source and canceller.
    pub fn into_inner(self) -> (S, A) {
        (self.source, self.canceller)
    }
}

/// Watcher body. Returns once the read has finished.
fn watch<A: AbandonPendingRead>(
    state: &CancelState,
    canceller: &A,
    deadline: Option<Instant>,
) -> Result<()> {
    let Some(deadline) = deadline else {
        state.wait_done();
        return Ok(());
    };
    if !state.wait_until(deadline) {
        return Ok(());
    }
    let mut attempts: u64 = 0;
    while !state.is_done() {
        attempts += 1;
        match canceller.abandon() {
            outcome @ (AbandonOutcome::Abandoned | AbandonOutcome::NothingPending) => {
                trace!(target: "sp.console", attempts, ?outcome, "abandon attempt");
                thread::yield_now();
            }
            AbandonOutcome::Failed(code) => {
                return Err(ProcessError::CancelFailure {
                    kind: CancelFailureKind::AbandonFailed { code },
                });
            }
        }
    }
    Ok(())
}
