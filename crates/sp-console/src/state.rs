// SPDX-License-Identifier: MIT OR Apache-2.0
//! The one piece of state the reader and its cancellation watcher share.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Phase of one cancellable read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelPhase {
    /// The read is in flight and nobody has asked to abandon it.
    Reading,
    /// The watcher fired first and is abandoning the read.
    CancelRequested,
    /// The read has returned. Terminal.
    Done,
}

/// Mutex-guarded [`CancelPhase`] with a wake-up for the watcher.
///
/// Exactly one of [`request_cancel`](Self::request_cancel) and
/// [`finish_read`](Self::finish_read) observes the `Reading` phase; that
/// single order decides whether a cancellation is in progress.
#[derive(Debug)]
pub struct CancelState {
    phase: Mutex<CancelPhase>,
    cond: Condvar,
}

impl CancelState {
    /// A state in [`CancelPhase::Reading`].
    pub fn new() -> Self {
        Self {
            phase: Mutex::new(CancelPhase::Reading),
            cond: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CancelPhase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current phase.
    pub fn phase(&self) -> CancelPhase {
        *self.lock()
    }

    /// Reading → CancelRequested. Returns `false` if the read had already
    /// finished, in which case nothing must be abandoned.
    pub fn request_cancel(&self) -> bool {
        let mut phase = self.lock();
        match *phase {
            CancelPhase::Reading => {
                *phase = CancelPhase::CancelRequested;
                true
            }
            CancelPhase::CancelRequested => true,
            CancelPhase::Done => false,
        }
    }

    /// Mark the read as returned and wake the watcher. Returns whether a
    /// cancellation had started before the read finished.
    pub fn finish_read(&self) -> bool {
        let mut phase = self.lock();
        let started = *phase == CancelPhase::CancelRequested;
        *phase = CancelPhase::Done;
        drop(phase);
        self.cond.notify_all();
        started
    }

    /// `true` once [`finish_read`](Self::finish_read) has run.
    pub fn is_done(&self) -> bool {
        self.phase() == CancelPhase::Done
    }

    /// Park until the read finishes, with no deadline.
    pub fn wait_done(&self) {
        let mut phase = self.lock();
        while *phase != CancelPhase::Done {
            phase = self
                .cond
                .wait(phase)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Park until the read finishes or `deadline` passes.
    ///
    /// Returns `true` if the deadline won; the phase has then atomically
    /// moved to `CancelRequested`. Returns `false` if the read finished
    /// first.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let mut phase = self.lock();
        loop {
            if *phase == CancelPhase::Done {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                *phase = CancelPhase::CancelRequested;
                return true;
            }
            phase = self
                .cond
                .wait_timeout(phase, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

impl Default for CancelState {
    fn default() -> Self {
        Self::new()
    }
}
