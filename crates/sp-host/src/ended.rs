// SPDX-License-Identifier: MIT OR Apache-2.0
//! One-shot completion for the end of a child process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::warn;

/// What is known about a child once it has ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessEnded {
    /// Process id of the child.
    pub pid: u32,
    /// Exit code, or `None` when the OS could not report it.
    pub exit_code: Option<u32>,
    /// When the end was observed.
    pub ended_at: DateTime<Utc>,
}

type Listener = Box<dyn FnOnce(&ProcessEnded) + Send + 'static>;

#[derive(Default)]
struct Inner {
    ended: Option<ProcessEnded>,
    listeners: Vec<Listener>,
}

/// Set-once signal that any number of waiters subscribe to.
///
/// Blocking waiters park on a condition variable, async waiters on a
/// `watch` channel; both are released by the single [`complete`](Self::complete).
pub struct EndedSignal {
    inner: Mutex<Inner>,
    cond: Condvar,
    tx: watch::Sender<Option<ProcessEnded>>,
}

impl EndedSignal {
    /// Create an unset signal.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            inner: Mutex::new(Inner::default()),
            cond: Condvar::new(),
            tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the signal and run the registered listeners on this thread.
    ///
    /// Returns `false` (and changes nothing) if the signal was already set.
    pub fn complete(&self, ended: ProcessEnded) -> bool {
        let listeners = {
            let mut inner = self.lock();
            if inner.ended.is_some() {
                return false;
            }
            inner.ended = Some(ended.clone());
            std::mem::take(&mut inner.listeners)
        };
        self.cond.notify_all();
        self.tx.send_replace(Some(ended.clone()));

        for listener in listeners {
            listener(&ended);
        }
        true
    }

    /// `true` once [`complete`](Self::complete) has run.
    pub fn is_set(&self) -> bool {
        self.lock().ended.is_some()
    }

    /// The end record, if the signal is set.
    pub fn get(&self) -> Option<ProcessEnded> {
        self.lock().ended.clone()
    }

    /// Block until the signal is set.
    pub fn wait(&self) -> ProcessEnded {
        let mut inner = self.lock();
        loop {
            if let Some(ended) = &inner.ended {
                return ended.clone();
            }
            inner = self
                .cond
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block until the signal is set or `timeout` elapses. A timeout too
    /// large to express as a deadline waits without one.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<ProcessEnded> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return Some(self.wait());
        };
        let mut inner = self.lock();
        loop {
            if let Some(ended) = &inner.ended {
                return Some(ended.clone());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            inner = self
                .cond
                .wait_timeout(inner, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Wait asynchronously until the signal is set.
    pub async fn wait_async(&self) -> ProcessEnded {
        let mut rx = self.tx.subscribe();
        loop {
            if let Some(ended) = rx.borrow_and_update().clone() {
                return ended;
            }
            if rx.changed().await.is_err() {
                // The sender lives in `self`, so this cannot happen while
                // `self` is borrowed.
                std::future::pending::<()>().await;
            }
        }
    }

    /// Run `listener` when the signal is set.
    ///
    /// If it is already set, `listener` runs immediately on this thread.
    pub fn on_ended<F>(&self, listener: F)
    where
        F: FnOnce(&ProcessEnded) + Send + 'static,
    {
        let ended = {
            let mut inner = self.lock();
            match &inner.ended {
                Some(ended) => ended.clone(),
                None => {
                    inner.listeners.push(Box::new(listener));
                    return;
                }
            }
        };
        warn!(target: "sp.host", pid = ended.pid, "listener registered after process end; invoking now");
        listener(&ended);
    }
}

impl Default for EndedSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EndedSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("EndedSignal")
            .field("ended", &inner.ended)
            .field("listeners", &inner.listeners.len())
            .finish()
    }
}
