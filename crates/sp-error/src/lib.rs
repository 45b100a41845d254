// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error taxonomy with stable error codes for scriptable child processes.
//!
//! Every failure surfaced by the `sp-*` crates is a [`ProcessError`]. Each
//! variant maps onto a stable [`ErrorCode`] and a broad [`ErrorCategory`],
//! so callers can branch on a machine-readable tag instead of matching
//! message text.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Caller misuse: mismatched arrays, double start, bad command line.
    Config,
    /// An OS allocation or creation call failed.
    Os,
    /// The cancellable read observed a protocol violation.
    Cancel,
    /// Reading or writing a parent-side pipe end failed.
    Io,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Config => "config",
            Self::Os => "os",
            Self::Cancel => "cancel",
            Self::Io => "io",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Serialises to `SCREAMING_SNAKE_CASE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Configuration rejected before any OS state was touched.
    InvalidConfiguration,
    /// An OS call for allocation, registration or creation failed.
    OsResource,
    /// A read was abandoned by someone other than the cancellable reader.
    CancelForeign,
    /// The abandon request failed with an unexpected OS error.
    CancelAbandonFailed,
    /// Parent-side stream I/O failed.
    StreamIo,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidConfiguration => ErrorCategory::Config,
            Self::OsResource => ErrorCategory::Os,
            Self::CancelForeign | Self::CancelAbandonFailed => ErrorCategory::Cancel,
            Self::StreamIo => ErrorCategory::Io,
        }
    }

    /// Stable `&'static str` representation (e.g. `"OS_RESOURCE"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidConfiguration => "INVALID_CONFIGURATION",
            Self::OsResource => "OS_RESOURCE",
            Self::CancelForeign => "CANCEL_FOREIGN",
            Self::CancelAbandonFailed => "CANCEL_ABANDON_FAILED",
            Self::StreamIo => "STREAM_IO",
        }
    }

    /// Whether an operation failing with this code may be retried as-is.
    ///
    /// Always `false`: process creation and attribute setup are single
    /// attempts, and cancel failures indicate a defect.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ProcessError
// ---------------------------------------------------------------------------

/// What went wrong inside a cancellable read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CancelFailureKind {
    /// The read reported "abandoned" although this reader never started a
    /// cancellation.
    ForeignCancellation,
    /// The abandon request failed with something other than "no pending
    /// operation".
    AbandonFailed {
        /// Raw OS error code.
        code: u32,
    },
    /// The cancellation watcher thread panicked.
    WatcherPanicked,
}

/// Errors from launching, supervising and reading scriptable processes.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The caller asked for something inconsistent. Never retried.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Human-readable description.
        reason: String,
    },

    /// An OS call failed.
    #[error("{operation} failed with OS error {code} (0x{code:x})")]
    OsResource {
        /// Name of the failing OS call.
        operation: &'static str,
        /// Raw OS error code.
        code: u32,
    },

    /// The cancellable read protocol was violated.
    #[error("cancellable read failed: {kind:?}")]
    CancelFailure {
        /// Which violation occurred.
        kind: CancelFailureKind,
    },

    /// I/O on a parent-side pipe end failed.
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcessError {
    /// Shorthand for [`ProcessError::InvalidConfiguration`].
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    /// Build an [`ProcessError::OsResource`] from the calling thread's last
    /// OS error.
    ///
    /// Must be called immediately after the failing call, before anything
    /// else can overwrite the thread's last-error slot.
    pub fn last_os_error(operation: &'static str) -> Self {
        let code = std::io::Error::last_os_error()
            .raw_os_error()
            .unwrap_or_default() as u32;
        Self::OsResource { operation, code }
    }

    /// Stable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidConfiguration { .. } => ErrorCode::InvalidConfiguration,
            Self::OsResource { .. } => ErrorCode::OsResource,
            Self::CancelFailure {
                kind: CancelFailureKind::ForeignCancellation,
            } => ErrorCode::CancelForeign,
            Self::CancelFailure { .. } => ErrorCode::CancelAbandonFailed,
            Self::Io(_) => ErrorCode::StreamIo,
        }
    }

    /// Shorthand for `self.code().category()`.
    pub fn category(&self) -> ErrorCategory {
        self.code().category()
    }

    /// Raw OS error code, if this error carries one.
    pub fn os_code(&self) -> Option<u32> {
        match self {
            Self::OsResource { code, .. } => Some(*code),
            Self::CancelFailure {
                kind: CancelFailureKind::AbandonFailed { code },
            } => Some(*code),
            Self::Io(e) => e.raw_os_error().map(|c| c as u32),
            _ => None,
        }
    }
}

/// Convenience alias used across the `sp-*` crates.
pub type Result<T, E = ProcessError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
