// SPDX-License-Identifier: MIT OR Apache-2.0
//! sp-console
//!
//! A blocking line read from standard input that can be abandoned on a
//! timeout without leaving a pending read behind and without losing a line
//! that arrived just as the timeout fired.
//!
//! The protocol lives in [`CancellableLineReader`] and [`CancelState`] and
//! is platform-neutral; it talks to the OS only through the [`LineSource`]
//! and [`AbandonPendingRead`] seams. The Windows implementations of those
//! seams read the process's stdin and abandon reads with `CancelIoEx`.
#![warn(missing_docs)]

pub mod reader;
pub mod source;
pub mod state;

#[cfg(windows)]
pub mod stdin;

pub use reader::{CancellableLineReader, LineRead};
pub use source::{
    AbandonOutcome, AbandonPendingRead, ERROR_NOT_FOUND, ERROR_OPERATION_ABORTED, LineSource,
    PartialLine, SourceRead, classify_abandon_error,
};
pub use state::{CancelPhase, CancelState};

#[cfg(windows)]
pub use stdin::{StdinCanceller, StdinLineSource, stdin_reader};
