// SPDX-License-Identifier: MIT OR Apache-2.0
//! sp-host
//!
//! Launch a child process whose standard streams are anonymous pipes owned
//! by the parent, optionally flagged so the child believes they are an
//! interactive console, and observe its end exactly once.
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod ended;
pub mod lifecycle;
pub mod stream;

#[cfg(windows)]
pub mod pipe;
#[cfg(windows)]
pub mod process;

pub use ended::{EndedSignal, ProcessEnded};
pub use lifecycle::{Lifecycle, LifecycleTransition, ProcessState};
pub use stream::{StandardStream, StreamDirection, StreamSet};

#[cfg(windows)]
pub use pipe::{InputAnonymousPipe, OutputAnonymousPipe};
#[cfg(windows)]
pub use process::ScriptableProcess;
