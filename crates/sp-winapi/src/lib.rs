// SPDX-License-Identifier: MIT OR Apache-2.0
//! sp-winapi
//!
//! Process-creation metadata for scriptable child processes: the explicit
//! handle allow-list, the CRT per-handle flag buffer that makes a pipe look
//! like a console device, and the `CreateProcessW` call that consumes both.
//!
//! [`InheritancePlan`] and [`CrtHandleBuffer`] are plain data and build on
//! every platform. Everything that touches the OS is Windows-only.
#![warn(missing_docs)]

pub mod crt;
pub mod plan;

#[cfg(windows)]
pub mod attributes;
#[cfg(windows)]
pub mod exit;
#[cfg(windows)]
pub mod launch;
#[cfg(windows)]
pub mod pipe;

pub use crt::{CONSOLE_DEVICE, CrtHandleBuffer, FDEV, FOPEN, FPIPE};
pub use plan::{HandleValue, InheritancePlan};

#[cfg(windows)]
pub use attributes::InheritanceAttributes;
#[cfg(windows)]
pub use exit::{query_exit_code, wait_for_exit};
#[cfg(windows)]
pub use launch::{ProcessIdentity, StartupOptions, StdHandles, launch};
#[cfg(windows)]
pub use pipe::{PipeDirection, PipeEnds, create_anonymous_pipe, is_inheritable, mark_inheritable};
