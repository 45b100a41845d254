// SPDX-License-Identifier: MIT OR Apache-2.0
//! The process's own standard input as a cancellable line source.

use crate::reader::CancellableLineReader;
use crate::source::{
    AbandonOutcome, AbandonPendingRead, LineSource, PartialLine, SourceRead,
    classify_abandon_error,
};
use sp_error::{ProcessError, Result};
use std::io;
use std::ptr;
use windows_sys::Win32::Foundation::{GetLastError, HANDLE, INVALID_HANDLE_VALUE};
use windows_sys::Win32::System::Console::{GetStdHandle, STD_INPUT_HANDLE};
use windows_sys::Win32::System::IO::CancelIoEx;

/// Lines from [`std::io::stdin`]. An abandoned read surfaces as
/// [`SourceRead::Abandoned`], and any part of a line already consumed from
/// stdin's buffer is kept for the next read.
#[derive(Debug, Default)]
pub struct StdinLineSource {
    pending: PartialLine,
}

impl LineSource for StdinLineSource {
    fn read_line(&mut self) -> io::Result<SourceRead> {
        self.pending.read_from(&mut io::stdin().lock())
    }
}

/// Abandons reads pending on the process's standard input handle.
#[derive(Debug, Clone, Copy)]
pub struct StdinCanceller {
    handle: usize,
}

impl StdinCanceller {
    /// Look up the current standard input handle.
    pub fn new() -> Result<Self> {
        // SAFETY: GetStdHandle has no preconditions.
        let handle = unsafe { GetStdHandle(STD_INPUT_HANDLE) };
        if handle == INVALID_HANDLE_VALUE {
            return Err(ProcessError::last_os_error("GetStdHandle"));
        }
        if handle.is_null() {
            return Err(ProcessError::invalid("process has no standard input"));
        }
        Ok(Self {
            handle: handle as usize,
        })
    }
}

impl AbandonPendingRead for StdinCanceller {
    fn abandon(&self) -> AbandonOutcome {
        // SAFETY: the standard input handle stays open for the life of the
        // process; a null OVERLAPPED cancels every pending request on it.
        let ok = unsafe { CancelIoEx(self.handle as HANDLE, ptr::null()) };
        if ok != 0 {
            return AbandonOutcome::Abandoned;
        }
        // SAFETY: reads this thread's last-error value.
        classify_abandon_error(unsafe { GetLastError() })
    }
}

/// A reader over this process's standard input.
pub fn stdin_reader() -> Result<CancellableLineReader<StdinLineSource, StdinCanceller>> {
    Ok(CancellableLineReader::new(
        StdinLineSource::default(),
        StdinCanceller::new()?,
    ))
}
