// SPDX-License-Identifier: MIT OR Apache-2.0
//! Waiting for a child to exit and reading its exit code.

use sp_error::{ProcessError, Result};
use std::os::windows::io::{AsRawHandle, BorrowedHandle};
use std::time::Duration;
use tracing::warn;
use windows_sys::Win32::Foundation::{HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT};
use windows_sys::Win32::System::Threading::{GetExitCodeProcess, INFINITE, WaitForSingleObject};

/// Read the exit code of a terminated process.
///
/// A failing query yields `None` ("unknown") and a warning rather than an
/// error: the child is already gone and nothing can be done about it.
pub fn query_exit_code(process: BorrowedHandle<'_>) -> Option<u32> {
    let mut code: u32 = 0;
    // SAFETY: `process` is borrowed and `code` is a valid out-pointer.
    let ok = unsafe { GetExitCodeProcess(process.as_raw_handle() as HANDLE, &mut code) };
    if ok == 0 {
        let err = std::io::Error::last_os_error();
        warn!(target: "sp.winapi", error = %err, "exit code query failed; reporting unknown");
        return None;
    }
    Some(code)
}

/// Block until `process` is signalled or `timeout` elapses.
///
/// Returns `true` if the process has exited. `None` waits forever.
pub fn wait_for_exit(process: BorrowedHandle<'_>, timeout: Option<Duration>) -> Result<bool> {
    let millis = match timeout {
        Some(t) => u32::try_from(t.as_millis()).unwrap_or(INFINITE - 1),
        None => INFINITE,
    };
    // SAFETY: `process` is borrowed for the duration of the wait.
    let rc = unsafe { WaitForSingleObject(process.as_raw_handle() as HANDLE, millis) };
    match rc {
        WAIT_OBJECT_0 => Ok(true),
        WAIT_TIMEOUT => Ok(false),
        _ => Err(ProcessError::last_os_error("WaitForSingleObject")),
    }
}
