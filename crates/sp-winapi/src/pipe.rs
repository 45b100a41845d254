// SPDX-License-Identifier: MIT OR Apache-2.0
//! Anonymous pipes whose child-side end can be inherited.

use sp_error::{ProcessError, Result};
use std::os::windows::io::{AsHandle, AsRawHandle, BorrowedHandle, FromRawHandle, OwnedHandle};
use std::ptr;
use tracing::trace;
use windows_sys::Win32::Foundation::{
    GetHandleInformation, HANDLE, HANDLE_FLAG_INHERIT, INVALID_HANDLE_VALUE, SetHandleInformation,
};
use windows_sys::Win32::System::Pipes::CreatePipe;

/// Which way data flows, seen from the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeDirection {
    /// Parent writes, child reads (the child's stdin).
    ToChild,
    /// Child writes, parent reads (the child's stdout or stderr).
    FromChild,
}

/// Both ends of a freshly created pipe, sorted by owner.
#[derive(Debug)]
pub struct PipeEnds {
    /// End the parent keeps and reads or writes.
    pub parent: OwnedHandle,
    /// End handed to the child through inheritance. Inheritable.
    pub child: OwnedHandle,
}

/// Create a unidirectional anonymous pipe.
///
/// Both ends are created non-inheritable; only the child end is then
/// flagged inheritable, so the parent end never leaks into any child.
pub fn create_anonymous_pipe(direction: PipeDirection) -> Result<PipeEnds> {
    let mut read: HANDLE = INVALID_HANDLE_VALUE;
    let mut write: HANDLE = INVALID_HANDLE_VALUE;

    // SAFETY: both out-pointers are valid locals; null security attributes
    // produce non-inheritable handles.
    let ok = unsafe { CreatePipe(&mut read, &mut write, ptr::null(), 0) };
    if ok == 0 {
        return Err(ProcessError::last_os_error("CreatePipe"));
    }

    // SAFETY: CreatePipe succeeded, so both handles are open and owned by us.
    let (read, write) = unsafe {
        (
            OwnedHandle::from_raw_handle(read as _),
            OwnedHandle::from_raw_handle(write as _),
        )
    };

    let ends = match direction {
        PipeDirection::ToChild => PipeEnds {
            parent: write,
            child: read,
        },
        PipeDirection::FromChild => PipeEnds {
            parent: read,
            child: write,
        },
    };
    mark_inheritable(ends.child.as_handle())?;
    trace!(target: "sp.winapi", ?direction, child = ?ends.child.as_raw_handle(), "created anonymous pipe");
    Ok(ends)
}

/// Set `HANDLE_FLAG_INHERIT` on `handle`.
pub fn mark_inheritable(handle: BorrowedHandle<'_>) -> Result<()> {
    // SAFETY: `handle` is borrowed, so it stays open for the call.
    let ok = unsafe {
        SetHandleInformation(
            handle.as_raw_handle() as HANDLE,
            HANDLE_FLAG_INHERIT,
            HANDLE_FLAG_INHERIT,
        )
    };
    if ok == 0 {
        return Err(ProcessError::last_os_error("SetHandleInformation"));
    }
    Ok(())
}

/// Whether `handle` currently carries `HANDLE_FLAG_INHERIT`.
pub fn is_inheritable(handle: BorrowedHandle<'_>) -> Result<bool> {
    let mut flags: u32 = 0;
    // SAFETY: `handle` is borrowed and `flags` is a valid out-pointer.
    let ok = unsafe { GetHandleInformation(handle.as_raw_handle() as HANDLE, &mut flags) };
    if ok == 0 {
        return Err(ProcessError::last_os_error("GetHandleInformation"));
    }
    Ok(flags & HANDLE_FLAG_INHERIT != 0)
}
