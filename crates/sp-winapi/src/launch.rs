// SPDX-License-Identifier: MIT OR Apache-2.0
//! Process creation with extended startup information.

use crate::attributes::InheritanceAttributes;
use serde::{Deserialize, Serialize};
use sp_error::{ProcessError, Result};
use std::ffi::OsStr;
use std::mem::{size_of, zeroed};
use std::os::windows::ffi::OsStrExt;
use std::os::windows::io::{FromRawHandle, OwnedHandle, RawHandle};
use std::ptr;
use tracing::debug;
use windows_sys::Win32::System::Threading::{
    CreateProcessW, EXTENDED_STARTUPINFO_PRESENT, PROCESS_INFORMATION, STARTF_USESHOWWINDOW,
    STARTF_USESTDHANDLES, STARTUPINFOEXW, STARTUPINFOW,
};

/// `SW_HIDE` from the window-management headers.
const SW_HIDE: u16 = 0;

/// Presentation options that do not affect inheritance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartupOptions {
    /// Start the child with its window hidden.
    pub hide_window: bool,
}

impl Default for StartupOptions {
    fn default() -> Self {
        Self { hide_window: true }
    }
}

/// Child-side handles to install as the child's standard handles.
///
/// Each handle must also be in the allow-list the attributes were built
/// from.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdHandles {
    /// Standard input.
    pub input: Option<RawHandle>,
    /// Standard output.
    pub output: Option<RawHandle>,
    /// Standard error.
    pub error: Option<RawHandle>,
}

impl StdHandles {
    fn any(&self) -> bool {
        self.input.is_some() || self.output.is_some() || self.error.is_some()
    }
}

/// A created child process. Dropping it closes the process and thread
/// handles; the child keeps running.
#[derive(Debug)]
pub struct ProcessIdentity {
    /// Process handle, signalled when the child exits.
    pub process: OwnedHandle,
    /// Handle to the child's primary thread.
    pub thread: OwnedHandle,
    /// Process id.
    pub pid: u32,
    /// Primary thread id.
    pub tid: u32,
}

fn encode_command_line(command: &str) -> Result<Vec<u16>> {
    if command.trim().is_empty() {
        return Err(ProcessError::invalid("command line must not be empty"));
    }
    if command.contains('\0') {
        return Err(ProcessError::invalid(
            "command line must not contain NUL characters",
        ));
    }
    Ok(OsStr::new(command)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect())
}

/// Create a child process running `command`.
///
/// The command line is passed verbatim; the OS splits program from
/// arguments. Inheritance is requested whenever the allow-list is
/// non-empty, and the child then inherits exactly that list. With an empty
/// list nothing is inherited. The child is not waited for.
pub fn launch(
    command: &str,
    attributes: &mut InheritanceAttributes,
    std_handles: &StdHandles,
    options: &StartupOptions,
) -> Result<ProcessIdentity> {
    let mut command_line = encode_command_line(command)?;

    // SAFETY: STARTUPINFOEXW is plain data; all-zero is its documented
    // empty state.
    let mut si: STARTUPINFOEXW = unsafe { zeroed() };
    let extended = !attributes.is_empty();
    let cb = if extended {
        size_of::<STARTUPINFOEXW>()
    } else {
        size_of::<STARTUPINFOW>()
    };
    si.StartupInfo.cb = cb as u32;
    si.lpAttributeList = attributes.list_ptr();

    if options.hide_window {
        si.StartupInfo.dwFlags |= STARTF_USESHOWWINDOW;
        si.StartupInfo.wShowWindow = SW_HIDE;
    }

    if std_handles.any() {
        si.StartupInfo.dwFlags |= STARTF_USESTDHANDLES;
        si.StartupInfo.hStdInput = std_handles.input.unwrap_or(ptr::null_mut()) as _;
        si.StartupInfo.hStdOutput = std_handles.output.unwrap_or(ptr::null_mut()) as _;
        si.StartupInfo.hStdError = std_handles.error.unwrap_or(ptr::null_mut()) as _;
    }

    if let Some(crt) = attributes.crt_mut() {
        si.StartupInfo.cbReserved2 = crt.len_u16();
        si.StartupInfo.lpReserved2 = crt.as_mut_ptr();
    }

    let creation_flags = if extended {
        EXTENDED_STARTUPINFO_PRESENT
    } else {
        0
    };

    // SAFETY: PROCESS_INFORMATION is plain data filled in by the call.
    let mut pi: PROCESS_INFORMATION = unsafe { zeroed() };
    // SAFETY: `command_line` is a mutable NUL-terminated buffer, `si` and
    // everything it points into (attribute list, handle array, CRT buffer)
    // outlive the call.
    let ok = unsafe {
        CreateProcessW(
            ptr::null(),
            command_line.as_mut_ptr(),
            ptr::null(),
            ptr::null(),
            i32::from(extended) as _,
            creation_flags,
            ptr::null(),
            ptr::null(),
            &si.StartupInfo,
            &mut pi,
        )
    };
    if ok == 0 {
        return Err(ProcessError::last_os_error("CreateProcessW"));
    }

    debug!(
        target: "sp.winapi",
        pid = pi.dwProcessId,
        tid = pi.dwThreadId,
        inherited = attributes.handle_count(),
        "created child process"
    );

    // SAFETY: CreateProcessW succeeded; both handles are open and ours.
    let (process, thread) = unsafe {
        (
            OwnedHandle::from_raw_handle(pi.hProcess as _),
            OwnedHandle::from_raw_handle(pi.hThread as _),
        )
    };

    Ok(ProcessIdentity {
        process,
        thread,
        pid: pi.dwProcessId,
        tid: pi.dwThreadId,
    })
}
