// SPDX-License-Identifier: MIT OR Apache-2.0
//! The process-creation attribute list carrying the handle allow-list.

use crate::crt::CrtHandleBuffer;
use crate::plan::InheritancePlan;
use sp_error::{ProcessError, Result};
use std::mem::{size_of, size_of_val};
use std::ptr;
use tracing::debug;
use windows_sys::Win32::Foundation::{HANDLE, HANDLE_FLAG_INHERIT, SetHandleInformation};
use windows_sys::Win32::System::Threading::{
    DeleteProcThreadAttributeList, InitializeProcThreadAttributeList,
    LPPROC_THREAD_ATTRIBUTE_LIST, UpdateProcThreadAttribute,
};

/// `ProcThreadAttributeHandleList | PROC_THREAD_ATTRIBUTE_INPUT`.
const PROC_THREAD_ATTRIBUTE_HANDLE_LIST: usize = 0x0002_0002;

/// Owned, initialized `PROC_THREAD_ATTRIBUTE_LIST`.
struct AttributeList {
    // usize-backed for pointer alignment.
    buf: Box<[usize]>,
}

impl AttributeList {
    fn allocate(attribute_count: u32) -> Result<Self> {
        let mut size: usize = 0;
        // SAFETY: a null list with a valid size pointer only queries the
        // required size. The call is expected to fail.
        unsafe { InitializeProcThreadAttributeList(ptr::null_mut(), attribute_count, 0, &mut size) };
        if size == 0 {
            return Err(ProcessError::last_os_error(
                "InitializeProcThreadAttributeList",
            ));
        }

        let words = size.div_ceil(size_of::<usize>());
        let mut buf = vec![0usize; words].into_boxed_slice();
        // SAFETY: `buf` is at least `size` bytes and suitably aligned.
        let ok = unsafe {
            InitializeProcThreadAttributeList(
                buf.as_mut_ptr().cast(),
                attribute_count,
                0,
                &mut size,
            )
        };
        if ok == 0 {
            return Err(ProcessError::last_os_error(
                "InitializeProcThreadAttributeList",
            ));
        }
        Ok(Self { buf })
    }

    fn as_mut_ptr(&mut self) -> LPPROC_THREAD_ATTRIBUTE_LIST {
        self.buf.as_mut_ptr().cast()
    }
}

impl Drop for AttributeList {
    fn drop(&mut self) {
        // SAFETY: only constructed after a successful initialize.
        unsafe { DeleteProcThreadAttributeList(self.as_mut_ptr()) };
    }
}

/// Everything `CreateProcessW` needs to restrict and shape inheritance.
///
/// Owns the attribute list, the handle array it points into and the CRT
/// side buffer. All three stay alive until this value is dropped, which
/// callers do only after the creation call has returned.
pub struct InheritanceAttributes {
    list: Option<AttributeList>,
    handles: Box<[HANDLE]>,
    crt: Option<CrtHandleBuffer>,
}

impl InheritanceAttributes {
    /// Allocate and populate the attribute list for `plan`.
    ///
    /// Every handle in the plan must stay open until the returned value is
    /// dropped. Handles with a non-zero CRT flag are marked inheritable
    /// after the allow-list has been registered; nothing is marked if
    /// registration fails.
    ///
    /// An empty plan allocates nothing; [`crate::launch`] then disables
    /// inheritance altogether.
    pub fn build(plan: &InheritancePlan) -> Result<Self> {
        let crt = plan.crt_buffer()?;
        let handles: Box<[HANDLE]> = plan.handles().iter().map(|&h| h as HANDLE).collect();

        if handles.is_empty() {
            debug!(target: "sp.winapi", "empty allow-list; no attribute list");
            return Ok(Self {
                list: None,
                handles,
                crt,
            });
        }

        let mut list = AttributeList::allocate(1)?;
        // SAFETY: `handles` lives in `Self` next to `list` and is dropped
        // after it, satisfying the lifetime rule for attribute values.
        let ok = unsafe {
            UpdateProcThreadAttribute(
                list.as_mut_ptr(),
                0,
                PROC_THREAD_ATTRIBUTE_HANDLE_LIST,
                handles.as_ptr().cast(),
                size_of_val(&*handles),
                ptr::null_mut(),
                ptr::null(),
            )
        };
        if ok == 0 {
            return Err(ProcessError::last_os_error("UpdateProcThreadAttribute"));
        }

        for handle in plan.handles_to_mark() {
            // SAFETY: the caller keeps every planned handle open.
            let ok = unsafe {
                SetHandleInformation(handle as HANDLE, HANDLE_FLAG_INHERIT, HANDLE_FLAG_INHERIT)
            };
            if ok == 0 {
                return Err(ProcessError::last_os_error("SetHandleInformation"));
            }
        }

        debug!(
            target: "sp.winapi",
            handles = handles.len(),
            crt_flags = crt.is_some(),
            "built inheritance attribute list"
        );

        Ok(Self {
            list: Some(list),
            handles,
            crt,
        })
    }

    /// Number of handles in the allow-list.
    pub fn handle_count(&self) -> usize {
        self.handles.len()
    }

    /// `true` when the child inherits nothing.
    pub fn is_empty(&self) -> bool {
        self.list.is_none()
    }

    /// The CRT side buffer, when any handle impersonates a console.
    pub fn crt_buffer(&self) -> Option<&CrtHandleBuffer> {
        self.crt.as_ref()
    }

    pub(crate) fn list_ptr(&mut self) -> LPPROC_THREAD_ATTRIBUTE_LIST {
        match self.list.as_mut() {
            Some(list) => list.as_mut_ptr(),
            None => ptr::null_mut(),
        }
    }

    pub(crate) fn crt_mut(&mut self) -> Option<&mut CrtHandleBuffer> {
        self.crt.as_mut()
    }
}
