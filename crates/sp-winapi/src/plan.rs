// SPDX-License-Identifier: MIT OR Apache-2.0
//! The inheritance plan: which handles a child may inherit, and how its C
//! runtime should see each of them.

use crate::crt::{CONSOLE_DEVICE, CrtHandleBuffer};
use serde::{Deserialize, Serialize};
use sp_error::{ProcessError, Result};

/// Numeric value of an OS handle, as stored in the allow-list.
pub type HandleValue = usize;

/// `INVALID_HANDLE_VALUE` as an unsigned integer.
const INVALID_HANDLE: HandleValue = usize::MAX;

/// Validated allow-list plus optional parallel CRT flags.
///
/// Building a plan never touches OS state; every caller-misuse error is
/// reported here, before an attribute list is allocated.
///
/// The allow-list is deduplicated, but the child's C runtime reads side
/// buffer entry `i` as descriptor `i`, so the plan also keeps which handle
/// sits in each descriptor slot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InheritancePlan {
    handles: Vec<HandleValue>,
    flags: Option<Vec<u8>>,
    descriptors: Vec<Option<HandleValue>>,
}

impl InheritancePlan {
    /// Build a plan from an explicit allow-list and optional flag array.
    ///
    /// `flags`, when present, must be exactly as long as `handles`. Null and
    /// `INVALID_HANDLE_VALUE` entries are rejected. Handle `i` is described
    /// to the child's runtime as descriptor `i`.
    pub fn new(handles: Vec<HandleValue>, flags: Option<Vec<u8>>) -> Result<Self> {
        let descriptors = handles.iter().copied().map(Some).collect();
        Self::with_descriptors(handles, flags, descriptors)
    }

    fn with_descriptors(
        handles: Vec<HandleValue>,
        flags: Option<Vec<u8>>,
        descriptors: Vec<Option<HandleValue>>,
    ) -> Result<Self> {
        if let Some(flags) = &flags
            && flags.len() != handles.len()
        {
            return Err(ProcessError::invalid(format!(
                "flags length {} does not match {} handles",
                flags.len(),
                handles.len()
            )));
        }
        if let Some(bad) = handles
            .iter()
            .find(|&&h| h == 0 || h == INVALID_HANDLE)
        {
            return Err(ProcessError::invalid(format!(
                "handle 0x{bad:x} cannot be inherited"
            )));
        }
        Ok(Self {
            handles,
            flags,
            descriptors,
        })
    }

    /// Build a plan from standard stream slots in stdin/stdout/stderr order.
    ///
    /// Each slot is `None` when the child gets no handle for that
    /// descriptor, or `(child handle, impersonate console)`. Aliased handles
    /// appear once in the allow-list, at their first position; an alias
    /// that asks for console impersonation upgrades the shared entry. The
    /// flag array is only produced when at least one entry impersonates a
    /// console.
    pub fn from_streams<I>(streams: I) -> Result<Self>
    where
        I: IntoIterator<Item = Option<(HandleValue, bool)>>,
    {
        let mut handles: Vec<HandleValue> = Vec::with_capacity(3);
        let mut impersonate: Vec<bool> = Vec::with_capacity(3);
        let mut descriptors: Vec<Option<HandleValue>> = Vec::with_capacity(3);

        for slot in streams {
            descriptors.push(slot.map(|(handle, _)| handle));
            let Some((handle, console)) = slot else {
                continue;
            };
            match handles.iter().position(|&h| h == handle) {
                Some(i) => impersonate[i] |= console,
                None => {
                    handles.push(handle);
                    impersonate.push(console);
                }
            }
        }

        let flags = impersonate.iter().any(|&c| c).then(|| {
            impersonate
                .iter()
                .map(|&c| if c { CONSOLE_DEVICE } else { 0 })
                .collect()
        });
        Self::with_descriptors(handles, flags, descriptors)
    }

    /// The allow-list, in order.
    pub fn handles(&self) -> &[HandleValue] {
        &self.handles
    }

    /// The flag array parallel to [`handles`](Self::handles), if any.
    pub fn flags(&self) -> Option<&[u8]> {
        self.flags.as_deref()
    }

    /// The handle in each descriptor slot, `None` for an empty slot.
    pub fn descriptors(&self) -> &[Option<HandleValue>] {
        &self.descriptors
    }

    /// `true` when nothing is to be inherited.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Handles that carry a non-zero flag and must be marked inheritable.
    pub fn handles_to_mark(&self) -> Vec<HandleValue> {
        match &self.flags {
            Some(flags) => self
                .handles
                .iter()
                .zip(flags)
                .filter(|(_, f)| **f != 0)
                .map(|(h, _)| *h)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Encode the CRT side buffer, if the plan carries flags.
    ///
    /// One entry per descriptor up to the last filled slot. An empty slot
    /// is written as `INVALID_HANDLE_VALUE` with no flags, and an aliased
    /// slot repeats the shared handle and its flag.
    pub fn crt_buffer(&self) -> Result<Option<CrtHandleBuffer>> {
        let Some(flags) = self.flags.as_deref() else {
            return Ok(None);
        };
        let used = self
            .descriptors
            .iter()
            .rposition(Option::is_some)
            .map_or(0, |last| last + 1);

        let mut fd_flags = Vec::with_capacity(used);
        let mut fd_handles = Vec::with_capacity(used);
        for slot in &self.descriptors[..used] {
            let entry = slot.and_then(|h| {
                self.handles
                    .iter()
                    .position(|&a| a == h)
                    .map(|i| (flags[i], h))
            });
            let (flag, handle) = entry.unwrap_or((0, INVALID_HANDLE));
            fd_flags.push(flag);
            fd_handles.push(handle);
        }
        CrtHandleBuffer::encode(&fd_flags, &fd_handles).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots(entries: &[(HandleValue, bool)]) -> Vec<Option<(HandleValue, bool)>> {
        entries.iter().copied().map(Some).collect()
    }

    #[test]
    fn no_impersonation_means_no_flags() {
        let plan = InheritancePlan::from_streams(slots(&[(4, false), (8, false), (12, false)]))
            .unwrap();
        assert_eq!(plan.handles(), &[4, 8, 12]);
        assert!(plan.flags().is_none());
        assert!(plan.handles_to_mark().is_empty());
        assert!(plan.crt_buffer().unwrap().is_none());
    }

    #[test]
    fn one_impersonating_stream_produces_parallel_flags() {
        let plan = InheritancePlan::from_streams(slots(&[(4, false), (8, true)])).unwrap();
        assert_eq!(plan.flags(), Some(&[0, CONSOLE_DEVICE][..]));
        assert_eq!(plan.handles_to_mark(), vec![8]);
    }

    #[test]
    fn aliases_collapse_to_first_position() {
        let plan =
            InheritancePlan::from_streams(slots(&[(4, false), (8, false), (8, true)])).unwrap();
        assert_eq!(plan.handles(), &[4, 8]);
        assert_eq!(plan.flags(), Some(&[0, CONSOLE_DEVICE][..]));
    }

    #[test]
    fn empty_stdin_keeps_stdout_on_descriptor_one() {
        let plan =
            InheritancePlan::from_streams([None, Some((8, true)), Some((8, true))]).unwrap();
        assert_eq!(plan.handles(), &[8]);
        assert_eq!(plan.descriptors(), &[None, Some(8), Some(8)]);

        let buf = plan.crt_buffer().unwrap().unwrap();
        let decoded = CrtHandleBuffer::decode(buf.as_bytes()).unwrap();
        assert_eq!(
            decoded,
            vec![(0, INVALID_HANDLE), (CONSOLE_DEVICE, 8), (CONSOLE_DEVICE, 8)]
        );
    }

    #[test]
    fn trailing_empty_slots_are_not_described() {
        let plan = InheritancePlan::from_streams([Some((4, true)), None, None]).unwrap();
        let buf = plan.crt_buffer().unwrap().unwrap();
        assert_eq!(buf.count(), 1);
    }

    #[test]
    fn mismatched_flags_rejected() {
        let err = InheritancePlan::new(vec![4, 8], Some(vec![CONSOLE_DEVICE])).unwrap_err();
        assert!(err.to_string().contains("flags length 1 does not match 2 handles"));
    }

    #[test]
    fn invalid_handle_values_rejected() {
        assert!(InheritancePlan::new(vec![0], None).is_err());
        assert!(InheritancePlan::new(vec![usize::MAX], None).is_err());
        assert!(InheritancePlan::from_streams([Some((0, true))]).is_err());
    }

    #[test]
    fn empty_plan_is_valid() {
        let plan = InheritancePlan::from_streams(std::iter::empty()).unwrap();
        assert!(plan.is_empty());
        assert!(plan.flags().is_none());
    }

    #[test]
    fn explicit_plan_describes_handles_in_order() {
        let plan = InheritancePlan::new(vec![4, 8], Some(vec![CONSOLE_DEVICE, 0])).unwrap();
        let buf = plan.crt_buffer().unwrap().unwrap();
        assert_eq!(
            CrtHandleBuffer::decode(buf.as_bytes()).unwrap(),
            vec![(CONSOLE_DEVICE, 4), (0, 8)]
        );
    }
}
