// SPDX-License-Identifier: MIT OR Apache-2.0
//! The C runtime's inherited-handle buffer (`lpReserved2` / `cbReserved2`).
//!
//! The MSVC runtime of a child process reads this buffer at startup to
//! reconstruct its file-descriptor table. Layout, native endian, unaligned:
//!
//! ```text
//! u32 count | count x u8 flags | count x pointer-sized handle
//! ```
//!
//! A descriptor whose flags include [`FDEV`] is treated as a character
//! device, which makes the child's runtime skip the buffering it applies
//! to pipes and files.

use serde::{Deserialize, Serialize};
use sp_error::{ProcessError, Result};
use std::mem::size_of;

/// Descriptor is open.
pub const FOPEN: u8 = 0x01;
/// Descriptor refers to a pipe.
pub const FPIPE: u8 = 0x08;
/// Descriptor refers to a character device.
pub const FDEV: u8 = 0x40;
/// Flags for a handle the child should treat as an interactive console.
pub const CONSOLE_DEVICE: u8 = FOPEN | FDEV;

const COUNT_LEN: usize = size_of::<u32>();
const HANDLE_LEN: usize = size_of::<usize>();

/// An encoded CRT handle buffer, ready to hang off `STARTUPINFOW`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrtHandleBuffer {
    bytes: Vec<u8>,
}

impl CrtHandleBuffer {
    /// Encode `flags` and `handles` (parallel slices) into the exact layout
    /// the child runtime expects.
    ///
    /// Fails with [`ProcessError::InvalidConfiguration`] when the slices differ
    /// in length or the result would not fit the 16-bit `cbReserved2` field.
    pub fn encode(flags: &[u8], handles: &[usize]) -> Result<Self> {
        if flags.len() != handles.len() {
            return Err(ProcessError::invalid(format!(
                "CRT buffer needs one flag per handle: {} flags for {} handles",
                flags.len(),
                handles.len()
            )));
        }
        let len = Self::encoded_len(handles.len());
        if len > usize::from(u16::MAX) {
            return Err(ProcessError::invalid(format!(
                "CRT buffer for {} handles is {len} bytes, over the 65535 byte limit",
                handles.len()
            )));
        }

        let mut bytes = Vec::with_capacity(len);
        bytes.extend_from_slice(&(handles.len() as u32).to_ne_bytes());
        bytes.extend_from_slice(flags);
        for handle in handles {
            bytes.extend_from_slice(&handle.to_ne_bytes());
        }
        debug_assert_eq!(bytes.len(), len);
        Ok(Self { bytes })
    }

    /// Size in bytes of a buffer describing `count` handles.
    pub const fn encoded_len(count: usize) -> usize {
        COUNT_LEN + count + count * HANDLE_LEN
    }

    /// Parse a buffer back into `(flags, handle)` pairs.
    pub fn decode(bytes: &[u8]) -> Result<Vec<(u8, usize)>> {
        let Some(count_bytes) = bytes.get(..COUNT_LEN) else {
            return Err(ProcessError::invalid("CRT buffer shorter than its count field"));
        };
        let mut raw = [0u8; COUNT_LEN];
        raw.copy_from_slice(count_bytes);
        let count = u32::from_ne_bytes(raw) as usize;

        if bytes.len() != Self::encoded_len(count) {
            return Err(ProcessError::invalid(format!(
                "CRT buffer declares {count} handles but is {} bytes",
                bytes.len()
            )));
        }

        let flags = &bytes[COUNT_LEN..COUNT_LEN + count];
        let handles = &bytes[COUNT_LEN + count..];
        let entries = flags
            .iter()
            .zip(handles.chunks_exact(HANDLE_LEN))
            .map(|(&flag, chunk)| {
                let mut raw = [0u8; HANDLE_LEN];
                raw.copy_from_slice(chunk);
                (flag, usize::from_ne_bytes(raw))
            })
            .collect();
        Ok(entries)
    }

    /// Number of handles described.
    pub fn count(&self) -> usize {
        (self.bytes.len() - COUNT_LEN) / (1 + HANDLE_LEN)
    }

    /// The encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Value for `cbReserved2`. Fits by construction.
    pub fn len_u16(&self) -> u16 {
        self.bytes.len() as u16
    }

    /// Value for `lpReserved2`. Valid for as long as `self` is alive and
    /// unmoved.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.bytes.as_mut_ptr()
    }
}
