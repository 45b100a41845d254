// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fuzz CRT handle-buffer decoding.
//!
//! Feeds arbitrary bytes to `CrtHandleBuffer::decode`, verifying:
//! 1. `decode` never panics.
//! 2. Anything that decodes re-encodes to the same bytes, unless it is too
//!    large for `cbReserved2`.
#![no_main]
use libfuzzer_sys::fuzz_target;
use sp_winapi::CrtHandleBuffer;

fuzz_target!(|data: &[u8]| {
    let Ok(entries) = CrtHandleBuffer::decode(data) else {
        return;
    };
    let (flags, handles): (Vec<u8>, Vec<usize>) = entries.into_iter().unzip();
    let Ok(buf) = CrtHandleBuffer::encode(&flags, &handles) else {
        assert!(data.len() > usize::from(u16::MAX));
        return;
    };
    assert_eq!(buf.as_bytes(), data, "re-encoding must be lossless");
});
