// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fuzz inheritance planning from arbitrary descriptor slots.
//!
//! Verifies for every accepted plan:
//! 1. The allow-list has no duplicates.
//! 2. Flags, when present, are parallel to the allow-list.
//! 3. Only flagged handles are marked inheritable.
//! 4. Side-buffer entry `i` describes descriptor slot `i`.
#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sp_winapi::{CrtHandleBuffer, InheritancePlan};

#[derive(Debug, Arbitrary)]
struct Streams {
    slots: Vec<Option<(u8, bool)>>,
}

fuzz_target!(|input: Streams| {
    let slots: Vec<Option<(usize, bool)>> = input
        .slots
        .iter()
        .map(|slot| slot.map(|(h, console)| (usize::from(h), console)))
        .collect();
    let Ok(plan) = InheritancePlan::from_streams(slots.iter().copied()) else {
        return;
    };

    let handles = plan.handles();
    for (i, h) in handles.iter().enumerate() {
        assert!(!handles[..i].contains(h), "duplicate handle {h}");
    }
    if let Some(flags) = plan.flags() {
        assert_eq!(flags.len(), handles.len());
    }
    for h in plan.handles_to_mark() {
        assert!(handles.contains(&h));
    }

    // --- Property 4: descriptor order survives deduplication ---
    if let Ok(Some(buf)) = plan.crt_buffer() {
        let fds = CrtHandleBuffer::decode(buf.as_bytes()).expect("own encoding decodes");
        assert!(fds.len() <= slots.len());
        for (fd, (flag, handle)) in fds.iter().enumerate() {
            match slots[fd] {
                Some((h, _)) => assert_eq!(*handle, h),
                None => assert_eq!((*flag, *handle), (0, usize::MAX)),
            }
        }
    }
});
