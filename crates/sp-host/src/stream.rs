// SPDX-License-Identifier: MIT OR Apache-2.0
//! Standard streams handed to a child, and the set a process owns.

use sp_error::{ProcessError, Result};
use sp_winapi::{HandleValue, InheritancePlan};
use std::fmt;
use std::fs::File;
use std::sync::Arc;

/// Data direction, seen from the child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDirection {
    /// The child reads (stdin).
    ToChild,
    /// The child writes (stdout, stderr).
    FromChild,
}

/// One standard stream of a child process.
///
/// The stream owns the child-side handle until the child has been
/// created; [`handle_process_start`](Self::handle_process_start) then
/// releases the parent's reference so the child holds the only one and
/// the parent sees end-of-stream when the child exits.
pub trait StandardStream: Send + Sync + fmt::Debug {
    /// Direction of data flow.
    fn direction(&self) -> StreamDirection;

    /// The child-side handle, or `None` once it has been released.
    fn child_handle(&self) -> Option<HandleValue>;

    /// Whether the child should see this stream as a console device.
    fn impersonate_console(&self) -> bool;

    /// Take the parent-side end. Returns `None` if already taken.
    fn take_stream(&self) -> Option<File>;

    /// Release the parent's copy of the child-side handle. Called exactly
    /// once, after the child process exists.
    fn handle_process_start(&self);

    /// Called once after the child has ended.
    fn handle_process_end(&self) {}
}

/// Up to three streams, which may alias one another.
#[derive(Clone, Default)]
pub struct StreamSet {
    /// Child's standard input.
    pub input: Option<Arc<dyn StandardStream>>,
    /// Child's standard output.
    pub output: Option<Arc<dyn StandardStream>>,
    /// Child's standard error.
    pub error: Option<Arc<dyn StandardStream>>,
}

impl StreamSet {
    /// A set from its three slots.
    pub fn new(
        input: Option<Arc<dyn StandardStream>>,
        output: Option<Arc<dyn StandardStream>>,
        error: Option<Arc<dyn StandardStream>>,
    ) -> Self {
        Self {
            input,
            output,
            error,
        }
    }

    /// Distinct streams in input, output, error order; aliases appear once.
    pub fn distinct(&self) -> Vec<Arc<dyn StandardStream>> {
        let mut out: Vec<Arc<dyn StandardStream>> = Vec::with_capacity(3);
        for stream in [&self.input, &self.output, &self.error].into_iter().flatten() {
            if !out.iter().any(|s| Arc::ptr_eq(s, stream)) {
                out.push(Arc::clone(stream));
            }
        }
        out
    }

    /// Check slot directions and that every child handle is still held.
    pub fn validate(&self) -> Result<()> {
        let slots = [
            ("input", &self.input, StreamDirection::ToChild),
            ("output", &self.output, StreamDirection::FromChild),
            ("error", &self.error, StreamDirection::FromChild),
        ];
        for (name, slot, expected) in slots {
            let Some(stream) = slot else { continue };
            if stream.direction() != expected {
                return Err(ProcessError::invalid(format!(
                    "{name} stream must flow {expected:?}, got {:?}",
                    stream.direction()
                )));
            }
            if stream.child_handle().is_none() {
                return Err(ProcessError::invalid(format!(
                    "{name} stream was already handed to another process"
                )));
            }
        }
        Ok(())
    }

    /// The inheritance plan for these streams, one slot per descriptor.
    pub fn plan(&self) -> Result<InheritancePlan> {
        self.validate()?;
        let slots = [&self.input, &self.output, &self.error].map(|slot| {
            slot.as_ref()
                .and_then(|s| s.child_handle().map(|h| (h, s.impersonate_console())))
        });
        InheritancePlan::from_streams(slots)
    }

    /// `true` when no slot is filled.
    pub fn is_empty(&self) -> bool {
        self.input.is_none() && self.output.is_none() && self.error.is_none()
    }
}

impl fmt::Debug for StreamSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSet")
            .field("input", &self.input)
            .field("output", &self.output)
            .field("error", &self.error)
            .field("distinct", &self.distinct().len())
            .finish()
    }
}
