// SPDX-License-Identifier: MIT OR Apache-2.0
//! Forwarding the parent's input lines to a child's stdin.

use sp_console::{AbandonPendingRead, CancellableLineReader, LineRead, LineSource};
use sp_error::Result;
use std::io::Write;
use std::time::Duration;
use tracing::debug;

/// Why forwarding stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardEnd {
    /// The parent's input reached end of file.
    InputClosed,
    /// No input arrived within the idle timeout.
    Idle,
    /// The child stopped accepting input.
    SinkClosed,
}

/// Copy lines from `reader` to `sink` until input ends, the child's stdin
/// goes away, or no line arrives within `idle_timeout`.
///
/// `None` waits for input indefinitely. Each line is flushed on its own so
/// an interactive child sees it at once.
pub fn forward_lines<S, A, W>(
    reader: &mut CancellableLineReader<S, A>,
    idle_timeout: Option<Duration>,
    sink: &mut W,
) -> Result<ForwardEnd>
where
    S: LineSource,
    A: AbandonPendingRead,
    W: Write,
{
    let timeout = idle_timeout.unwrap_or(Duration::MAX);
    let mut forwarded: u64 = 0;
    loop {
        match reader.read_line(timeout)? {
            LineRead::Line(line) => {
                if writeln!(sink, "{line}").and_then(|()| sink.flush()).is_err() {
                    debug!(target: "sp.cli", forwarded, "child stdin closed");
                    return Ok(ForwardEnd::SinkClosed);
                }
                forwarded += 1;
            }
            LineRead::Cancelled => {
                debug!(target: "sp.cli", forwarded, ?idle_timeout, "no input in time; closing child stdin");
                return Ok(ForwardEnd::Idle);
            }
            LineRead::Closed => {
                debug!(target: "sp.cli", forwarded, "input closed");
                return Ok(ForwardEnd::InputClosed);
            }
        }
    }
}
