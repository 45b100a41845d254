// SPDX-License-Identifier: MIT OR Apache-2.0
//! Anonymous-pipe standard streams.

use crate::stream::{StandardStream, StreamDirection};
use sp_error::Result;
use sp_winapi::{HandleValue, PipeDirection, create_anonymous_pipe};
use std::fs::File;
use std::os::windows::io::{AsRawHandle, OwnedHandle};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, trace};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct AnonymousPipe {
    direction: StreamDirection,
    impersonate_console: bool,
    parent: Mutex<Option<File>>,
    child: Mutex<Option<OwnedHandle>>,
}

impl AnonymousPipe {
    fn create(direction: StreamDirection, impersonate_console: bool) -> Result<Self> {
        let pipe_direction = match direction {
            StreamDirection::ToChild => PipeDirection::ToChild,
            StreamDirection::FromChild => PipeDirection::FromChild,
        };
        let ends = create_anonymous_pipe(pipe_direction)?;
        debug!(
            target: "sp.host.stream",
            ?direction,
            impersonate_console,
            "created pipe stream"
        );
        Ok(Self {
            direction,
            impersonate_console,
            parent: Mutex::new(Some(File::from(ends.parent))),
            child: Mutex::new(Some(ends.child)),
        })
    }

    fn child_handle(&self) -> Option<HandleValue> {
        lock(&self.child)
            .as_ref()
            .map(|h| h.as_raw_handle() as HandleValue)
    }

    fn take_stream(&self) -> Option<File> {
        lock(&self.parent).take()
    }

    fn release_child(&self) {
        if let Some(handle) = lock(&self.child).take() {
            trace!(
                target: "sp.host.stream",
                direction = ?self.direction,
                handle = ?handle.as_raw_handle(),
                "released child end"
            );
        }
    }
}

/// A pipe the parent writes and the child reads as its standard input.
#[derive(Debug)]
pub struct InputAnonymousPipe {
    pipe: AnonymousPipe,
}

impl InputAnonymousPipe {
    /// Create the pipe. With `impersonate_console` the child's C runtime
    /// sees its stdin as a console device.
    pub fn new(impersonate_console: bool) -> Result<Self> {
        Ok(Self {
            pipe: AnonymousPipe::create(StreamDirection::ToChild, impersonate_console)?,
        })
    }
}

impl StandardStream for InputAnonymousPipe {
    fn direction(&self) -> StreamDirection {
        StreamDirection::ToChild
    }

    fn child_handle(&self) -> Option<HandleValue> {
        self.pipe.child_handle()
    }

    fn impersonate_console(&self) -> bool {
        self.pipe.impersonate_console
    }

    /// The write end. Dropping it closes the child's stdin.
    fn take_stream(&self) -> Option<File> {
        self.pipe.take_stream()
    }

    fn handle_process_start(&self) {
        self.pipe.release_child();
    }
}

/// A pipe the child writes as stdout or stderr and the parent reads.
#[derive(Debug)]
pub struct OutputAnonymousPipe {
    pipe: AnonymousPipe,
}

impl OutputAnonymousPipe {
    /// Create the pipe. With `impersonate_console` the child's C runtime
    /// sees the stream as a console device and keeps it line-buffered.
    pub fn new(impersonate_console: bool) -> Result<Self> {
        Ok(Self {
            pipe: AnonymousPipe::create(StreamDirection::FromChild, impersonate_console)?,
        })
    }
}

impl StandardStream for OutputAnonymousPipe {
    fn direction(&self) -> StreamDirection {
        StreamDirection::FromChild
    }

    fn child_handle(&self) -> Option<HandleValue> {
        self.pipe.child_handle()
    }

    fn impersonate_console(&self) -> bool {
        self.pipe.impersonate_console
    }

    /// The read end. Reads return end-of-file once every writer, the
    /// child included, has closed.
    fn take_stream(&self) -> Option<File> {
        self.pipe.take_stream()
    }

    fn handle_process_start(&self) {
        self.pipe.release_child();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn input_pipe_hands_out_write_end_once() {
        let pipe = InputAnonymousPipe::new(false).unwrap();
        assert_eq!(pipe.direction(), StreamDirection::ToChild);
        assert!(pipe.child_handle().is_some());
        assert!(pipe.take_stream().is_some());
        assert!(pipe.take_stream().is_none());
    }

    #[test]
    fn release_clears_child_handle() {
        let pipe = OutputAnonymousPipe::new(true).unwrap();
        assert!(pipe.impersonate_console());
        pipe.handle_process_start();
        assert!(pipe.child_handle().is_none());
        pipe.handle_process_start();
    }

    #[test]
    fn read_end_sees_eof_after_child_end_released() {
        let pipe = OutputAnonymousPipe::new(false).unwrap();
        let mut reader = pipe.take_stream().unwrap();
        pipe.handle_process_start();
        let mut buf = Vec::new();
        assert_eq!(reader.read_to_end(&mut buf).unwrap(), 0);
    }

    #[test]
    fn write_end_accepts_data_while_child_end_open() {
        let pipe = InputAnonymousPipe::new(false).unwrap();
        let mut writer = pipe.take_stream().unwrap();
        writer.write_all(b"hello\n").unwrap();
    }
}
