// SPDX-License-Identifier: MIT OR Apache-2.0
//! Seams between the cancel protocol and the OS.

use std::io::{self, BufRead};
use std::mem;

/// `ERROR_OPERATION_ABORTED`: the read was abandoned.
pub const ERROR_OPERATION_ABORTED: u32 = 995;

/// `ERROR_NOT_FOUND` (0x490): no pending operation to abandon.
pub const ERROR_NOT_FOUND: u32 = 0x490;

/// How one blocking line read ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRead {
    /// A line, including any line terminator.
    Line(String),
    /// End of input.
    Eof,
    /// The read was abandoned before it completed.
    Abandoned,
}

/// A blocking source of lines. Used only on the thread that calls
/// [`CancellableLineReader::read_line`](crate::CancellableLineReader::read_line).
pub trait LineSource {
    /// Block until a line, end of input, or abandonment.
    fn read_line(&mut self) -> io::Result<SourceRead>;
}

/// Result of one request to abandon a pending read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonOutcome {
    /// A pending read was found and abandoned.
    Abandoned,
    /// No read was pending (yet, or any more).
    NothingPending,
    /// Any other failure, with its OS error code.
    Failed(u32),
}

/// Best-effort abandonment of the read pending on a [`LineSource`].
///
/// Called from the watcher thread while the reader thread is blocked.
pub trait AbandonPendingRead: Sync {
    /// Request that the pending read be abandoned.
    fn abandon(&self) -> AbandonOutcome;
}

/// Map the OS error code of a failed abandon request.
pub fn classify_abandon_error(code: u32) -> AbandonOutcome {
    if code == ERROR_NOT_FOUND {
        AbandonOutcome::NothingPending
    } else {
        AbandonOutcome::Failed(code)
    }
}

/// The start of a line whose end has not arrived yet.
///
/// A buffered read consumes bytes from the reader before it blocks for the
/// rest of the line. Keeping them here across an abandoned read lets the
/// next read resume instead of dropping them.
#[derive(Debug, Default)]
pub struct PartialLine {
    bytes: Vec<u8>,
}

impl PartialLine {
    /// An empty partial line.
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` when no bytes are held over.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Read through the next `\n` or end of input, prefixed by any bytes
    /// held over from an abandoned read.
    ///
    /// A final line without a terminator is returned as a line; `Eof` only
    /// when nothing at all is left.
    pub fn read_from<R: BufRead + ?Sized>(&mut self, reader: &mut R) -> io::Result<SourceRead> {
        match reader.read_until(b'\n', &mut self.bytes) {
            Ok(_) if self.bytes.is_empty() => Ok(SourceRead::Eof),
            Ok(_) => String::from_utf8(mem::take(&mut self.bytes))
                .map(SourceRead::Line)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
            Err(e) if e.raw_os_error() == Some(ERROR_OPERATION_ABORTED as i32) => {
                Ok(SourceRead::Abandoned)
            }
            Err(e) => Err(e),
        }
    }
}

impl<T: AbandonPendingRead + ?Sized> AbandonPendingRead for &T {
    fn abandon(&self) -> AbandonOutcome {
        (**self).abandon()
    }
}

impl<T: LineSource + ?Sized> LineSource for &mut T {
    fn read_line(&mut self) -> io::Result<SourceRead> {
        (**self).read_line()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::io::Read;

    #[test]
    fn not_found_is_benign() {
        assert_eq!(classify_abandon_error(1168), AbandonOutcome::NothingPending);
        assert_eq!(classify_abandon_error(6), AbandonOutcome::Failed(6));
    }

    /// Hands out scripted chunks; an `Err` chunk fails that one read.
    struct Chunks {
        script: VecDeque<io::Result<&'static [u8]>>,
        current: &'static [u8],
    }

    impl Chunks {
        fn new(script: Vec<io::Result<&'static [u8]>>) -> Self {
            Self {
                script: script.into(),
                current: &[],
            }
        }
    }

    impl Read for Chunks {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let data = self.fill_buf()?;
            let n = data.len().min(buf.len());
            buf[..n].copy_from_slice(&data[..n]);
            self.consume(n);
            Ok(n)
        }
    }

    impl BufRead for Chunks {
        fn fill_buf(&mut self) -> io::Result<&[u8]> {
            if self.current.is_empty() {
                match self.script.pop_front() {
                    Some(Ok(chunk)) => self.current = chunk,
                    Some(Err(e)) => return Err(e),
                    None => {}
                }
            }
            Ok(self.current)
        }

        fn consume(&mut self, amt: usize) {
            self.current = &self.current[amt..];
        }
    }

    fn ok(chunk: &'static [u8]) -> io::Result<&'static [u8]> {
        Ok(chunk)
    }

    fn aborted() -> io::Error {
        io::Error::from_raw_os_error(ERROR_OPERATION_ABORTED as i32)
    }

    #[test]
    fn bytes_before_an_abandon_are_kept_for_the_next_read() {
        let mut input = Chunks::new(vec![ok(b"ab"), Err(aborted()), ok(b"c\n")]);
        let mut partial = PartialLine::new();

        assert_eq!(partial.read_from(&mut input).unwrap(), SourceRead::Abandoned);
        assert!(!partial.is_empty());
        assert_eq!(
            partial.read_from(&mut input).unwrap(),
            SourceRead::Line("abc\n".into())
        );
        assert!(partial.is_empty());
    }

    #[test]
    fn unterminated_tail_is_a_line_then_eof() {
        let mut input = Chunks::new(vec![ok(b"one\ntwo")]);
        let mut partial = PartialLine::new();
        assert_eq!(partial.read_from(&mut input).unwrap(), SourceRead::Line("one\n".into()));
        assert_eq!(partial.read_from(&mut input).unwrap(), SourceRead::Line("two".into()));
        assert_eq!(partial.read_from(&mut input).unwrap(), SourceRead::Eof);
    }

    #[test]
    fn other_errors_pass_through() {
        let mut input = Chunks::new(vec![Err(io::Error::from_raw_os_error(6))]);
        let err = PartialLine::new().read_from(&mut input).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(6));
    }

    #[test]
    fn invalid_utf8_is_invalid_data() {
        let mut input = Chunks::new(vec![ok(b"\xff\n")]);
        let err = PartialLine::new().read_from(&mut input).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
