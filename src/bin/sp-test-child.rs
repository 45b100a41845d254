// SPDX-License-Identifier: MIT OR Apache-2.0
//! Helper child for end-to-end tests.
//!
//! Output buffering follows the C runtime's view of each stream: a stream
//! the CRT reports as a character device is flushed per line, anything
//! else is block-buffered until exit, as a C program would do.
#![allow(unsafe_code)]

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::io::{self, BufWriter, Write};
use std::thread;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "sp-test-child", about = "Child process used by scriptable-process tests")]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Three stdout/stderr line pairs one second apart, then a stdin line
    /// with a one second timeout.
    #[command(name = "SpacedOutput")]
    SpacedOutput,
    /// Echo one stdin line read with a five second timeout.
    #[command(name = "StdinTest")]
    StdinTest,
    /// Three stdout lines.
    #[command(name = "OnlyOutput")]
    OnlyOutput,
    /// Wait one second, then exit.
    #[command(name = "DelayTaskExample")]
    DelayTaskExample,
    /// Exit with the given code.
    #[command(name = "ExitWith")]
    ExitWith {
        /// Exit code.
        code: i32,
    },
    /// Print whether the C runtime sees each standard stream as a device.
    #[command(name = "ReportConsole")]
    ReportConsole,
    /// Let a short read time out, then read a line with a long timeout.
    #[command(name = "CancelThenRead")]
    CancelThenRead,
}

#[cfg(windows)]
unsafe extern "C" {
    fn _isatty(fd: i32) -> i32;
}

/// Whether the C runtime reports `fd` as a character device.
#[cfg(windows)]
fn crt_isatty(fd: i32) -> bool {
    // SAFETY: `_isatty` only inspects the CRT's descriptor table.
    unsafe { _isatty(fd) != 0 }
}

#[cfg(not(windows))]
fn crt_isatty(_fd: i32) -> bool {
    false
}

/// A line sink that is line-buffered on a device and block-buffered
/// otherwise.
struct Sink<W: Write> {
    inner: BufWriter<W>,
    line_buffered: bool,
}

impl<W: Write> Sink<W> {
    fn new(inner: W, fd: i32) -> Self {
        Self {
            inner: BufWriter::with_capacity(64 * 1024, inner),
            line_buffered: crt_isatty(fd),
        }
    }

    fn line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.inner, "{text}")?;
        if self.line_buffered {
            self.inner.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(windows)]
fn read_stdin_line(timeout: Duration) -> Result<sp_console::LineRead> {
    let mut reader = sp_console::stdin_reader()?;
    Ok(reader.read_line(timeout)?)
}

#[cfg(not(windows))]
fn read_stdin_line(_timeout: Duration) -> Result<sp_console::LineRead> {
    bail!("cancellable stdin reads require Windows")
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut out = Sink::new(io::stdout(), 1);
    let mut err = Sink::new(io::stderr(), 2);

    let code = match cli.mode {
        Mode::SpacedOutput => {
            for i in 1..=3 {
                out.line(&format!("out {i}"))?;
                err.line(&format!("err {i}"))?;
                thread::sleep(Duration::from_secs(1));
            }
            out.flush()?;
            err.flush()?;
            match read_stdin_line(Duration::from_secs(1))? {
                sp_console::LineRead::Line(_) => 0,
                _ => 1,
            }
        }
        Mode::StdinTest => match read_stdin_line(Duration::from_secs(5))? {
            sp_console::LineRead::Line(line) => {
                out.line(&format!("received: {line}"))?;
                0
            }
            other => {
                out.line(&format!("no line: {other:?}"))?;
                1
            }
        },
        Mode::OnlyOutput => {
            for i in 1..=3 {
                out.line(&format!("line {i}"))?;
            }
            0
        }
        Mode::DelayTaskExample => {
            thread::sleep(Duration::from_secs(1));
            0
        }
        Mode::ExitWith { code } => code,
        Mode::ReportConsole => {
            out.line(&format!(
                "stdin={} stdout={} stderr={}",
                u8::from(crt_isatty(0)),
                u8::from(crt_isatty(1)),
                u8::from(crt_isatty(2))
            ))?;
            0
        }
        Mode::CancelThenRead => {
            let first = read_stdin_line(Duration::from_millis(200))?;
            if first != sp_console::LineRead::Cancelled {
                bail!("expected the first read to time out, got {first:?}");
            }
            out.line("cancelled")?;
            out.flush()?;
            match read_stdin_line(Duration::from_secs(10))? {
                sp_console::LineRead::Line(line) => {
                    out.line(&format!("line: {line}"))?;
                    0
                }
                other => {
                    out.line(&format!("no line: {other:?}"))?;
                    1
                }
            }
        }
    };

    out.flush()?;
    err.flush()?;
    std::process::exit(code);
}
