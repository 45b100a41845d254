// SPDX-License-Identifier: MIT OR Apache-2.0
//! Output formatting for forwarded child streams.

use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;

/// Which child stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamLabel {
    /// Child stdout.
    Out,
    /// Child stderr.
    Err,
}

impl fmt::Display for StreamLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Out => "out",
            Self::Err => "err",
        })
    }
}

/// Render one forwarded line, optionally prefixed with a timestamp and
/// its stream.
pub fn format_line(label: StreamLabel, line: &str, timestamp: Option<DateTime<Utc>>) -> String {
    match timestamp {
        Some(ts) => format!(
            "[{} {label}] {line}",
            ts.to_rfc3339_opts(SecondsFormat::Millis, true)
        ),
        None => line.to_string(),
    }
}

/// Join arguments into one command line, quoting those that need it.
///
/// Quoting follows the MSVC argv rules: backslashes are literal unless
/// they precede a quote, so a run of them is doubled before an embedded
/// quote (which is then escaped) and before the closing quote.
pub fn join_command_line<S: AsRef<str>>(args: &[S]) -> String {
    let mut line = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            line.push(' ');
        }
        quote_arg(arg.as_ref(), &mut line);
    }
    line
}

fn quote_arg(arg: &str, out: &mut String) {
    if !arg.is_empty() && !arg.contains([' ', '\t', '\n', '\x0b', '"']) {
        out.push_str(arg);
        return;
    }
    out.push('"');
    let mut backslashes = 0usize;
    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                out.extend(std::iter::repeat_n('\\', backslashes * 2 + 1));
                out.push('"');
                backslashes = 0;
            }
            _ => {
                out.extend(std::iter::repeat_n('\\', backslashes));
                out.push(c);
                backslashes = 0;
            }
        }
    }
    out.extend(std::iter::repeat_n('\\', backslashes * 2));
    out.push('"');
}
