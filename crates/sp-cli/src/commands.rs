// SPDX-License-Identifier: MIT OR Apache-2.0
//! Subcommand implementations.

use crate::format::join_command_line;
use anyhow::{Context, Result};
use sp_config::{ConfigWarning, LaunchConfig, load_config, validate_config};
use std::path::Path;

/// Load the launch config, apply flag overrides and validate it.
pub fn resolve_config(
    path: Option<&Path>,
    impersonate_console: bool,
    merge_stderr: bool,
) -> Result<(LaunchConfig, Vec<ConfigWarning>)> {
    let mut config = load_config(path).context("failed to load launch config")?;
    if impersonate_console {
        config.impersonate_console = true;
    }
    if merge_stderr {
        config.merge_stderr = true;
    }
    let warnings = validate_config(&config).context("invalid launch config")?;
    Ok((config, warnings))
}

pub fn cmd_check_config(path: &Path) -> Result<()> {
    let config = load_config(Some(path))
        .with_context(|| format!("failed to load {}", path.display()))?;
    let warnings = validate_config(&config)
        .with_context(|| format!("invalid config {}", path.display()))?;
    for w in &warnings {
        println!("warning: {w}");
    }
    println!("config OK: {}", path.display());
    Ok(())
}

#[cfg(windows)]
pub async fn cmd_run(config: &LaunchConfig, command: &[String], timestamps: bool) -> Result<i32> {
    use crate::format::StreamLabel;
    use sp_host::ScriptableProcess;

    let command_line = join_command_line(command);
    let process = ScriptableProcess::from_config(config).context("failed to create pipes")?;
    process
        .start(&command_line)
        .with_context(|| format!("failed to start `{command_line}`"))?;

    let mut pumps = Vec::new();
    if let Some(out) = process.take_stdout() {
        pumps.push(tokio::task::spawn_blocking(move || {
            pump(out, StreamLabel::Out, timestamps)
        }));
    }
    if let Some(err) = process.take_stderr() {
        pumps.push(tokio::task::spawn_blocking(move || {
            pump(err, StreamLabel::Err, timestamps)
        }));
    }
    if let Some(stdin) = process.take_stdin() {
        // Blocks on our own stdin; never joined.
        let idle_timeout = config.read_timeout();
        std::thread::Builder::new()
            .name("spr-stdin".into())
            .spawn(move || forward_stdin(stdin, idle_timeout))
            .context("failed to spawn stdin forwarder")?;
    }

    let ended = process.ended().await?;
    for p in pumps {
        p.await.context("output pump panicked")??;
    }
    tracing::info!(target: "sp.cli", pid = ended.pid, exit_code = ?ended.exit_code, "child finished");
    Ok(ended.exit_code.map_or(1, |c| c as i32))
}

#[cfg(not(windows))]
pub async fn cmd_run(_config: &LaunchConfig, command: &[String], _timestamps: bool) -> Result<i32> {
    anyhow::bail!(
        "`spr run` requires Windows; cannot run `{}` on this platform",
        join_command_line(command)
    )
}

#[cfg(windows)]
fn pump(source: std::fs::File, label: crate::format::StreamLabel, timestamps: bool) -> Result<()> {
    use crate::format::{StreamLabel, format_line};
    use std::io::{BufRead, BufReader, Write};

    let mut reader = BufReader::new(source);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        let text = String::from_utf8_lossy(&buf);
        let line = text.trim_end_matches(['\r', '\n']);
        let rendered = format_line(label, line, timestamps.then(chrono::Utc::now));
        match label {
            StreamLabel::Out => writeln!(std::io::stdout().lock(), "{rendered}")?,
            StreamLabel::Err => writeln!(std::io::stderr().lock(), "{rendered}")?,
        }
    }
}

#[cfg(windows)]
fn forward_stdin(mut sink: std::fs::File, idle_timeout: Option<std::time::Duration>) {
    use crate::forward::forward_lines;

    let result = sp_console::stdin_reader()
        .and_then(|mut reader| forward_lines(&mut reader, idle_timeout, &mut sink));
    if let Err(e) = result {
        tracing::warn!(target: "sp.cli", error = %e, "stdin forwarding stopped");
    }
    // Dropping `sink` closes the child's stdin.
}
