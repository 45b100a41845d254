// SPDX-License-Identifier: MIT OR Apache-2.0
//! Launch configuration for scriptable processes.
//!
//! [`LaunchConfig`] describes which standard streams a child gets, whether
//! they impersonate a console, and a few presentation and logging knobs.
//! It is loaded from TOML, overridden from `SP_*` environment variables,
//! validated into hard errors plus advisory [`ConfigWarning`]s, and merged.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory-level issues that do not prevent a launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// Every stream is `none`; the child's output is discarded.
    NoStreamsPiped,
    /// `merge_stderr` is set, so the `stderr` setting is ignored.
    MergedStderrIgnored {
        /// The setting that will be ignored.
        setting: StreamSetting,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::NoStreamsPiped => {
                f.write_str("no standard stream is piped; the child runs detached from the parent")
            }
            ConfigWarning::MergedStderrIgnored { setting } => {
                write!(f, "stderr = '{setting}' is ignored because merge_stderr is set")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// How one standard stream of the child is wired.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum StreamSetting {
    /// An anonymous pipe; impersonates a console if the top-level
    /// `impersonate_console` is set.
    #[default]
    Pipe,
    /// Not redirected.
    None,
    /// An anonymous pipe that always impersonates a console.
    ConsolePipe,
}

impl StreamSetting {
    /// Whether a pipe is created for this stream.
    pub fn is_piped(self) -> bool {
        !matches!(self, StreamSetting::None)
    }

    /// Whether the pipe impersonates a console, given the global default.
    pub fn impersonates(self, default: bool) -> bool {
        match self {
            StreamSetting::Pipe => default,
            StreamSetting::None => false,
            StreamSetting::ConsolePipe => true,
        }
    }
}

impl std::fmt::Display for StreamSetting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StreamSetting::Pipe => "pipe",
            StreamSetting::None => "none",
            StreamSetting::ConsolePipe => "console_pipe",
        })
    }
}

/// Per-stream settings.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct StreamsConfig {
    /// Child's standard input.
    #[serde(default)]
    pub stdin: StreamSetting,
    /// Child's standard output.
    #[serde(default)]
    pub stdout: StreamSetting,
    /// Child's standard error.
    #[serde(default)]
    pub stderr: StreamSetting,
}

/// Settings for launching one scriptable process.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Default console impersonation for `pipe` streams.
    #[serde(default)]
    pub impersonate_console: bool,

    /// Per-stream wiring.
    #[serde(default)]
    pub streams: StreamsConfig,

    /// Send stderr through the stdout pipe.
    #[serde(default)]
    pub merge_stderr: bool,

    /// Hide the child's window.
    #[serde(default = "default_hide_window")]
    pub hide_window: bool,

    /// Default timeout for cancellable line reads, in milliseconds. `spr`
    /// closes the child's stdin after this long without parent input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout_ms: Option<u64>,

    /// Log level override (e.g. `"debug"`, `"info"`, `"warn"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

fn default_hide_window() -> bool {
    true
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            impersonate_console: false,
            streams: StreamsConfig::default(),
            merge_stderr: false,
            hide_window: true,
            read_timeout_ms: None,
            log_level: Some("info".into()),
        }
    }
}

impl LaunchConfig {
    /// Effective `(piped, impersonate)` for stdin, stdout and stderr.
    ///
    /// With `merge_stderr` the stderr entry mirrors stdout.
    pub fn resolved_streams(&self) -> [(bool, bool); 3] {
        let resolve = |s: StreamSetting| (s.is_piped(), s.impersonates(self.impersonate_console));
        let stdout = resolve(self.streams.stdout);
        let stderr = if self.merge_stderr {
            stdout
        } else {
            resolve(self.streams.stderr)
        };
        [resolve(self.streams.stdin), stdout, stderr]
    }

    /// `read_timeout_ms` as a duration; `None` means reads never time out.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum allowed read timeout in milliseconds (24 hours).
const MAX_READ_TIMEOUT_MS: u64 = 86_400_000;

/// Recognised log levels.
const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a [`LaunchConfig`] from an optional TOML file path.
///
/// * If `path` is `Some`, reads and parses the file.
/// * If `path` is `None`, returns [`LaunchConfig::default()`].
///
/// Environment variable overrides are applied on top in both cases.
pub fn load_config(path: Option<&Path>) -> Result<LaunchConfig, ConfigError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_toml(&content)?
        }
        None => LaunchConfig::default(),
    };
    apply_env_overrides(&mut config)?;
    Ok(config)
}

/// Parse a TOML string into a [`LaunchConfig`].
pub fn parse_toml(content: &str) -> Result<LaunchConfig, ConfigError> {
    toml::from_str::<LaunchConfig>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Env overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides.
///
/// Recognised variables:
/// - `SP_IMPERSONATE_CONSOLE` (`true`/`false`/`1`/`0`)
/// - `SP_LOG_LEVEL`
/// - `SP_READ_TIMEOUT_MS`
/// - `SP_HIDE_WINDOW` (`true`/`false`/`1`/`0`)
pub fn apply_env_overrides(config: &mut LaunchConfig) -> Result<(), ConfigError> {
    apply_overrides_from(config, |key| std::env::var(key).ok())
}

/// Apply overrides read through `lookup` instead of the process environment.
pub fn apply_overrides_from<F>(config: &mut LaunchConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup("SP_IMPERSONATE_CONSOLE") {
        config.impersonate_console = parse_bool("SP_IMPERSONATE_CONSOLE", &val)?;
    }
    if let Some(val) = lookup("SP_LOG_LEVEL") {
        config.log_level = Some(val);
    }
    if let Some(val) = lookup("SP_READ_TIMEOUT_MS") {
        let ms = val.trim().parse::<u64>().map_err(|e| ConfigError::ParseError {
            reason: format!("SP_READ_TIMEOUT_MS: {e}"),
        })?;
        config.read_timeout_ms = Some(ms);
    }
    if let Some(val) = lookup("SP_HIDE_WINDOW") {
        config.hide_window = parse_bool("SP_HIDE_WINDOW", &val)?;
    }
    Ok(())
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::ParseError {
            reason: format!("{key}: expected a boolean, got '{other}'"),
        }),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a parsed configuration, returning advisory warnings.
///
/// Hard errors (unknown log level, out-of-range timeout, merging stderr
/// into an absent stdout) are returned as a
/// [`ConfigError::ValidationError`]; soft issues come back as warnings.
pub fn validate_config(config: &LaunchConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ConfigWarning> = Vec::new();

    if let Some(ref level) = config.log_level
        && !VALID_LOG_LEVELS.contains(&level.as_str())
    {
        errors.push(format!("invalid log_level '{level}'"));
    }

    if let Some(t) = config.read_timeout_ms
        && (t == 0 || t > MAX_READ_TIMEOUT_MS)
    {
        errors.push(format!(
            "read_timeout_ms {t} out of range (1..{MAX_READ_TIMEOUT_MS})"
        ));
    }

    if config.merge_stderr {
        if !config.streams.stdout.is_piped() {
            errors.push("merge_stderr requires stdout to be piped".into());
        }
        if config.streams.stderr == StreamSetting::None {
            errors.push("merge_stderr conflicts with stderr = 'none'".into());
        } else if config.streams.stderr != config.streams.stdout {
            warnings.push(ConfigWarning::MergedStderrIgnored {
                setting: config.streams.stderr,
            });
        }
    }

    if config.resolved_streams().iter().all(|(piped, _)| !piped) {
        warnings.push(ConfigWarning::NoStreamsPiped);
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

fn pick<T: PartialEq>(base: T, overlay: T, default: T) -> T {
    if overlay != default { overlay } else { base }
}

/// Merge two configurations. Values in `overlay` take precedence over
/// `base`; an overlay field still at its default leaves `base` untouched.
pub fn merge_configs(base: LaunchConfig, overlay: LaunchConfig) -> LaunchConfig {
    let d = LaunchConfig::default();
    LaunchConfig {
        impersonate_console: pick(
            base.impersonate_console,
            overlay.impersonate_console,
            d.impersonate_console,
        ),
        streams: StreamsConfig {
            stdin: pick(base.streams.stdin, overlay.streams.stdin, d.streams.stdin),
            stdout: pick(base.streams.stdout, overlay.streams.stdout, d.streams.stdout),
            stderr: pick(base.streams.stderr, overlay.streams.stderr, d.streams.stderr),
        },
        merge_stderr: pick(base.merge_stderr, overlay.merge_stderr, d.merge_stderr),
        hide_window: pick(base.hide_window, overlay.hide_window, d.hide_window),
        read_timeout_ms: overlay.read_timeout_ms.or(base.read_timeout_ms),
        log_level: overlay.log_level.or(base.log_level),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
