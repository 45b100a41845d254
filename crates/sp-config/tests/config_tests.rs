// SPDX-License-Identifier: MIT OR Apache-2.0
//! Loading and validation tests for `sp-config`.

use sp_config::{
    ConfigError, ConfigWarning, LaunchConfig, StreamSetting, StreamsConfig, load_config,
    merge_configs, parse_toml, validate_config,
};
use std::io::Write;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(content.as_bytes()).unwrap();
    f
}

fn validation_reasons(err: ConfigError) -> Vec<String> {
    match err {
        ConfigError::ValidationError { reasons } => reasons,
        other => panic!("expected ValidationError, got {other:?}"),
    }
}

// ===========================================================================
// 1. Files on disk
// ===========================================================================

#[test]
fn console_pipe_config_loads() {
    let f = write_config(
        r#"
        [streams]
        stdout = "console_pipe"
        stderr = "console_pipe"
        "#,
    );
    let cfg = load_config(Some(f.path())).unwrap();
    assert_eq!(cfg.resolved_streams()[1], (true, true));
    assert_eq!(cfg.resolved_streams()[0], (true, false));
}

#[test]
fn malformed_file_is_parse_error() {
    let f = write_config("merge_stderr = ");
    assert!(matches!(
        load_config(Some(f.path())),
        Err(ConfigError::ParseError { .. })
    ));
}

#[test]
fn unknown_fields_are_ignored() {
    let cfg = parse_toml("future_knob = 3\nmerge_stderr = true").unwrap();
    assert!(cfg.merge_stderr);
}

// ===========================================================================
// 2. Validation
// ===========================================================================

#[test]
fn every_log_level_is_accepted() {
    for level in ["error", "warn", "info", "debug", "trace"] {
        let cfg = LaunchConfig {
            log_level: Some(level.into()),
            ..Default::default()
        };
        validate_config(&cfg).unwrap_or_else(|e| panic!("{level}: {e}"));
    }
}

#[test]
fn errors_are_collected_together() {
    let cfg = LaunchConfig {
        log_level: Some("loud".into()),
        read_timeout_ms: Some(86_400_001),
        ..Default::default()
    };
    let reasons = validation_reasons(validate_config(&cfg).unwrap_err());
    assert_eq!(reasons.len(), 2, "{reasons:?}");
}

#[test]
fn merged_stderr_with_different_setting_warns() {
    let cfg = LaunchConfig {
        merge_stderr: true,
        streams: StreamsConfig {
            stderr: StreamSetting::ConsolePipe,
            ..Default::default()
        },
        ..Default::default()
    };
    let warnings = validate_config(&cfg).unwrap();
    assert_eq!(
        warnings,
        vec![ConfigWarning::MergedStderrIgnored {
            setting: StreamSetting::ConsolePipe
        }]
    );
    assert!(warnings[0].to_string().contains("console_pipe"));
}

#[test]
fn merge_requires_piped_stdout() {
    let cfg = LaunchConfig {
        merge_stderr: true,
        streams: StreamsConfig {
            stdout: StreamSetting::None,
            stderr: StreamSetting::None,
            ..Default::default()
        },
        ..Default::default()
    };
    let reasons = validation_reasons(validate_config(&cfg).unwrap_err());
    assert!(reasons.iter().any(|r| r.contains("stdout")));
}

// ===========================================================================
// 3. Merging
// ===========================================================================

#[test]
fn overlay_stream_settings_replace_base() {
    let base = parse_toml("[streams]\nstdin = \"none\"").unwrap();
    let overlay = parse_toml("[streams]\nstdout = \"console_pipe\"").unwrap();
    let merged = merge_configs(base, overlay);
    assert_eq!(merged.streams.stdin, StreamSetting::None);
    assert_eq!(merged.streams.stdout, StreamSetting::ConsolePipe);
    assert_eq!(merged.streams.stderr, StreamSetting::Pipe);
}

#[test]
fn merging_defaults_is_identity() {
    let cfg = parse_toml("impersonate_console = true\nread_timeout_ms = 10").unwrap();
    let merged = merge_configs(cfg.clone(), LaunchConfig::default());
    assert_eq!(merged.impersonate_console, cfg.impersonate_console);
    assert_eq!(merged.read_timeout_ms, cfg.read_timeout_ms);
}
