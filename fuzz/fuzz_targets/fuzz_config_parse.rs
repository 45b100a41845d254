// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fuzz LaunchConfig TOML parsing, validation and stream resolution.
//!
//! Feeds arbitrary byte strings through `parse_toml`, verifying:
//! 1. `parse_toml` and `validate_config` never panic.
//! 2. Round-trip: serialize back to TOML and re-parse produces the same config.
//! 3. Merged stderr mirrors stdout in the resolved streams.
//! 4. An accepted config is internally consistent: merged stderr rides a
//!    piped stdout, the read timeout is in range, and the `NoStreamsPiped`
//!    warning appears exactly when no resolved stream is piped.
//! 5. A neutral overlay leaves a config unchanged under `merge_configs`.
//! 6. The inheritance plan built from the resolved streams puts each
//!    piped stream's side-buffer entry on its own descriptor.
#![no_main]
use libfuzzer_sys::fuzz_target;
use sp_config::{ConfigWarning, LaunchConfig};
use sp_winapi::{CONSOLE_DEVICE, CrtHandleBuffer, InheritancePlan};

fuzz_target!(|data: &[u8]| {
    let s = match std::str::from_utf8(data) {
        Ok(s) => s,
        Err(_) => return,
    };

    // --- Property 1: parse and validate never panic ---
    let config = match sp_config::parse_toml(s) {
        Ok(c) => c,
        Err(_) => return,
    };
    let validated = sp_config::validate_config(&config);

    // --- Property 2: round-trip through TOML serialization ---
    if let Ok(toml_str) = toml::to_string(&config)
        && let Ok(rt) = sp_config::parse_toml(&toml_str)
    {
        assert_eq!(config, rt, "TOML round-trip must be lossless");
    }
    if let Ok(json) = serde_json::to_string(&config) {
        let _ = serde_json::from_str::<LaunchConfig>(&json);
    }

    // --- Property 3: merged stderr mirrors stdout ---
    let resolved = config.resolved_streams();
    let [_, stdout, stderr] = resolved;
    if config.merge_stderr {
        assert_eq!(stdout, stderr);
    }

    // --- Property 4: accepted configs are consistent ---
    match validated {
        Ok(warnings) => {
            if config.merge_stderr {
                assert!(stdout.0, "merged stderr accepted without a piped stdout");
            }
            if let Some(t) = config.read_timeout_ms {
                assert!(t > 0);
                assert_eq!(config.read_timeout().map(|d| d.as_millis()), Some(u128::from(t)));
            }
            let none_piped = resolved.iter().all(|(piped, _)| !piped);
            let warned = warnings.contains(&ConfigWarning::NoStreamsPiped);
            assert_eq!(none_piped, warned);
            for w in &warnings {
                if matches!(w, ConfigWarning::MergedStderrIgnored { .. }) {
                    assert!(config.merge_stderr);
                }
                let _ = format!("{w}");
            }
        }
        Err(e) => {
            let _ = format!("{e}");
        }
    }

    // --- Property 5: a neutral overlay changes nothing ---
    let neutral = LaunchConfig {
        log_level: None,
        ..LaunchConfig::default()
    };
    assert_eq!(sp_config::merge_configs(config.clone(), neutral), config);

    // --- Property 6: descriptor slots survive planning ---
    let handles = [4usize, 8, if config.merge_stderr { 8 } else { 12 }];
    let slots = resolved
        .iter()
        .zip(handles)
        .map(|(&(piped, console), h)| piped.then_some((h, console)));
    let plan = InheritancePlan::from_streams(slots).expect("distinct valid handles");
    if let Some(buf) = plan.crt_buffer().expect("three entries always fit") {
        let fds = CrtHandleBuffer::decode(buf.as_bytes()).expect("own encoding decodes");
        for (fd, (flag, handle)) in fds.iter().enumerate() {
            let (piped, console) = resolved[fd];
            if piped {
                assert_eq!(*handle, handles[fd]);
                if console {
                    assert_eq!(*flag, CONSOLE_DEVICE);
                }
            } else {
                assert_eq!(*flag, 0);
            }
        }
    }
});
