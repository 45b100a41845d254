// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

mod commands;
#[cfg_attr(not(windows), allow(dead_code))]
mod format;
#[cfg_attr(not(windows), allow(dead_code))]
mod forward;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "spr", version, about = "Run a child process with scriptable standard streams")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start a child, forward stdin to it and print its output.
    Run {
        /// Make the child see its pipes as a console (line-buffered output).
        #[arg(long)]
        impersonate_console: bool,

        /// Send the child's stderr through its stdout pipe.
        #[arg(long)]
        merge_stderr: bool,

        /// Launch configuration file (TOML).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Prefix every forwarded line with a timestamp and stream name.
        #[arg(long)]
        timestamps: bool,

        /// Command line to run.
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },

    /// Validate a launch configuration file and print warnings.
    CheckConfig {
        /// Path to the TOML file.
        path: PathBuf,
    },
}

fn init_tracing(debug: bool, json: bool, level: Option<&str>) {
    let filter = if debug {
        EnvFilter::new("sp=debug")
    } else {
        EnvFilter::new(format!("sp={}", level.unwrap_or("info")))
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::CheckConfig { path } => {
            init_tracing(cli.debug, cli.json_logs, None);
            commands::cmd_check_config(&path)
        }
        Commands::Run {
            impersonate_console,
            merge_stderr,
            config,
            timestamps,
            command,
        } => {
            let (config, warnings) =
                commands::resolve_config(config.as_deref(), impersonate_console, merge_stderr)?;
            init_tracing(cli.debug, cli.json_logs, config.log_level.as_deref());
            for w in &warnings {
                tracing::warn!(target: "sp.cli", "{w}");
            }
            let code = commands::cmd_run(&config, &command, timestamps).await?;
            std::process::exit(code);
        }
    }
}
