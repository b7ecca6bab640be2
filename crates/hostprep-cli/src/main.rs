mod commands;

use clap::{Parser, Subcommand};
use commands::{Session, EXIT_CONFIG_ERROR, EXIT_FAILURE};
use hostprep_preflight::NetworkMode;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "hostprep",
    version,
    about = "Prepare a Linux host to run the hostprep libvirt virtual machine"
)]
struct Cli {
    /// Path to the configuration file (default: $HOSTPREP_CONFIG or ~/.config/hostprep/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Network mode to prepare for: default or vsock (overrides configuration).
    #[arg(long, global = true)]
    network_mode: Option<NetworkMode>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Check the host and fix everything that can be fixed.
    Setup,
    /// Check the host without changing it.
    Check,
    /// Undo every host change hostprep may have made.
    Cleanup {
        /// Do not ask for confirmation.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// List the checks that apply to this host.
    Checks {
        /// List every check cleanup would consider, for any network mode.
        #[arg(long, default_value_t = false)]
        all: bool,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("HOSTPREP_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .init();

    let json_output = cli.json;
    let result = Session::load(cli.config.as_deref(), cli.network_mode).and_then(|session| {
        match cli.command {
            Commands::Setup => commands::setup::run(&session, json_output),
            Commands::Check => commands::check::run(&session, json_output),
            Commands::Cleanup { force } => commands::cleanup::run(&session, force, json_output),
            Commands::Checks { all } => commands::checks::run(&session, all, json_output),
        }
    });

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("config error:") {
                EXIT_CONFIG_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
