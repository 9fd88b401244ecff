//! portclaim CLI - Free a preferred port before starting a service
//!
//! A command-line tool for probing ports, finding who holds them,
//! reclaiming them and launching services on the result.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{AcquireArgs, LaunchArgs, EXIT_CONFIG};

#[derive(Parser)]
#[command(name = "portclaim")]
#[command(author, version, about = "Free a preferred port before starting a service")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Config file (default: ~/.portclaim/config.json)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// More logging on stderr (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire the preferred port, reclaiming or falling back as configured
    Acquire(AcquireArgs),

    /// Acquire a port, then start a service on it detached
    Launch(LaunchArgs),

    /// Check whether a port can be bound right now
    Probe {
        port: u16,

        /// Interface to probe
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// List the processes listening on a port
    Owners { port: u16 },

    /// Show the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = match commands::load_config(cli.config.clone()).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let outcome = match cli.command {
        Commands::Acquire(args) => {
            args.apply(&mut config);
            commands::acquire::run(&config, args.timeout(), cli.json).await
        }
        Commands::Launch(args) => {
            args.acquire.apply(&mut config);
            commands::launch::run(&mut config, &args, cli.json).await
        }
        Commands::Probe { port, host } => commands::probe::run(&host, port, cli.json).await,
        Commands::Owners { port } => commands::owners::run(port, cli.json).await,
        Commands::Config { save: false } => {
            commands::config::show(&config, cli.config.as_deref(), cli.json)
        }
        Commands::Config { save: true } => match commands::config_store(cli.config.clone()) {
            Ok(store) => commands::config::save(&config, &store, cli.json).await,
            Err(e) => Err(e),
        },
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
