// blelink: Bluetooth LE link session CLI
//
// Manages the persisted link settings and replays scripted central and
// peripheral sessions against the recording radio.

mod config;
mod simulate;

use anyhow::{Context, Result};
use blelink_core::DisconnectPolicy;
use clap::{Parser, Subcommand};
use colored::*;
use config::Config;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "blelink")]
#[command(about = "blelink: Bluetooth LE link sessions", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of the platform default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure link settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Replay a scripted session against the recording radio
    Simulate {
        #[command(subcommand)]
        role: SimulateRole,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the default configuration
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    Set { key: String, value: String },
    Get { key: String },
    List,
    /// Print the config file location
    Path,
}

#[derive(Subcommand)]
enum SimulateRole {
    /// Scan for the configured service name and exchange data
    Central {
        /// Advertised name of the simulated target (defaults to the service name)
        #[arg(short, long)]
        name: Option<String>,
        /// Simulate the location service being switched off
        #[arg(long)]
        location_off: bool,
    },
    /// Advertise the configured service and serve simulated peers
    Peripheral {
        /// Number of peers to connect
        #[arg(short, long)]
        peers: Option<usize>,
        /// Tear down and re-advertise when a peer drops
        #[arg(long)]
        restart_on_drop: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    let config_path = match cli.config {
        Some(path) => path,
        None => Config::config_file()?,
    };
    tracing::debug!("Using config file {}", config_path.display());

    match cli.command {
        Commands::Config { action } => cmd_config(&config_path, action),
        Commands::Simulate { role } => cmd_simulate(&config_path, role),
    }
}

fn cmd_config(path: &Path, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                println!(
                    "{} Config already exists at {}",
                    "⚠".yellow(),
                    path.display()
                );
                println!("  Use {} to overwrite", "--force".bright_cyan());
                return Ok(());
            }
            Config::default().save_to(path)?;
            println!("{} Wrote default config to {}", "✓".green(), path.display());
        }

        ConfigAction::Set { key, value } => {
            let mut config = Config::load_from(path)?;
            config.set(&key, &value)?;
            config.save_to(path)?;
            println!("{} Set {} = {}", "✓".green(), key.bright_cyan(), value);
        }

        ConfigAction::Get { key } => {
            let config = Config::load_from(path)?;
            if let Some(value) = config.get(&key) {
                println!("{} = {}", key.bright_cyan(), value);
            } else {
                anyhow::bail!("Unknown config key: {}", key);
            }
        }

        ConfigAction::List => {
            let config = Config::load_from(path)?;
            println!("{}", "Configuration".bold());
            println!();

            for (key, value) in config.list() {
                println!("  {:<20} {}", key.bright_cyan(), value);
            }
        }

        ConfigAction::Path => {
            println!("{}", path.display());
        }
    }

    Ok(())
}

fn cmd_simulate(path: &Path, role: SimulateRole) -> Result<()> {
    let config = Config::load_from(path).context("Failed to load config")?;
    let mut settings = config.link.clone();

    match role {
        SimulateRole::Central { name, location_off } => {
            simulate::run_central(&settings, name, location_off)
        }
        SimulateRole::Peripheral {
            peers,
            restart_on_drop,
        } => {
            if restart_on_drop {
                settings.disconnect_policy = DisconnectPolicy::RestartSession;
            }
            simulate::run_peripheral(&settings, peers.unwrap_or(config.simulated_peers))
        }
    }
}
