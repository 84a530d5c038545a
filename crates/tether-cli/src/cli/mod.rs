//! CLI entry and dispatch.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tether_core::config::Config;
use tether_core::interrupt;

use crate::modes::OutputFormat;

mod commands;

#[derive(Parser)]
#[command(name = "tether")]
#[command(version = "0.1")]
#[command(about = "Interactive line client with heartbeat keep-alive")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    session: SessionArgs,
}

/// Connection arguments; each one overrides the matching config value.
#[derive(clap::Args, Debug, Clone, Default)]
struct SessionArgs {
    /// Peer host name or address
    #[arg(long, env = "TETHER_HOST")]
    host: Option<String>,

    /// Peer TCP port
    #[arg(short, long, env = "TETHER_PORT", value_parser = clap::value_parser!(u16).range(1..))]
    port: Option<u16>,

    /// Seconds without outbound traffic before a heartbeat is sent
    #[arg(long, value_name = "SECS")]
    heartbeat_interval: Option<f64>,

    /// Never send heartbeats
    #[arg(long = "no-heartbeat", conflicts_with = "heartbeat_interval")]
    no_heartbeat: bool,

    /// Operator command that ends the session
    #[arg(long, value_name = "WORD")]
    quit_keyword: Option<String>,

    /// How session events are printed
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    /// Config file to use instead of $TETHER_HOME/config.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

impl SessionArgs {
    /// Loads the config file and applies command-line overrides.
    fn resolve_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load_from(path),
            None => Config::load(),
        }
        .context("load config")?;

        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(secs) = self.heartbeat_interval {
            config.heartbeat_interval_secs = secs;
        }
        if self.no_heartbeat {
            config.heartbeat_interval_secs = 0.0;
        }
        if let Some(keyword) = &self.quit_keyword {
            config.quit_keyword.clone_from(keyword);
        }

        config.validate().context("invalid command-line options")?;
        Ok(config)
    }
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
    /// Print a fresh config generated from built-in defaults
    Generate,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    interrupt::init();

    // The session is a single logical thread of control.
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    let Cli { command, session } = cli;

    // default to an interactive session
    let Some(command) = command else {
        let config = session.resolve_config()?;
        return commands::connect::run(&config, session.output).await;
    };

    match command {
        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
            ConfigCommands::Generate => commands::config::generate(),
        },
    }
}
