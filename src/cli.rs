// ABOUTME: Command-line arguments for the tether binary.
// ABOUTME: Flags given here override the loaded configuration file.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tether_core::config::{Config, LogFormat};

#[derive(Parser, Debug)]
#[command(name = "tether", version, about = "Talk to a remote coding agent")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Attach to an existing agent session and open an interactive console
    Connect(ConnectArgs),
}

#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Session id assigned when the session was created
    pub session_id: String,

    /// Backend host[:port]
    #[arg(long)]
    pub host: Option<String>,

    /// Use wss:// instead of ws://
    #[arg(long)]
    pub secure: bool,

    /// Derive the channel scheme and host from an http(s) origin
    #[arg(long, conflicts_with_all = ["host", "secure"])]
    pub origin: Option<String>,

    /// Config file to use instead of the default search
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long)]
    pub json_logs: bool,
}

impl ConnectArgs {
    /// Load configuration and layer these flags over it
    pub fn resolve_config(&self) -> anyhow::Result<Config> {
        let mut config = Config::read(self.config.as_deref())?;
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
            config.server.origin = None;
        }
        if self.secure {
            config.server.secure = true;
            config.server.origin = None;
        }
        if let Some(origin) = &self.origin {
            config.server.origin = Some(origin.clone());
        }
        if self.json_logs {
            config.logging.format = LogFormat::Json;
        }
    }
}
