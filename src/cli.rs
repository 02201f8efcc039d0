//! Command-line arguments for the standalone `replserver` binary
//!
//! Flags override values from `--config`, which override built-in defaults.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::{validate_port, ServerConfig};
use crate::error::Result;

/// REPL server over TCP
#[derive(Parser, Debug)]
#[command(name = "replserver")]
#[command(about = "Serve an interactive expression REPL over TCP")]
#[command(version)]
pub struct Cli {
    /// Port to listen on (1-65535)
    #[arg(short, long, env = "REPLSERVER_PORT")]
    pub port: Option<i64>,

    /// Host address to bind to
    #[arg(long, env = "REPLSERVER_HOST")]
    pub host: Option<IpAddr>,

    /// TOML configuration file
    #[arg(short, long, env = "REPLSERVER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Prompt written before each request
    #[arg(long)]
    pub prompt: Option<String>,

    /// Seconds an evaluation may run before it is abandoned
    #[arg(long, value_name = "SECS")]
    pub eval_timeout: Option<u64>,

    /// Show debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Resolve the effective server configuration
    pub fn server_config(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::default(),
        };

        if let Some(port) = self.port {
            config.listen_port = validate_port(port)?;
        }
        if let Some(host) = self.host {
            config = config.bind_host(host);
        }
        if let Some(prompt) = &self.prompt {
            config = config.prompt(prompt.clone());
        }
        if let Some(secs) = self.eval_timeout {
            config = config.eval_timeout(Duration::from_secs(secs));
        }

        config.validate()?;
        Ok(config)
    }
}
