//! Server configuration
//!
//! Configuration can be built in code, loaded from a TOML file, or assembled
//! by the binary from command-line flags. Ports are validated everywhere they
//! enter the system so a `ServerConfig` always holds a usable port.
//!
//! ```toml
//! listen_port = 5061
//! bind_host = "0.0.0.0"
//! prompt = "REPL> "
//! banner = "Welcome to the REPL Server"
//! eval_timeout_secs = 10
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ReplError, Result};

/// Port used when none is configured
pub const DEFAULT_PORT: u16 = 5051;
/// Prompt written after connecting and after every response
pub const DEFAULT_PROMPT: &str = "REPL> ";
/// First line written to every new connection
pub const DEFAULT_BANNER: &str = "Welcome to the REPL Server";
/// Upper bound on a single evaluation
pub const DEFAULT_EVAL_TIMEOUT_SECS: u64 = 10;

/// Check that `port` lies in 1..=65535
pub fn validate_port(port: i64) -> Result<u16> {
    if (1..=i64::from(u16::MAX)).contains(&port) {
        Ok(port as u16)
    } else {
        Err(ReplError::invalid_config(format!(
            "listen port {} is outside 1-65535",
            port
        )))
    }
}

/// Configuration of one REPL server instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// TCP port to listen on
    pub listen_port: u16,
    /// Interface address to bind
    pub bind_host: IpAddr,
    /// Prompt string (no trailing newline is added)
    pub prompt: String,
    /// Greeting line; empty disables it
    pub banner: String,
    /// Seconds an evaluation may run before the client gets a timeout error
    pub eval_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_PORT,
            bind_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            prompt: DEFAULT_PROMPT.to_string(),
            banner: DEFAULT_BANNER.to_string(),
            eval_timeout_secs: DEFAULT_EVAL_TIMEOUT_SECS,
        }
    }
}

impl ServerConfig {
    /// Default configuration listening on `port`
    pub fn with_port(port: i64) -> Result<Self> {
        Ok(Self {
            listen_port: validate_port(port)?,
            ..Self::default()
        })
    }

    pub fn bind_host(mut self, host: IpAddr) -> Self {
        self.bind_host = host;
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn banner(mut self, banner: impl Into<String>) -> Self {
        self.banner = banner.into();
        self
    }

    pub fn eval_timeout(mut self, timeout: Duration) -> Self {
        self.eval_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn eval_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.eval_timeout_secs)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_host, self.listen_port)
    }

    /// Reject values that cannot produce a working server
    pub fn validate(&self) -> Result<()> {
        validate_port(i64::from(self.listen_port))?;
        if self.eval_timeout_secs == 0 {
            return Err(ReplError::invalid_config(
                "eval_timeout_secs must be at least 1",
            ));
        }
        if self.prompt.contains('\n') || self.banner.contains('\n') {
            return Err(ReplError::invalid_config(
                "prompt and banner must be single lines",
            ));
        }
        Ok(())
    }

    /// Parse configuration from TOML text; missing keys take defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ReplError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ReplError::Config {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&text)
    }
}
