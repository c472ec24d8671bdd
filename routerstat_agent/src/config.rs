//! Agent configuration: defaults, then an optional TOML file, then CLI/env.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 9999;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub bind_address: String,
    pub port: u16,
    /// Time between pushes.
    pub interval_ms: u64,
    /// Interface whose byte counters are reported.
    pub interface: String,
    /// Key under "bandwidth" in the payload.
    pub label: String,
    pub proc_root: PathBuf,
    pub handshake_timeout_ms: u64,
    pub write_timeout_ms: u64,
    /// Largest client frame accepted before the session is dropped.
    pub max_inbound_frame: u64,
    /// Re-read /proc/net/dev on every lookup instead of caching the first read.
    pub netdev_auto_update: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            interval_ms: 500,
            interface: "eth0".into(),
            label: "wan".into(),
            proc_root: PathBuf::from("/proc"),
            handshake_timeout_ms: 5_000,
            write_timeout_ms: 5_000,
            max_inbound_frame: 64 * 1024,
            netdev_auto_update: true,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            anyhow::bail!("interval_ms must be greater than zero");
        }
        if self.interface.trim().is_empty() {
            anyhow::bail!("interface must not be empty");
        }
        if self.label.trim().is_empty() {
            anyhow::bail!("label must not be empty");
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

#[derive(Parser, Debug, Default)]
#[command(version)]
#[command(about = "Push uptime, load, memory and bandwidth to a WebSocket client", long_about = None)]
pub struct CliArgs {
    /// TOML configuration file
    #[arg(short, long, env = "ROUTERSTAT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long, env = "ROUTERSTAT_BIND")]
    pub bind: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "ROUTERSTAT_PORT")]
    pub port: Option<u16>,

    /// Push interval in milliseconds
    #[arg(short = 'n', long, env = "ROUTERSTAT_INTERVAL_MS")]
    pub interval_ms: Option<u64>,

    /// Interface to report bandwidth for
    #[arg(short, long, env = "ROUTERSTAT_INTERFACE")]
    pub interface: Option<String>,

    /// Name of the interface in the payload
    #[arg(short, long, env = "ROUTERSTAT_LABEL")]
    pub label: Option<String>,

    /// procfs mount point
    #[arg(long, env = "ROUTERSTAT_PROC_ROOT")]
    pub proc_root: Option<PathBuf>,
}

impl CliArgs {
    /// Loads the file named by `--config` (if any) and layers flags on top.
    pub fn resolve(&self) -> Result<Config> {
        let base = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        let config = self.apply(base);
        config.validate()?;
        Ok(config)
    }

    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(v) = &self.bind {
            config.bind_address = v.clone();
        }
        if let Some(v) = self.port {
            config.port = v;
        }
        if let Some(v) = self.interval_ms {
            config.interval_ms = v;
        }
        if let Some(v) = &self.interface {
            config.interface = v.clone();
        }
        if let Some(v) = &self.label {
            config.label = v.clone();
        }
        if let Some(v) = &self.proc_root {
            config.proc_root = v.clone();
        }
        config
    }
}
