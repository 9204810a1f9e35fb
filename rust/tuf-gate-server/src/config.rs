//! Command line and environment configuration.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tuf_gate::{DEFAULT_MAX_DEPTH, ServiceConfig};

use crate::repository::ROOT_FILE;

/// Invalid configuration detected before start-up.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The repository path is not a directory
    #[error("repository directory {} does not exist", .0.display())]
    MissingRepository(PathBuf),
    /// The repository has no root metadata
    #[error("repository {} has no root.json", .0.display())]
    MissingRoot(PathBuf),
    /// A refresh interval of zero
    #[error("refresh interval must be at least one second")]
    ZeroRefreshInterval,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "tuf-gate")]
#[command(bin_name = "tuf-gate")]
#[command(about = "Authorize nginx auth_request sub-requests against TUF metadata", long_about = None)]
pub struct Config {
    /// Directory holding root.json, targets.json and delegated role metadata
    #[arg(long = "repo", env = "TUF_REPO_PATH", default_value = "testdata/repository")]
    pub repository: PathBuf,

    /// Address to listen on
    #[arg(long, env = "TUF_GATE_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Delegation depth explored before a path is denied
    #[arg(long, env = "TUF_MAX_DELEGATION_DEPTH", default_value_t = DEFAULT_MAX_DEPTH)]
    pub max_delegation_depth: usize,

    /// Seconds between metadata reloads; reloads happen on SIGHUP only when unset
    #[arg(long, env = "TUF_REFRESH_INTERVAL")]
    pub refresh_interval: Option<u64>,
}

impl Config {
    /// Check that the configuration can start a server.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.repository.is_dir() {
            return Err(ConfigError::MissingRepository(self.repository.clone()));
        }
        if !self.repository.join(ROOT_FILE).is_file() {
            return Err(ConfigError::MissingRoot(self.repository.clone()));
        }
        if self.refresh_interval == Some(0) {
            return Err(ConfigError::ZeroRefreshInterval);
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval.map(Duration::from_secs)
    }

    pub fn service(&self) -> ServiceConfig {
        ServiceConfig {
            max_depth: self.max_delegation_depth,
        }
    }
}
