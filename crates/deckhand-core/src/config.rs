// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for deckhand.

use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::path::PathBuf;

/// Deckhand configuration loaded from environment variables.
///
/// The configs/secrets paths come in pairs: the path the control plane
/// writes to, and the host-visible path used for worker bind mounts. The
/// two differ only when the control plane itself runs inside a container;
/// the host-side variables default to the write-side values.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP API bind address
    pub http_addr: SocketAddr,
    /// Image reference for dashboard workers
    pub worker_image: String,
    /// Host name used in dashboard URLs returned to clients
    pub public_host: String,
    /// Directory where per-instance config artifacts are written
    pub configs_dir: PathBuf,
    /// Host-visible path of `configs_dir`, used for bind mounts
    pub host_configs_dir: PathBuf,
    /// Shared secrets artifact, created once with a placeholder
    pub secrets_file: PathBuf,
    /// Host-visible path of `secrets_file`, used for bind mounts
    pub host_secrets_file: PathBuf,
    /// Pool of host ports assignable to workers
    pub port_range: RangeInclusive<u16>,
    /// Docker CLI binary used by the Docker backend
    pub docker_bin: String,
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

fn env_port(var: &'static str, default: u16) -> Result<u16, ConfigError> {
    match std::env::var(var) {
        Ok(v) => v.parse().map_err(|_| ConfigError::InvalidPort(var)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_port = env_port("DECKHAND_HTTP_PORT", 8000)?;
        let http_addr = SocketAddr::from(([0, 0, 0, 0], http_port));

        let worker_image = env_or("DECKHAND_WORKER_IMAGE", "deckhand-dashboard");
        let public_host = env_or("DECKHAND_PUBLIC_HOST", "localhost");

        let configs_dir = PathBuf::from(env_or("DECKHAND_CONFIGS_DIR", ".data/configs"));
        let host_configs_dir = std::env::var("DECKHAND_HOST_CONFIGS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| configs_dir.clone());

        let secrets_file =
            PathBuf::from(env_or("DECKHAND_SECRETS_FILE", ".data/secrets/secrets.env"));
        let host_secrets_file = std::env::var("DECKHAND_HOST_SECRETS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| secrets_file.clone());

        let default_range = crate::ports::DEFAULT_PORT_RANGE;
        let range_start = env_port("DECKHAND_PORT_RANGE_START", *default_range.start())?;
        let range_end = env_port("DECKHAND_PORT_RANGE_END", *default_range.end())?;
        if range_start > range_end {
            return Err(ConfigError::InvalidPortRange);
        }

        let docker_bin = env_or("DECKHAND_DOCKER_BIN", "docker");

        Ok(Self {
            http_addr,
            worker_image,
            public_host,
            configs_dir,
            host_configs_dir,
            secrets_file,
            host_secrets_file,
            port_range: range_start..=range_end,
            docker_bin,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A port-valued environment variable did not parse.
    #[error("Invalid port number in {0}")]
    InvalidPort(&'static str),
    /// The configured port range is empty.
    #[error("Port range start exceeds end")]
    InvalidPortRange,
}
