// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery server configuration.

use crate::identity::{Identity, Locator, RemoteServerDescriptor};
use crate::security;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::time::Duration;

/// Environment variable names honored by [`ServerConfig::apply_env`].
pub const ENV_LEASE_DURATION: &str = "WAYPOST_LEASE_DURATION";
pub const ENV_ANNOUNCEMENT_PERIOD: &str = "WAYPOST_ANNOUNCEMENT_PERIOD";
pub const ENV_BIND: &str = "WAYPOST_BIND";
pub const ENV_PORT: &str = "WAYPOST_PORT";

/// Discovery server configuration.
///
/// Built once before the server starts and immutable thereafter. The
/// security section is an opaque property bag forwarded verbatim to the
/// security plugins; the core only checks key consistency (see
/// [`crate::security`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// This server's identity prefix.
    #[serde(default = "default_identity")]
    pub identity: Identity,

    /// Participant name advertised in announcements.
    #[serde(default = "default_name")]
    pub name: String,

    /// Locators to bind and advertise (default: 127.0.0.1:11811).
    #[serde(default = "default_listen_locators")]
    pub listen_locators: Vec<Locator>,

    /// Lease duration in seconds: a peer that stays silent this long is
    /// considered lost.
    #[serde(default = "default_lease_duration")]
    pub lease_duration_secs: u64,

    /// Self-announcement period in seconds. Must be strictly shorter
    /// than the lease duration so peers see a renewal before the lease
    /// can expire.
    #[serde(default = "default_announcement_period")]
    pub announcement_period_secs: u64,

    /// Remote discovery servers to federate with.
    #[serde(default)]
    pub remote_servers: Vec<RemoteServerDescriptor>,

    /// Security plugin properties, forwarded verbatim to the security
    /// subsystem.
    #[serde(default)]
    pub security: BTreeMap<String, String>,

    /// Maximum announcement datagram size (bytes).
    #[serde(default = "default_max_datagram_size")]
    pub max_datagram_size: usize,

    /// IP TTL for outgoing announcements.
    #[serde(default = "default_ttl")]
    pub ttl: u32,
}

fn default_identity() -> Identity {
    Identity::from_bytes(*b"waypost-srv0")
}

fn default_name() -> String {
    "discovery-server".to_string()
}

fn default_listen_locators() -> Vec<Locator> {
    vec![Locator::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 11811)]
}

fn default_lease_duration() -> u64 {
    8
}

fn default_announcement_period() -> u64 {
    2
}

fn default_max_datagram_size() -> usize {
    64 * 1024
}

fn default_ttl() -> u32 {
    64
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            identity: default_identity(),
            name: default_name(),
            listen_locators: default_listen_locators(),
            lease_duration_secs: default_lease_duration(),
            announcement_period_secs: default_announcement_period(),
            remote_servers: Vec::new(),
            security: BTreeMap::new(),
            max_datagram_size: default_max_datagram_size(),
            ttl: default_ttl(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))
    }

    /// Apply environment variable overrides on top of file/CLI values.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(secs) = read_env_u64(ENV_LEASE_DURATION)? {
            self.lease_duration_secs = secs;
        }
        if let Some(secs) = read_env_u64(ENV_ANNOUNCEMENT_PERIOD)? {
            self.announcement_period_secs = secs;
        }
        let bind = read_env(ENV_BIND)
            .map(|s| {
                s.parse::<IpAddr>()
                    .map_err(|_| ConfigError::InvalidValue(format!("{}: {}", ENV_BIND, s)))
            })
            .transpose()?;
        let port = read_env(ENV_PORT)
            .map(|s| {
                s.parse::<u16>()
                    .map_err(|_| ConfigError::InvalidValue(format!("{}: {}", ENV_PORT, s)))
            })
            .transpose()?;
        if bind.is_some() || port.is_some() {
            let base = self
                .listen_locators
                .first()
                .copied()
                .unwrap_or_else(|| default_listen_locators()[0]);
            self.listen_locators = vec![Locator::new(
                bind.unwrap_or(base.address),
                port.unwrap_or(base.port),
            )];
        }
        Ok(())
    }

    /// Lease duration as a [`Duration`].
    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_duration_secs)
    }

    /// Announcement period as a [`Duration`].
    pub fn announcement_period(&self) -> Duration {
        Duration::from_secs(self.announcement_period_secs)
    }

    /// Cadence of the lease sweep: half the lease duration, so a lost
    /// peer is detected at most 1.5 leases after its last announcement.
    pub fn sweep_interval(&self) -> Duration {
        self.lease_duration() / 2
    }

    /// Validate configuration invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lease_duration_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "lease_duration_secs cannot be 0".into(),
            ));
        }
        if self.announcement_period_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "announcement_period_secs cannot be 0".into(),
            ));
        }
        if self.announcement_period_secs >= self.lease_duration_secs {
            return Err(ConfigError::InvalidValue(format!(
                "announcement period ({}s) must be shorter than lease duration ({}s)",
                self.announcement_period_secs, self.lease_duration_secs
            )));
        }
        if self.listen_locators.is_empty() {
            return Err(ConfigError::InvalidValue(
                "listen_locators cannot be empty".into(),
            ));
        }
        if self.max_datagram_size == 0 {
            return Err(ConfigError::InvalidValue(
                "max_datagram_size cannot be 0".into(),
            ));
        }
        for remote in &self.remote_servers {
            if remote.prefix == self.identity {
                return Err(ConfigError::SelfFederation(self.identity));
            }
            if remote.locators.is_empty() {
                return Err(ConfigError::InvalidValue(format!(
                    "remote server {} has no locators",
                    remote.prefix
                )));
            }
        }
        for (i, remote) in self.remote_servers.iter().enumerate() {
            if self.remote_servers[..i]
                .iter()
                .any(|r| r.prefix == remote.prefix)
            {
                return Err(ConfigError::InvalidValue(format!(
                    "duplicate remote server {}",
                    remote.prefix
                )));
            }
        }
        security::validate_properties(&self.security)
            .map_err(|e| ConfigError::Security(e.to_string()))?;
        Ok(())
    }
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn read_env_u64(name: &str) -> Result<Option<u64>, ConfigError> {
    read_env(name)
        .map(|s| {
            s.parse::<u64>()
                .map_err(|_| ConfigError::InvalidValue(format!("{}: {}", name, s)))
        })
        .transpose()
}

/// Configuration error types.
#[derive(Debug, Clone)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    InvalidValue(String),
    SelfFederation(Identity),
    Security(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IoError(s) => write!(f, "I/O error: {}", s),
            Self::ParseError(s) => write!(f, "Parse error: {}", s),
            Self::SerializeError(s) => write!(f, "Serialize error: {}", s),
            Self::InvalidValue(s) => write!(f, "Invalid value: {}", s),
            Self::SelfFederation(id) => {
                write!(f, "Remote server list contains own identity {}", id)
            }
            Self::Security(s) => write!(f, "Security properties: {}", s),
        }
    }
}

impl std::error::Error for ConfigError {}
