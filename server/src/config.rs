//! Server configuration.
//!
//! Read from an optional TOML file; command line flags override single
//! fields afterwards.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use stixgraph_model::{Capability, User};
use stixgraph_types::UserId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("duplicate token for user {0}")]
    DuplicateToken(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    pub enabled: bool,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// A user allowed to call the API, and the bearer token identifying them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserConfig {
    /// Stable id; a random one is assigned when omitted.
    #[serde(default)]
    pub id: Option<UserId>,
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub token: String,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
}

impl UserConfig {
    pub fn to_user(&self) -> User {
        let mut user = User::new(&self.name, &self.email)
            .with_capabilities(self.capabilities.iter().copied());
        if let Some(id) = self.id {
            user.id = id;
        }
        user
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    /// SQLite file, or `:memory:`.
    pub database: String,
    pub bus_capacity: usize,
    pub log_format: LogFormat,
    pub exporter: ExporterConfig,
    pub users: Vec<UserConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 4000)),
            database: "stixgraph.db".to_string(),
            bus_capacity: 256,
            log_format: LogFormat::default(),
            exporter: ExporterConfig::default(),
            users: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.check_tokens()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    fn check_tokens(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for user in &self.users {
            if !seen.insert(user.token.as_str()) {
                return Err(ConfigError::DuplicateToken(user.name.clone()));
            }
        }
        Ok(())
    }

    /// Adds an admin with a fresh token when no user is configured and
    /// returns it, so the caller can print the token.
    pub fn ensure_admin(&mut self) -> Option<&UserConfig> {
        if !self.users.is_empty() {
            return None;
        }
        self.users.push(UserConfig {
            id: None,
            name: "admin".to_string(),
            email: "admin@stixgraph.local".to_string(),
            token: uuid::Uuid::new_v4().simple().to_string(),
            capabilities: vec![Capability::Admin],
        });
        self.users.last()
    }
}

/// The user the in-process exporter pushes files as.
pub fn exporter_identity() -> User {
    User::new("exporter", "exporter@stixgraph.local").with_capabilities([Capability::Export])
}
