// ABOUTME: Immutable service configuration built once at startup
// ABOUTME: Holds listener address, basic-auth credentials, and store connection settings

use anyhow::{bail, Result};
use std::fmt;
use std::net::SocketAddr;

/// Catalog database every store connection opens against.
pub const CATALOG_DATABASE: &str = "information_schema";

/// Connection settings for the MySQL server.
#[derive(Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// HTTP basic-auth credentials every client must present.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

impl AuthConfig {
    /// Build from optional listen credentials.
    ///
    /// Auth is enabled only when both halves are present. Supplying only
    /// one of them is rejected rather than silently running open.
    pub fn from_parts(username: Option<String>, password: Option<String>) -> Result<Option<Self>> {
        match (username, password) {
            (Some(username), Some(password)) => Ok(Some(Self { username, password })),
            (None, None) => Ok(None),
            (Some(_), None) => bail!("--listen-username requires --listen-password"),
            (None, Some(_)) => bail!("--listen-password requires --listen-username"),
        }
    }

    pub fn matches(&self, username: &str, password: &str) -> bool {
        self.username == username && self.password == password
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything the service needs, read-only after startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub auth: Option<AuthConfig>,
    pub database: DatabaseConfig,
}
