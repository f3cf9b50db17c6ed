//! Service discovery configuration module
//!
//! This module defines configuration structures for the coordination store client,
//! the local registrations and the watched paths.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_SERVER: &str = "localhost:2181";
pub const DEFAULT_SCHEME: &str = "http";
pub const DEFAULT_ADDRESS: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SERVICE_NAME: &str = "test";
pub const DEFAULT_PATH: &str = "/xmidt";

/// One local endpoint to advertise in the coordination store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// URL scheme of the advertised endpoint
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Host name or IP address other peers should connect to
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Logical service name
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Parent path the registration is created under
    #[serde(default = "default_path")]
    pub path: String,
}

fn default_scheme() -> String {
    DEFAULT_SCHEME.to_string()
}

fn default_address() -> String {
    DEFAULT_ADDRESS.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_string()
}

fn default_path() -> String {
    DEFAULT_PATH.to_string()
}

impl Default for Registration {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            address: default_address(),
            port: default_port(),
            name: default_service_name(),
            path: default_path(),
        }
    }
}

impl Registration {
    /// Create a registration with default scheme, name and path
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Validate a single registration
    pub fn validate(&self) -> Result<()> {
        if self.scheme.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "Registration for {}:{} has an empty scheme",
                self.address,
                self.port
            ));
        }

        if self.address.trim().is_empty() {
            return Err(anyhow::anyhow!("Registration address cannot be empty"));
        }

        if self.port == 0 {
            return Err(anyhow::anyhow!(
                "Registration for {} must have a non-zero port",
                self.address
            ));
        }

        if !self.path.starts_with('/') {
            return Err(anyhow::anyhow!(
                "Registration path '{}' must start with '/'",
                self.path
            ));
        }

        Ok(())
    }
}

/// Coordination store options, typically read from the service's configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    /// Coordination store server addresses
    #[serde(default = "default_servers")]
    pub servers: Vec<String>,
    /// Connection timeout
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    /// Session timeout
    #[serde(default = "default_session_timeout")]
    pub session_timeout: Duration,
    /// Local endpoints to advertise
    #[serde(default)]
    pub registrations: Vec<Registration>,
    /// Paths to watch for remote instances
    #[serde(default)]
    pub watches: Vec<String>,
}

fn default_servers() -> Vec<String> {
    vec![DEFAULT_SERVER.to_string()]
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_session_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for Options {
    fn default() -> Self {
        Self {
            servers: default_servers(),
            connect_timeout: default_connect_timeout(),
            session_timeout: default_session_timeout(),
            registrations: Vec::new(),
            watches: Vec::new(),
        }
    }
}

impl Options {
    /// True when there is nothing to register and nothing to watch
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty() && self.watches.is_empty()
    }

    pub fn with_servers<I, S>(mut self, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.servers = servers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_registration(mut self, registration: Registration) -> Self {
        self.registrations.push(registration);
        self
    }

    pub fn with_watch(mut self, path: impl Into<String>) -> Self {
        self.watches.push(path.into());
        self
    }

    /// Validate the service discovery configuration
    pub fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            return Err(anyhow::anyhow!(
                "At least one coordination store server must be configured"
            ));
        }

        if let Some(server) = self.servers.iter().find(|s| s.trim().is_empty()) {
            return Err(anyhow::anyhow!("Invalid server address: '{}'", server));
        }

        if self.connect_timeout.is_zero() {
            return Err(anyhow::anyhow!("Connect timeout must be greater than zero"));
        }

        if self.session_timeout.is_zero() {
            return Err(anyhow::anyhow!("Session timeout must be greater than zero"));
        }

        for registration in &self.registrations {
            registration.validate()?;
        }

        for path in &self.watches {
            if !path.starts_with('/') {
                return Err(anyhow::anyhow!("Watch path '{}' must start with '/'", path));
            }
        }

        Ok(())
    }
}
