//! Core traits and types for service discovery
//!
//! This module defines the seam between the environment builder and a coordination
//! store client, along with the shared record/event types and error handling.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::Stream;

/// Service discovery error types
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Connection to coordination store [{servers}] failed: {message}")]
    ConnectFailed { servers: String, message: String },

    #[error("Instancer creation failed for path {path}: {message}")]
    InstancerCreationFailed { path: String, message: String },

    #[error("Coordination store backend error: {0}")]
    BackendError(String),

    #[error("Client stop failed: {0}")]
    StopFailed(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl DiscoveryError {
    pub fn connect_failed(servers: &[String], message: impl Into<String>) -> Self {
        DiscoveryError::ConnectFailed {
            servers: servers.join(","),
            message: message.into(),
        }
    }

    pub fn instancer_creation_failed(path: &str, message: impl Into<String>) -> Self {
        DiscoveryError::InstancerCreationFailed {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

/// Result type for service discovery operations
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// The record a registrar advertises in the coordination store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Parent path the record is created under
    pub path: String,
    /// Logical service name
    pub name: String,
    /// Node payload, the endpoint URL of the advertised instance
    pub data: Vec<u8>,
}

impl ServiceRecord {
    /// Payload interpreted as an instance string
    pub fn instance(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

impl fmt::Display for ServiceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} -> {}", self.path, self.name, self.instance())
    }
}

/// Snapshot of the instances currently present under a watched path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceEvent {
    /// Watched path that produced this event
    pub path: String,
    /// Instance strings, sorted
    pub instances: Vec<String>,
    /// Event timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl InstanceEvent {
    pub fn new(path: impl Into<String>, instances: Vec<String>) -> Self {
        Self {
            path: path.into(),
            instances,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Stream of instance events from one instancer
pub type InstanceEventStream = Box<dyn Stream<Item = InstanceEvent> + Send + Unpin>;

/// Connects to a coordination store.
///
/// This is the injection point for the client constructor: production code hands the
/// builder a factory for its real store, tests hand it one that fails or records.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Open a session against the given servers
    ///
    /// # Arguments
    /// * `servers` - Coordination store addresses
    /// * `connect_timeout` - Passed through to the transport
    /// * `session_timeout` - Passed through to the session
    async fn connect(
        &self,
        servers: &[String],
        connect_timeout: Duration,
        session_timeout: Duration,
    ) -> DiscoveryResult<Arc<dyn Client>>;
}

/// A live session with a coordination store
#[async_trait]
pub trait Client: Send + Sync {
    /// Subscribe to the instances under `path`
    async fn new_instancer(&self, path: &str) -> DiscoveryResult<Box<dyn Instancer>>;

    /// Create a registrar for `record`. Nothing is written until the registrar is started.
    fn new_registrar(&self, record: ServiceRecord) -> Box<dyn Registrar>;

    /// End the session. Registrations made through it disappear and its
    /// instancers stop producing events.
    async fn stop(&self) -> DiscoveryResult<()>;
}

/// A subscription reporting the instances available under one path
pub trait Instancer: Send + Sync {
    /// New stream of events, starting with the current snapshot
    fn subscribe(&self) -> InstanceEventStream;

    /// Stop the subscription; open streams end
    fn stop(&self);
}

/// Advertises one local endpoint while registered
#[async_trait]
pub trait Registrar: Send + Sync {
    async fn register(&self);

    async fn deregister(&self);
}
