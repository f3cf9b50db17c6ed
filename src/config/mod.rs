//! # Configuration
//!
//! Configuration structures for both subsystems. Every structure deserializes with
//! serde and fills unset fields with defaults, so a service can embed them in its own
//! configuration file:
//!
//! - `discovery`: coordination store servers, local registrations and watched paths
//! - `encoders` / `decoders`: codec pool sizing and wire format
//!
//! Reading files and merging sources is left to the embedding service.

pub mod codec; // 编解码池配置
pub mod service_discovery; // 服务发现配置

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub use codec::CodecPoolConfig;
pub use service_discovery::{Options, Registration};

/// Aggregate configuration for the crate's components
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Service discovery options
    #[serde(default)]
    pub discovery: Options,
    /// Encoder pool settings
    #[serde(default)]
    pub encoders: CodecPoolConfig,
    /// Decoder pool settings
    #[serde(default)]
    pub decoders: CodecPoolConfig,
}

impl Config {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        self.discovery.validate()?;
        self.encoders.validate()?;
        self.decoders.validate()?;

        if self.discovery.is_empty() {
            warn!("No registrations or watches configured - service discovery is disabled");
        }

        if self.encoders.format != self.decoders.format {
            warn!(
                encoders = %self.encoders.format,
                decoders = %self.decoders.format,
                "Encoder and decoder pools use different wire formats"
            );
        }

        Ok(())
    }
}
