use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::wrp::Format;

/// Encoder/decoder pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecPoolConfig {
    /// Maximum number of idle codecs kept for reuse (0 disables pooling)
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Buffer capacity given to freshly constructed codecs
    #[serde(default = "default_initial_buffer_size")]
    pub initial_buffer_size: usize,
    /// Wire format, `msgpack` or `json`
    #[serde(default)]
    pub format: Format,
}

fn default_pool_size() -> usize {
    100
}

fn default_initial_buffer_size() -> usize {
    200
}

impl Default for CodecPoolConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            initial_buffer_size: default_initial_buffer_size(),
            format: Format::default(),
        }
    }
}

impl CodecPoolConfig {
    pub fn validate(&self) -> Result<()> {
        if self.pool_size > 0 && self.initial_buffer_size == 0 {
            tracing::warn!(
                format = %self.format,
                "Pooled codecs start with an empty buffer; first uses will reallocate"
            );
        }

        if self.initial_buffer_size > 64 * 1024 * 1024 {
            return Err(anyhow::anyhow!(
                "Initial buffer size {} exceeds 64MB",
                self.initial_buffer_size
            ));
        }

        Ok(())
    }
}
