//! # svcglue - service discovery and message codec glue
//!
//! Two small, independent pieces of infrastructure shared by the services of a
//! distributed system:
//!
//! ## Core functionality
//!
//! - **Service discovery environment**: connects to a coordination store, creates one
//!   watch per configured path and one registrar per local endpoint (duplicates are
//!   logged and skipped), and releases the session through a single close
//! - **Codec pools**: bounded pools of WRP encoders and decoders for the MessagePack
//!   and JSON wire formats that never block, allocating when empty and discarding
//!   when full
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use svcglue::config::{Options, Registration};
//! use svcglue::service_discovery::{build_environment, MemoryStore};
//! use svcglue::wrp::{EncoderPool, Format, Message};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = Options::default()
//!         .with_registration(Registration::new("10.0.0.1", 8080).with_name("talaria"))
//!         .with_watch("/xmidt/scytale");
//!
//!     let store = Arc::new(MemoryStore::new());
//!     if let Some(environment) = build_environment(store, None, &options, Vec::new()).await? {
//!         environment.register().await;
//!         environment.close().await?;
//!     }
//!
//!     let encoders = EncoderPool::new(16, 256, Format::Msgpack);
//!     let bytes = encoders.encode_bytes(&Message::simple_event("mac:112233445566", "event:test", "hi"))?;
//!     println!("encoded {} bytes", bytes.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod service_discovery;
pub mod wrp;

// Re-export commonly used types
pub use config::{CodecPoolConfig, Config, Options, Registration};
pub use service_discovery::{
    build_environment, DiscoveryError, DiscoveryResult, Environment, EnvironmentBuilder,
    MemoryStore,
};
pub use wrp::{CodecError, CodecResult, DecoderPool, EncoderPool, Format, Message};
