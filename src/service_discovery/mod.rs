//! Service discovery module
//!
//! This module assembles a service discovery environment on top of a coordination store:
//! - Builder: turns configuration into instancers and registrars, skipping duplicates
//! - Environment: owns them and releases the store session on close
//! - Memory: an in-process coordination store implementing the client traits

pub mod builder;
pub mod environment;
pub mod memory;
pub mod traits;


// Re-export public types for convenience
pub use builder::{
    build_environment, build_service, new_client, new_instancers, new_registrars,
    EnvironmentBuilder,
};
pub use environment::{
    closer, Closer, ContextualInstancer, DuplicateCounts, Environment, EnvironmentOption,
    InstancerSet, RegistrarSet,
};
pub use memory::{MemoryClient, MemoryStore};
pub use traits::{
    Client, ClientFactory, DiscoveryError, DiscoveryResult, InstanceEvent, InstanceEventStream,
    Instancer, Registrar, ServiceRecord,
};
