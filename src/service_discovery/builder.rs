//! Builds an [`Environment`] from [`Options`]
//!
//! Building connects to the coordination store, creates one instancer per unique
//! watch path and one registrar per unique endpoint, then hands everything to an
//! `Environment` whose closer stops the client. Duplicate watch paths and endpoints
//! are logged and skipped, never treated as errors.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use svcglue::config::{Options, Registration};
//! use svcglue::service_discovery::{EnvironmentBuilder, MemoryStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let options = Options::default()
//!     .with_registration(Registration::new("10.0.0.1", 8080))
//!     .with_watch("/xmidt/talaria");
//!
//! let builder = EnvironmentBuilder::new(Arc::new(MemoryStore::new()));
//! if let Some(environment) = builder.build(&options, Vec::new()).await? {
//!     environment.register().await;
//!     environment.close().await?;
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument, Span};

use super::environment::{
    closer, ContextualInstancer, DuplicateCounts, Environment, EnvironmentOption, InstancerSet,
    RegistrarSet,
};
use super::traits::{Client, ClientFactory, DiscoveryError, DiscoveryResult, ServiceRecord};
use crate::config::{Options, Registration};

/// Format the endpoint identity of a registration and the record advertising it
pub fn build_service(registration: &Registration) -> (String, ServiceRecord) {
    let endpoint = format!(
        "{}://{}:{}",
        registration.scheme, registration.address, registration.port
    );

    let record = ServiceRecord {
        path: registration.path.clone(),
        name: registration.name.clone(),
        data: endpoint.clone().into_bytes(),
    };

    (endpoint, record)
}

/// Connect to the coordination store named by `options`.
///
/// Factory errors are returned unchanged.
pub async fn new_client(
    factory: &dyn ClientFactory,
    options: &Options,
) -> DiscoveryResult<Arc<dyn Client>> {
    factory
        .connect(
            &options.servers,
            options.connect_timeout,
            options.session_timeout,
        )
        .await
}

/// Create one instancer per unique watch path, in configuration order.
///
/// Any creation failure fails the whole call; instancers already created are stopped.
pub async fn new_instancers(
    client: &dyn Client,
    options: &Options,
) -> DiscoveryResult<(InstancerSet, usize)> {
    let mut instancers = InstancerSet::new();
    let mut skipped = 0;

    for path in &options.watches {
        if instancers.has(path) {
            warn!(path = %path, "skipping duplicate watch");
            skipped += 1;
            continue;
        }

        let instancer = match client.new_instancer(path).await {
            Ok(instancer) => instancer,
            Err(e) => {
                instancers.stop();
                return Err(match e {
                    e @ DiscoveryError::InstancerCreationFailed { .. } => e,
                    other => DiscoveryError::instancer_creation_failed(path, other.to_string()),
                });
            }
        };

        instancers.set(path.clone(), ContextualInstancer::for_path(instancer, path));
    }

    Ok((instancers, skipped))
}

/// Create one registrar per unique endpoint, in configuration order
pub fn new_registrars(client: &dyn Client, options: &Options) -> (RegistrarSet, usize) {
    let mut registrars = RegistrarSet::new();
    let mut seen = HashSet::new();
    let mut skipped = 0;

    for registration in &options.registrations {
        let (endpoint, record) = build_service(registration);
        if !seen.insert(endpoint.clone()) {
            warn!(endpoint = %endpoint, "skipping duplicate registration");
            skipped += 1;
            continue;
        }

        registrars.add(endpoint, client.new_registrar(record));
    }

    (registrars, skipped)
}

/// Builds service discovery environments against an injected client factory
#[derive(Clone)]
pub struct EnvironmentBuilder {
    factory: Arc<dyn ClientFactory>,
    span: Option<Span>,
}

impl EnvironmentBuilder {
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            factory,
            span: None,
        }
    }

    /// Log under `span` instead of the default `service_environment` span
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Build an environment from `options`, applying `extra` options first.
    ///
    /// Returns `Ok(None)` without connecting when `options` has neither watches nor
    /// registrations. When instancer creation fails the client is stopped before the
    /// error is returned.
    pub async fn build(
        &self,
        options: &Options,
        extra: Vec<EnvironmentOption>,
    ) -> DiscoveryResult<Option<Environment>> {
        let span = self
            .span
            .clone()
            .unwrap_or_else(|| info_span!("service_environment"));

        self.build_inner(options, extra).instrument(span).await
    }

    async fn build_inner(
        &self,
        options: &Options,
        mut extra: Vec<EnvironmentOption>,
    ) -> DiscoveryResult<Option<Environment>> {
        if options.is_empty() {
            info!("no watches or registrations configured, skipping service discovery");
            return Ok(None);
        }

        let client = new_client(self.factory.as_ref(), options).await?;

        let (instancers, skipped_watches) = match new_instancers(client.as_ref(), options).await {
            Ok(built) => built,
            Err(e) => {
                if let Err(stop_error) = client.stop().await {
                    warn!(error = %stop_error, "failed to stop client after instancer error");
                }
                return Err(e);
            }
        };

        let (registrars, skipped_registrations) = new_registrars(client.as_ref(), options);

        info!(
            servers = %options.servers.join(","),
            instancers = instancers.len(),
            registrars = registrars.len(),
            skipped_watches,
            skipped_registrations,
            "service discovery environment built"
        );

        extra.push(EnvironmentOption::Registrars(registrars));
        extra.push(EnvironmentOption::Instancers(instancers));
        extra.push(EnvironmentOption::Duplicates(DuplicateCounts {
            watches: skipped_watches,
            registrations: skipped_registrations,
        }));
        extra.push(EnvironmentOption::Closer(closer(move || async move {
            client.stop().await
        })));

        Ok(Some(Environment::new(extra)))
    }
}

impl std::fmt::Debug for EnvironmentBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvironmentBuilder")
            .field("factory", &"<dyn ClientFactory>")
            .field("span", &self.span)
            .finish()
    }
}

/// Build an environment with `factory`, logging under `span` or a default span.
///
/// See [`EnvironmentBuilder::build`].
pub async fn build_environment(
    factory: Arc<dyn ClientFactory>,
    span: Option<Span>,
    options: &Options,
    extra: Vec<EnvironmentOption>,
) -> DiscoveryResult<Option<Environment>> {
    let mut builder = EnvironmentBuilder::new(factory);
    if let Some(span) = span {
        builder = builder.with_span(span);
    }
    builder.build(options, extra).await
}
