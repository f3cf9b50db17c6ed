//! The assembled service discovery environment
//!
//! An [`Environment`] owns the instancers watching remote paths, the registrars
//! advertising local endpoints and the closers that release the coordination store
//! session. Nothing becomes visible to other peers until [`Environment::register`].

use parking_lot::Mutex;
use std::collections::btree_map;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use super::traits::{DiscoveryResult, InstanceEventStream, Instancer, Registrar};
use crate::config::service_discovery::DEFAULT_SCHEME;

type CloseFuture = Pin<Box<dyn Future<Output = DiscoveryResult<()>> + Send>>;

/// Closer function type, run once when the environment closes
pub type Closer = Box<dyn FnOnce() -> CloseFuture + Send + Sync>;

/// Build a [`Closer`] from an async function
pub fn closer<F, Fut>(f: F) -> Closer
where
    F: FnOnce() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = DiscoveryResult<()>> + Send + 'static,
{
    Box::new(move || -> CloseFuture { Box::pin(f()) })
}

/// An instancer annotated with metadata describing what it watches
pub struct ContextualInstancer {
    inner: Box<dyn Instancer>,
    metadata: HashMap<String, String>,
}

impl ContextualInstancer {
    pub fn new(inner: Box<dyn Instancer>, metadata: HashMap<String, String>) -> Self {
        Self { inner, metadata }
    }

    /// Wrap `inner` with `{"path": path}` metadata
    pub fn for_path(inner: Box<dyn Instancer>, path: &str) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert("path".to_string(), path.to_string());
        Self::new(inner, metadata)
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }
}

impl Instancer for ContextualInstancer {
    fn subscribe(&self) -> InstanceEventStream {
        self.inner.subscribe()
    }

    fn stop(&self) {
        self.inner.stop()
    }
}

impl fmt::Debug for ContextualInstancer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextualInstancer")
            .field("metadata", &self.metadata)
            .field("inner", &"<dyn Instancer>")
            .finish()
    }
}

/// Instancers keyed by the path they watch
#[derive(Debug, Default)]
pub struct InstancerSet {
    instancers: BTreeMap<String, ContextualInstancer>,
}

impl InstancerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, path: &str) -> bool {
        self.instancers.contains_key(path)
    }

    pub fn get(&self, path: &str) -> Option<&ContextualInstancer> {
        self.instancers.get(path)
    }

    /// Insert an instancer for `path`. Returns false, and drops `instancer`,
    /// when the path is already present.
    pub fn set(&mut self, path: impl Into<String>, instancer: ContextualInstancer) -> bool {
        match self.instancers.entry(path.into()) {
            btree_map::Entry::Vacant(entry) => {
                entry.insert(instancer);
                true
            }
            btree_map::Entry::Occupied(_) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.instancers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instancers.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.instancers.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ContextualInstancer)> {
        self.instancers.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Stop every instancer in the set
    pub fn stop(&self) {
        for instancer in self.instancers.values() {
            instancer.stop();
        }
    }
}

struct RegistrarEntry {
    endpoint: String,
    registrar: Box<dyn Registrar>,
}

/// Registrars in configuration order, at most one per endpoint
#[derive(Default)]
pub struct RegistrarSet {
    entries: Vec<RegistrarEntry>,
}

impl RegistrarSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, endpoint: &str) -> bool {
        self.entries.iter().any(|e| e.endpoint == endpoint)
    }

    /// Append a registrar for `endpoint`. Returns false, and drops `registrar`,
    /// when the endpoint is already present.
    pub fn add(&mut self, endpoint: impl Into<String>, registrar: Box<dyn Registrar>) -> bool {
        let endpoint = endpoint.into();
        if self.contains(&endpoint) {
            return false;
        }

        self.entries.push(RegistrarEntry {
            endpoint,
            registrar,
        });
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Endpoints in registration order
    pub fn endpoints(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.endpoint.as_str())
    }

    pub async fn register(&self) {
        for entry in &self.entries {
            debug!(endpoint = %entry.endpoint, "registering endpoint");
            entry.registrar.register().await;
        }
    }

    pub async fn deregister(&self) {
        for entry in &self.entries {
            debug!(endpoint = %entry.endpoint, "deregistering endpoint");
            entry.registrar.deregister().await;
        }
    }
}

impl fmt::Debug for RegistrarSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.endpoints()).finish()
    }
}

/// Number of configuration entries skipped as duplicates while building
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DuplicateCounts {
    pub watches: usize,
    pub registrations: usize,
}

/// Options applied when constructing an [`Environment`]
pub enum EnvironmentOption {
    /// Scheme used for instances that carry none
    DefaultScheme(String),
    /// Registrars merged into the environment's set
    Registrars(RegistrarSet),
    /// Instancers merged into the environment's set
    Instancers(InstancerSet),
    /// Closer run when the environment closes, in the order given
    Closer(Closer),
    /// Duplicate counts reported by the builder
    Duplicates(DuplicateCounts),
}

impl fmt::Debug for EnvironmentOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvironmentOption::DefaultScheme(scheme) => {
                f.debug_tuple("DefaultScheme").field(scheme).finish()
            }
            EnvironmentOption::Registrars(r) => f.debug_tuple("Registrars").field(r).finish(),
            EnvironmentOption::Instancers(i) => f.debug_tuple("Instancers").field(i).finish(),
            EnvironmentOption::Closer(_) => f.write_str("Closer(<function>)"),
            EnvironmentOption::Duplicates(d) => f.debug_tuple("Duplicates").field(d).finish(),
        }
    }
}

/// A service discovery environment
pub struct Environment {
    default_scheme: String,
    instancers: InstancerSet,
    registrars: RegistrarSet,
    duplicates: DuplicateCounts,
    closers: Mutex<Vec<Closer>>,
    /// Held across registrar calls so register and deregister never interleave
    transition: tokio::sync::Mutex<()>,
    registered: AtomicBool,
    closed: AtomicBool,
}

impl Environment {
    pub fn new(options: impl IntoIterator<Item = EnvironmentOption>) -> Self {
        let mut environment = Self {
            default_scheme: DEFAULT_SCHEME.to_string(),
            instancers: InstancerSet::new(),
            registrars: RegistrarSet::new(),
            duplicates: DuplicateCounts::default(),
            closers: Mutex::new(Vec::new()),
            transition: tokio::sync::Mutex::new(()),
            registered: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        };

        for option in options {
            environment.apply(option);
        }

        environment
    }

    fn apply(&mut self, option: EnvironmentOption) {
        match option {
            EnvironmentOption::DefaultScheme(scheme) => self.default_scheme = scheme,
            EnvironmentOption::Registrars(registrars) => {
                for entry in registrars.entries {
                    if !self.registrars.add(entry.endpoint.clone(), entry.registrar) {
                        warn!(endpoint = %entry.endpoint, "skipping duplicate registration");
                        self.duplicates.registrations += 1;
                    }
                }
            }
            EnvironmentOption::Instancers(instancers) => {
                for (path, instancer) in instancers.instancers {
                    if self.instancers.has(&path) {
                        warn!(path = %path, "skipping duplicate watch");
                        instancer.stop();
                        self.duplicates.watches += 1;
                        continue;
                    }
                    self.instancers.set(path, instancer);
                }
            }
            EnvironmentOption::Closer(closer) => self.closers.get_mut().push(closer),
            EnvironmentOption::Duplicates(counts) => {
                self.duplicates.watches += counts.watches;
                self.duplicates.registrations += counts.registrations;
            }
        }
    }

    pub fn default_scheme(&self) -> &str {
        &self.default_scheme
    }

    pub fn instancers(&self) -> &InstancerSet {
        &self.instancers
    }

    pub fn registrars(&self) -> &RegistrarSet {
        &self.registrars
    }

    pub fn duplicates(&self) -> DuplicateCounts {
        self.duplicates
    }

    /// Whether `endpoint` is one of this environment's registered endpoints
    pub fn is_registered(&self, endpoint: &str) -> bool {
        self.registered.load(Ordering::SeqCst) && self.registrars.contains(endpoint)
    }

    /// Start advertising every local endpoint
    pub async fn register(&self) {
        let _transition = self.transition.lock().await;
        if self.is_closed() {
            warn!("register called on a closed environment");
            return;
        }

        if !self.registered.load(Ordering::SeqCst) {
            self.registrars.register().await;
            self.registered.store(true, Ordering::SeqCst);
            info!(endpoints = self.registrars.len(), "service endpoints registered");
        }
    }

    /// Stop advertising every local endpoint
    pub async fn deregister(&self) {
        let _transition = self.transition.lock().await;
        if self.registered.load(Ordering::SeqCst) {
            self.registrars.deregister().await;
            self.registered.store(false, Ordering::SeqCst);
            info!(endpoints = self.registrars.len(), "service endpoints deregistered");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Deregister, stop the instancers and run the closers.
    ///
    /// Every closer runs even when an earlier one fails; the first error is returned.
    /// Closing again is a no-op.
    pub async fn close(&self) -> DiscoveryResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("environment already closed");
            return Ok(());
        }

        self.deregister().await;
        self.instancers.stop();

        let closers = std::mem::take(&mut *self.closers.lock());
        let mut first_error = None;
        for closer in closers {
            if let Err(e) = closer().await {
                warn!(error = %e, "environment closer failed");
                first_error.get_or_insert(e);
            }
        }

        info!("service discovery environment closed");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("default_scheme", &self.default_scheme)
            .field("instancers", &self.instancers)
            .field("registrars", &self.registrars)
            .field("duplicates", &self.duplicates)
            .field("closed", &self.is_closed())
            .finish()
    }
}
