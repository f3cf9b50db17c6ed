//! In-process coordination store
//!
//! `MemoryStore` behaves like a small coordination service living inside the current
//! process. Each `connect` opens a session; registrations are ephemeral nodes owned by
//! their session and vanish when it stops, and every watch sees the sorted set of
//! instance strings under its path. Used by tests and for running a service locally
//! without an external store.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use super::traits::{
    Client, ClientFactory, DiscoveryError, DiscoveryResult, InstanceEvent, InstanceEventStream,
    Instancer, Registrar, ServiceRecord,
};

struct Node {
    session: u64,
    data: String,
}

struct Watch {
    session: u64,
    path: String,
    tx: watch::Sender<Vec<String>>,
}

#[derive(Default)]
struct StoreState {
    /// path -> node id -> node
    nodes: HashMap<String, BTreeMap<u64, Node>>,
    /// watch id -> watch
    watches: HashMap<u64, Watch>,
    next_id: u64,
}

impl StoreState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn instances(&self, path: &str) -> Vec<String> {
        let mut instances: Vec<String> = self
            .nodes
            .get(path)
            .map(|nodes| nodes.values().map(|n| n.data.clone()).collect())
            .unwrap_or_default();
        instances.sort();
        instances
    }

    fn publish(&self, path: &str) {
        let instances = self.instances(path);
        for watch in self.watches.values().filter(|w| w.path == path) {
            watch.tx.send_replace(instances.clone());
        }
    }
}

/// A coordination store held entirely in memory
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instances currently registered under `path`, sorted
    pub fn instances(&self, path: &str) -> Vec<String> {
        self.state.lock().instances(path)
    }

    /// Number of watches currently open on `path`
    pub fn watch_count(&self, path: &str) -> usize {
        self.state
            .lock()
            .watches
            .values()
            .filter(|w| w.path == path)
            .count()
    }

    /// Open a session directly, without going through [`ClientFactory`]
    pub fn session(&self) -> MemoryClient {
        let id = self.state.lock().next_id();
        MemoryClient {
            session: Arc::new(Session {
                id,
                state: Arc::clone(&self.state),
                stopped: AtomicBool::new(false),
            }),
        }
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryStore")
            .field("paths", &state.nodes.len())
            .field("watches", &state.watches.len())
            .finish()
    }
}

#[async_trait]
impl ClientFactory for MemoryStore {
    async fn connect(
        &self,
        servers: &[String],
        connect_timeout: Duration,
        session_timeout: Duration,
    ) -> DiscoveryResult<Arc<dyn Client>> {
        if servers.is_empty() {
            return Err(DiscoveryError::connect_failed(
                servers,
                "no coordination store servers configured",
            ));
        }

        if connect_timeout.is_zero() || session_timeout.is_zero() {
            return Err(DiscoveryError::ConfigurationError(format!(
                "timeouts must be non-zero (connect {:?}, session {:?})",
                connect_timeout, session_timeout
            )));
        }

        let client = self.session();
        info!(
            servers = %servers.join(","),
            session = client.session.id,
            ?connect_timeout,
            ?session_timeout,
            "memory store session opened"
        );
        Ok(Arc::new(client))
    }
}

struct Session {
    id: u64,
    state: Arc<Mutex<StoreState>>,
    stopped: AtomicBool,
}

impl Session {
    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// A session on a [`MemoryStore`]
pub struct MemoryClient {
    session: Arc<Session>,
}

impl MemoryClient {
    pub fn session_id(&self) -> u64 {
        self.session.id
    }

    pub fn is_stopped(&self) -> bool {
        self.session.is_stopped()
    }
}

#[async_trait]
impl Client for MemoryClient {
    async fn new_instancer(&self, path: &str) -> DiscoveryResult<Box<dyn Instancer>> {
        if !path.starts_with('/') {
            return Err(DiscoveryError::instancer_creation_failed(
                path,
                "path must start with '/'",
            ));
        }

        let mut state = self.session.state.lock();
        if self.session.is_stopped() {
            return Err(DiscoveryError::BackendError(format!(
                "session {} is stopped",
                self.session.id
            )));
        }

        let id = state.next_id();
        let (tx, _) = watch::channel(state.instances(path));
        state.watches.insert(
            id,
            Watch {
                session: self.session.id,
                path: path.to_string(),
                tx,
            },
        );

        debug!(path = %path, watch = id, "watch opened");
        Ok(Box::new(MemoryInstancer {
            id,
            path: path.to_string(),
            state: Arc::clone(&self.session.state),
        }))
    }

    fn new_registrar(&self, record: ServiceRecord) -> Box<dyn Registrar> {
        Box::new(MemoryRegistrar {
            session: Arc::clone(&self.session),
            record,
            node: Mutex::new(None),
        })
    }

    async fn stop(&self) -> DiscoveryResult<()> {
        // the flag flips under the state lock so no node can be added after cleanup
        let mut state = self.session.state.lock();
        if self.session.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let session = self.session.id;

        state.watches.retain(|_, w| w.session != session);

        let mut affected = Vec::new();
        for (path, nodes) in state.nodes.iter_mut() {
            let before = nodes.len();
            nodes.retain(|_, n| n.session != session);
            if nodes.len() != before {
                affected.push(path.clone());
            }
        }
        state.nodes.retain(|_, nodes| !nodes.is_empty());

        for path in &affected {
            state.publish(path);
        }

        info!(session, removed_paths = affected.len(), "memory store session stopped");
        Ok(())
    }
}

struct MemoryInstancer {
    id: u64,
    path: String,
    state: Arc<Mutex<StoreState>>,
}

impl Instancer for MemoryInstancer {
    fn subscribe(&self) -> InstanceEventStream {
        // the store holds the only sender, so removing the watch ends every stream
        let rx = self
            .state
            .lock()
            .watches
            .get(&self.id)
            .map(|w| w.tx.subscribe());

        match rx {
            Some(rx) => {
                let path = self.path.clone();
                Box::new(
                    WatchStream::new(rx)
                        .map(move |instances| InstanceEvent::new(path.clone(), instances)),
                )
            }
            None => Box::new(tokio_stream::empty()),
        }
    }

    fn stop(&self) {
        if self.state.lock().watches.remove(&self.id).is_some() {
            debug!(path = %self.path, watch = self.id, "watch stopped");
        }
    }
}

struct MemoryRegistrar {
    session: Arc<Session>,
    record: ServiceRecord,
    node: Mutex<Option<u64>>,
}

#[async_trait]
impl Registrar for MemoryRegistrar {
    async fn register(&self) {
        let mut node = self.node.lock();
        if node.is_some() {
            return;
        }

        let mut state = self.session.state.lock();
        if self.session.is_stopped() {
            warn!(record = %self.record, "cannot register on a stopped session");
            return;
        }

        let id = state.next_id();
        state.nodes.entry(self.record.path.clone()).or_default().insert(
            id,
            Node {
                session: self.session.id,
                data: self.record.instance(),
            },
        );
        state.publish(&self.record.path);
        *node = Some(id);

        debug!(path = %self.record.path, name = %self.record.name, instance = %self.record.instance(), "registered");
    }

    async fn deregister(&self) {
        let Some(id) = self.node.lock().take() else {
            return;
        };

        let mut state = self.session.state.lock();
        let removed = state
            .nodes
            .get_mut(&self.record.path)
            .and_then(|nodes| nodes.remove(&id))
            .is_some();

        if removed {
            if state
                .nodes
                .get(&self.record.path)
                .is_some_and(|nodes| nodes.is_empty())
            {
                state.nodes.remove(&self.record.path);
            }
            state.publish(&self.record.path);
            debug!(path = %self.record.path, instance = %self.record.instance(), "deregistered");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Registration;
    use crate::service_discovery::build_service;
    use std::thread;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn test_register_racing_session_stop_leaves_no_node() {
        let store = MemoryStore::new();
        let client = store.session();
        let (_, record) = build_service(&Registration::new("10.0.0.1", 8080).with_path("/svc/a"));
        let registrar = Arc::new(MemoryRegistrar {
            session: Arc::clone(&client.session),
            record,
            node: Mutex::new(None),
        });

        // hold the registrar's node so register blocks before touching the store
        let held = registrar.node.lock();
        let pending = {
            let registrar = Arc::clone(&registrar);
            thread::spawn(move || runtime().block_on(registrar.register()))
        };
        thread::sleep(Duration::from_millis(50));

        runtime().block_on(client.stop()).unwrap();
        drop(held);
        pending.join().unwrap();

        assert!(client.is_stopped());
        assert!(store.instances("/svc/a").is_empty());
        assert!(registrar.node.lock().is_none());
    }

    #[tokio::test]
    async fn test_stopped_session_rejects_watches() {
        let client = MemoryStore::new().session();
        client.stop().await.unwrap();

        let result = client.new_instancer("/svc/a").await;
        assert!(matches!(result, Err(DiscoveryError::BackendError(_))));
    }

    #[tokio::test]
    async fn test_connect_rejects_zero_timeouts() {
        let store = MemoryStore::new();
        let result = store
            .connect(&["s1".to_string()], Duration::ZERO, Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(DiscoveryError::ConfigurationError(_))));
        assert_eq!(store.state.lock().watches.len(), 0);
    }
}
