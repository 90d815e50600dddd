//! The discovery client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::Cache;
use crate::event::{DiscoveryEvent, EventQueue};
use crate::unit::DiscoveredUnit;
use crate::{DiscoveryError, Result};

/// How long after startup the first discovery round is considered to
/// be in progress. [`Mode::WaitInitial`] queries wait until this much
/// time has passed since the client was created, giving backends a
/// chance to hear the first responses.
const INITIAL_SCAN_TIME: Duration = Duration::from_millis(2500);

/// A discovery backend.
///
/// A backend translates one discovery protocol into
/// [`DiscoveryEvent`]s. It owns its sockets and tasks; the client only
/// starts it, feeds it a queue and eventually closes it.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Returns the backend name, unique among attached backends.
    fn name(&self) -> &str;

    /// Starts backend operations. Events go into `queue`.
    fn start(&self, queue: EventQueue);

    /// Stops the backend and waits for its tasks to terminate.
    async fn close(&self);
}

/// Snapshot semantics for [`Client::get_devices`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Return the current cache content immediately.
    Snapshot,

    /// Wait until the initial discovery round has had time to
    /// complete, then return the cache content.
    WaitInitial,
}

/// The client side of device discovery.
///
/// Owns the shared event queue, the set of attached backends and the
/// cache. A single worker task consumes events and applies them to the
/// cache serially, so no two events ever mutate it concurrently;
/// readers get consistent snapshots.
pub struct Client {
    queue: EventQueue,
    cache: Arc<RwLock<Cache>>,
    backends: Mutex<Vec<Arc<dyn Backend>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    started_at: Instant,
}

impl Client {
    /// Creates a new discovery client and starts its worker.
    pub fn new() -> Self {
        let queue = EventQueue::new();
        let cache = Arc::new(RwLock::new(Cache::new()));

        let worker = {
            let queue = queue.clone();
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                while let Some(event) = queue.pull().await {
                    apply_event(&cache, event);
                }
            })
        };

        Self {
            queue,
            cache,
            backends: Mutex::new(Vec::new()),
            worker: Mutex::new(Some(worker)),
            started_at: Instant::now(),
        }
    }

    /// Attaches a backend and starts it.
    ///
    /// A backend may be attached only once, keyed by its name.
    pub fn add_backend(&self, backend: Arc<dyn Backend>) -> Result<()> {
        let mut backends = self.backends.lock();

        if backends.iter().any(|b| b.name() == backend.name()) {
            return Err(DiscoveryError::BackendAlreadyAdded(
                backend.name().to_string(),
            ));
        }

        debug!(backend = %backend.name(), "backend added");
        backend.start(self.queue.clone());
        backends.push(backend);
        Ok(())
    }

    /// Returns a snapshot of the discovered devices.
    ///
    /// With [`Mode::WaitInitial`] the call waits until the initial
    /// discovery round had time to complete; wrap the call in a
    /// timeout to bound the wait.
    pub async fn get_devices(&self, mode: Mode) -> Vec<DiscoveredUnit> {
        if mode == Mode::WaitInitial {
            tokio::time::sleep_until(self.started_at + INITIAL_SCAN_TIME).await;
        }

        self.cache.read().export()
    }

    /// Closes all attached backends, then stops the worker and waits
    /// for it to drain.
    pub async fn close(&self) {
        let backends: Vec<Arc<dyn Backend>> = self.backends.lock().drain(..).collect();
        for backend in backends {
            backend.close().await;
        }

        self.queue.close();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
    }

    /// Returns the shared event queue, mainly for tests that inject
    /// events without a backend.
    pub fn queue(&self) -> EventQueue {
        self.queue.clone()
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_event(cache: &RwLock<Cache>, event: DiscoveryEvent) {
    debug!(event = event.name(), id = %event.id(), "discovery event");

    let mut cache = cache.write();
    let result = match event {
        DiscoveryEvent::AddUnit { id } => cache.add_unit(id),
        DiscoveryEvent::DelUnit { id } => cache.del_unit(&id),
        DiscoveryEvent::Metadata { id, meta } => cache.set_metadata(&id, meta),
        DiscoveryEvent::PrinterParameters { id, params } => {
            cache.set_printer_parameters(&id, params)
        }
        DiscoveryEvent::ScannerParameters { id, params } => {
            cache.set_scanner_parameters(&id, params)
        }
        DiscoveryEvent::FaxoutParameters { id, params } => {
            cache.set_faxout_parameters(&id, params)
        }
        DiscoveryEvent::AddEndpoint { id, endpoint } => cache.add_endpoint(&id, &endpoint),
        DiscoveryEvent::DelEndpoint { id, endpoint } => cache.del_endpoint(&id, &endpoint),
    };

    // Discovery is best effort: log and move on.
    if let Err(err) = result {
        warn!(error = %err, "cache update failed");
    }
}
