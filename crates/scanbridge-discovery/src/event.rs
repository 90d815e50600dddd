//! Discovery events and the shared event queue.

use crate::params::{PrinterParameters, ScannerParameters};
use crate::unit::{Metadata, UnitID};

/// A raw per-protocol sighting, reported by a backend.
///
/// Events carry the [`UnitID`] they apply to; the client worker folds
/// them into the cache in arrival order. Within one backend, events
/// for the same unit are delivered in FIFO order.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryEvent {
    /// A unit appeared. Idempotent: a second add for a known unit is
    /// a no-op.
    AddUnit { id: UnitID },

    /// A unit went away, taking its endpoints with it.
    DelUnit { id: UnitID },

    /// Unit metadata became known or changed.
    Metadata { id: UnitID, meta: Metadata },

    /// Printer capabilities for a print unit.
    PrinterParameters {
        id: UnitID,
        params: PrinterParameters,
    },

    /// Scanner capabilities for a scan unit.
    ScannerParameters {
        id: UnitID,
        params: ScannerParameters,
    },

    /// Printer capabilities for a faxout unit.
    FaxoutParameters {
        id: UnitID,
        params: PrinterParameters,
    },

    /// A protocol endpoint URL for the unit.
    AddEndpoint { id: UnitID, endpoint: String },

    /// An endpoint went away.
    DelEndpoint { id: UnitID, endpoint: String },
}

impl DiscoveryEvent {
    /// Returns the event kind name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            DiscoveryEvent::AddUnit { .. } => "add-unit",
            DiscoveryEvent::DelUnit { .. } => "del-unit",
            DiscoveryEvent::Metadata { .. } => "metadata",
            DiscoveryEvent::PrinterParameters { .. } => "printer-parameters",
            DiscoveryEvent::ScannerParameters { .. } => "scanner-parameters",
            DiscoveryEvent::FaxoutParameters { .. } => "faxout-parameters",
            DiscoveryEvent::AddEndpoint { .. } => "add-endpoint",
            DiscoveryEvent::DelEndpoint { .. } => "del-endpoint",
        }
    }

    /// Returns the unit the event applies to.
    pub fn id(&self) -> &UnitID {
        match self {
            DiscoveryEvent::AddUnit { id }
            | DiscoveryEvent::DelUnit { id }
            | DiscoveryEvent::Metadata { id, .. }
            | DiscoveryEvent::PrinterParameters { id, .. }
            | DiscoveryEvent::ScannerParameters { id, .. }
            | DiscoveryEvent::FaxoutParameters { id, .. }
            | DiscoveryEvent::AddEndpoint { id, .. }
            | DiscoveryEvent::DelEndpoint { id, .. } => id,
        }
    }
}

/// The shared discovery event queue: multiple backend producers, one
/// client consumer.
///
/// The queue is unbounded; discovery traffic is externally paced and a
/// backend must never stall on a slow consumer.
#[derive(Debug, Clone)]
pub struct EventQueue {
    tx: async_channel::Sender<DiscoveryEvent>,
    rx: async_channel::Receiver<DiscoveryEvent>,
}

impl EventQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        let (tx, rx) = async_channel::unbounded();
        Self { tx, rx }
    }

    /// Pushes an event. Events pushed after the queue is closed are
    /// dropped.
    pub fn push(&self, event: DiscoveryEvent) {
        let _ = self.tx.try_send(event);
    }

    /// Pulls the next event, or `None` after the queue is closed and
    /// drained.
    pub async fn pull(&self) -> Option<DiscoveryEvent> {
        self.rx.recv().await.ok()
    }

    /// Closes the queue, unblocking the consumer.
    pub fn close(&self) {
        self.rx.close();
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns true if no events are queued.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
