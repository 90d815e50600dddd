//! # scanbridge discovery
//!
//! The discovery aggregation engine. Backends observe the network
//! through their own protocols (WS-Discovery multicast, DNS-SD) and
//! report raw sightings as [`DiscoveryEvent`]s into a shared queue; a
//! single [`Client`] worker folds the event stream into a cache of
//! logical units, which queries read as consistent snapshots.
//!
//! The data model is unit-centric: a physical device exposes one or
//! more *units* (a print queue, a scanner, a fax endpoint), each
//! identified by a [`UnitID`]. Identity relations between unit IDs
//! ([`UnitID::same_device`], [`UnitID::same_service`],
//! [`UnitID::same_unit`]) tie multi-protocol sightings of the same
//! hardware together.
//!
//! Discovery is best effort: cache update errors (endpoint conflicts,
//! events for unknown units) are logged and never propagate to the
//! backends.

mod cache;
mod client;
mod dnssd;
mod event;
mod params;
mod unit;

pub use client::{Backend, Client, Mode};
pub use dnssd::DnssdBackend;
pub use event::{DiscoveryEvent, EventQueue};
pub use params::{ParamRange, PrinterParameters, ScannerParameters};
pub use unit::{
    DiscoveredUnit, FaxoutUnit, Metadata, PrintUnit, ScanUnit, SearchRealm, ServiceProto,
    ServiceType, UnitID,
};

use thiserror::Error;

/// Discovery engine errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DiscoveryError {
    /// The same backend was attached twice.
    #[error("backend {0} already added")]
    BackendAlreadyAdded(String),

    /// A backend failed to initialize or operate.
    #[error("backend error: {0}")]
    Backend(String),

    /// The client has been closed.
    #[error("discovery client is closed")]
    Closed,

    /// An endpoint is already bound to a different unit.
    #[error("endpoint {endpoint} already belongs to another unit")]
    EndpointConflict { endpoint: String },

    /// An event referred to a unit the cache does not know.
    #[error("unit is not known: {0}")]
    UnknownUnit(String),
}

/// Result type alias for discovery operations.
pub type Result<T> = std::result::Result<T, DiscoveryError>;
