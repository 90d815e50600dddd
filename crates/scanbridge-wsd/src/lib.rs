//! # scanbridge WSD
//!
//! WS-Discovery: the SOAP-over-UDP wire protocol ([`Msg`] and its
//! body types), the probe/resolve retransmission scheduler
//! ([`Sched`]) and the multicast discovery backend ([`WsdBackend`])
//! that folds Hello/Bye/ProbeMatches/ResolveMatches traffic into
//! discovery events.
//!
//! Devices announce themselves on the WSD multicast groups
//! (`239.255.255.250:3702` and `[ff02::c]:3702`); richer device
//! descriptions are fetched from the device's transfer endpoint via
//! the metadata exchange ([`metadata`]).

pub mod metadata;
mod msg;
mod sched;
mod units;

mod backend;

pub use backend::WsdBackend;
pub use msg::{
    Body, Bye, EndpointReference, Header, Hello, Msg, Probe, ProbeMatch, ProbeMatches, Resolve,
    ResolveMatches, Types,
};
pub use sched::{Sched, SchedEvent};

use scanbridge_xml::Namespace;
use std::net::SocketAddr;
use thiserror::Error;

/// SOAP envelope namespace, prefixed `s`.
pub const NS_SOAP: &str = "http://www.w3.org/2003/05/soap-envelope";

/// WS-Addressing namespace, prefixed `a`.
pub const NS_ADDRESSING: &str = "http://schemas.xmlsoap.org/ws/2004/08/addressing";

/// WS-Discovery namespace, prefixed `d`.
pub const NS_DISCOVERY: &str = "http://schemas.xmlsoap.org/ws/2005/04/discovery";

/// Devices Profile for Web Services namespace, prefixed `devprof`.
pub const NS_DEVPROF: &str = "http://schemas.xmlsoap.org/ws/2006/02/devprof";

/// WS-MetadataExchange namespace, prefixed `mex`.
pub const NS_MEX: &str = "http://schemas.xmlsoap.org/ws/2004/09/mex";

/// WS-Transfer namespace, prefixed `t`.
pub const NS_TRANSFER: &str = "http://schemas.xmlsoap.org/ws/2004/09/transfer";

/// WSD print service namespace, prefixed `wprt`.
pub const NS_PRINT: &str = "http://schemas.microsoft.com/windows/2006/08/wdp/print";

/// WSD scan service namespace, prefixed `wscn`.
pub const NS_SCAN: &str = "http://schemas.microsoft.com/windows/2006/08/wdp/scan";

/// WS-Addressing anonymous reply address.
pub const ADDR_ANONYMOUS: &str = "http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous";

/// The discovery To address.
pub const TO_DISCOVERY: &str = "urn:schemas-xmlsoap-org:ws:2005:04:discovery";

/// Message actions.
pub mod action {
    pub const HELLO: &str = "http://schemas.xmlsoap.org/ws/2005/04/discovery/Hello";
    pub const BYE: &str = "http://schemas.xmlsoap.org/ws/2005/04/discovery/Bye";
    pub const PROBE: &str = "http://schemas.xmlsoap.org/ws/2005/04/discovery/Probe";
    pub const PROBE_MATCHES: &str =
        "http://schemas.xmlsoap.org/ws/2005/04/discovery/ProbeMatches";
    pub const RESOLVE: &str = "http://schemas.xmlsoap.org/ws/2005/04/discovery/Resolve";
    pub const RESOLVE_MATCHES: &str =
        "http://schemas.xmlsoap.org/ws/2005/04/discovery/ResolveMatches";
    pub const GET: &str = "http://schemas.xmlsoap.org/ws/2004/09/transfer/Get";
    pub const GET_RESPONSE: &str =
        "http://schemas.xmlsoap.org/ws/2004/09/transfer/GetResponse";
}

/// The IPv4 WSD multicast group.
pub fn multicast_v4() -> SocketAddr {
    "239.255.255.250:3702".parse().unwrap()
}

/// The IPv6 WSD multicast group.
pub fn multicast_v6() -> SocketAddr {
    "[ff02::c]:3702".parse().unwrap()
}

/// Returns the namespace map used by WSD documents.
pub fn ns_map() -> Namespace {
    [
        (NS_SOAP, "s"),
        (NS_ADDRESSING, "a"),
        (NS_DISCOVERY, "d"),
        (NS_DEVPROF, "devprof"),
        (NS_MEX, "mex"),
        (NS_TRANSFER, "t"),
        (NS_PRINT, "wprt"),
        (NS_SCAN, "wscn"),
    ]
    .into_iter()
    .collect()
}

/// WSD protocol errors.
#[derive(Debug, Error)]
pub enum WsdError {
    /// The document is not well-formed or misses required elements.
    #[error(transparent)]
    Xml(#[from] scanbridge_xml::XmlError),

    /// The message action is not one this implementation handles.
    #[error("{0}: unhandled action")]
    UnhandledAction(String),

    /// Socket-level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata HTTP exchange failure.
    #[error("HTTP error: {0}")]
    Http(String),
}

/// Result type alias for WSD operations.
pub type Result<T> = std::result::Result<T, WsdError>;
