//! Unit identity and exported unit views.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::params::{PrinterParameters, ScannerParameters};

/// The search realm a sighting came from. Different realms are
/// independent namespaces: the same device name in DNS-SD and WSD does
/// not, by itself, tie the sightings together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchRealm {
    /// DNS-SD / mDNS discovery.
    Dnssd,
    /// WS-Discovery.
    Wsd,
    /// CUPS server enumeration.
    Cups,
    /// Directly attached (USB) devices.
    Usb,
}

impl fmt::Display for SearchRealm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchRealm::Dnssd => write!(f, "dnssd"),
            SearchRealm::Wsd => write!(f, "wsd"),
            SearchRealm::Cups => write!(f, "cups"),
            SearchRealm::Usb => write!(f, "usb"),
        }
    }
}

/// The kind of service a unit provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    Printer,
    Scanner,
    Faxout,
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceType::Printer => write!(f, "printer"),
            ServiceType::Scanner => write!(f, "scanner"),
            ServiceType::Faxout => write!(f, "faxout"),
        }
    }
}

/// The wire protocol a unit speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceProto {
    Ipp,
    Lpd,
    Escl,
    Wsd,
}

impl fmt::Display for ServiceProto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceProto::Ipp => write!(f, "IPP"),
            ServiceProto::Lpd => write!(f, "LPD"),
            ServiceProto::Escl => write!(f, "eSCL"),
            ServiceProto::Wsd => write!(f, "WSD"),
        }
    }
}

/// The combination of parameters that identifies a discovered unit.
///
/// Depending on the discovery protocol not every field carries
/// information; and a device's UUID is not necessarily stable between
/// protocols (some devices are known to use different UUIDs for DNS-SD
/// and WS-Discovery).
///
/// Intended field usage:
///
/// - `device_name`: realm-unique device name, in the DNS-SD sense
///   (e.g. `"Kyocera ECOSYS M2040dn"`),
/// - `uuid`: device UUID, when the protocol exposes one,
/// - `queue`: job queue name for devices with multiple logical
///   sub-units, like an LPD server with multiple queues,
/// - `realm`: the search realm; realms are independent namespaces,
/// - `zone`: further division of the realm namespace (for example, per
///   network interface),
/// - `variant`: distinguishes logically equivalent variants of the
///   same unit that a backend sees as independent sightings (IPv4 vs
///   IPv6, HTTP vs HTTPS),
/// - `svc_type` / `svc_proto`: what the unit is and how to talk to it,
/// - `serial`: device serial number, where available (USB).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitID {
    pub device_name: String,
    pub uuid: Option<Uuid>,
    pub queue: String,
    pub realm: SearchRealm,
    pub zone: String,
    pub variant: String,
    pub svc_type: ServiceType,
    pub svc_proto: ServiceProto,
    pub serial: String,
}

impl UnitID {
    /// Reports whether two unit IDs belong to the same device.
    pub fn same_device(&self, other: &UnitID) -> bool {
        if let (Some(a), Some(b)) = (self.uuid, other.uuid) {
            if a == b {
                return true;
            }
        }

        self.device_name == other.device_name
            && self.realm == other.realm
            && self.zone == other.zone
    }

    /// Reports whether two unit IDs belong to the same service of the
    /// same device.
    pub fn same_service(&self, other: &UnitID) -> bool {
        self.svc_type == other.svc_type && self.same_device(other)
    }

    /// Reports whether two unit IDs belong to the same unit of the
    /// same device.
    pub fn same_unit(&self, other: &UnitID) -> bool {
        self.queue == other.queue && self.same_service(other)
    }
}

impl fmt::Display for UnitID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({} {} {})", self.device_name, self.realm, self.svc_proto, self.svc_type)?;
        if !self.queue.is_empty() {
            write!(f, " queue={:?}", self.queue)?;
        }
        if let Some(uuid) = self.uuid {
            write!(f, " uuid={}", uuid)?;
        }
        Ok(())
    }
}

/// Device metadata, reported by backends incrementally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Manufacturer and model, as one string.
    pub make_model: String,

    /// User-assigned friendly name.
    pub friendly_name: String,

    /// Physical location ("2nd floor copy room").
    pub location: String,

    /// Administration web interface URL.
    pub admin_url: String,

    /// Manufacturer name.
    pub manufacturer: String,

    /// Firmware version.
    pub firmware: String,

    /// Serial number.
    pub serial: String,
}

/// A discovered print unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintUnit {
    pub id: UnitID,
    pub meta: Metadata,
    pub params: PrinterParameters,
    pub endpoints: Vec<String>,
}

/// A discovered scan unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanUnit {
    pub id: UnitID,
    pub meta: Metadata,
    pub params: ScannerParameters,
    pub endpoints: Vec<String>,
}

/// A discovered fax unit. Faxing reuses the printer capability model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaxoutUnit {
    pub id: UnitID,
    pub meta: Metadata,
    pub params: PrinterParameters,
    pub endpoints: Vec<String>,
}

/// An exported unit: the projection of a cache entry selected by its
/// service type and the kind of capability parameters it carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DiscoveredUnit {
    Print(PrintUnit),
    Scan(ScanUnit),
    Faxout(FaxoutUnit),
}

impl DiscoveredUnit {
    /// Returns the unit identity.
    pub fn id(&self) -> &UnitID {
        match self {
            DiscoveredUnit::Print(u) => &u.id,
            DiscoveredUnit::Scan(u) => &u.id,
            DiscoveredUnit::Faxout(u) => &u.id,
        }
    }

    /// Returns the unit metadata.
    pub fn meta(&self) -> &Metadata {
        match self {
            DiscoveredUnit::Print(u) => &u.meta,
            DiscoveredUnit::Scan(u) => &u.meta,
            DiscoveredUnit::Faxout(u) => &u.meta,
        }
    }

    /// Returns the unit endpoints.
    pub fn endpoints(&self) -> &[String] {
        match self {
            DiscoveredUnit::Print(u) => &u.endpoints,
            DiscoveredUnit::Scan(u) => &u.endpoints,
            DiscoveredUnit::Faxout(u) => &u.endpoints,
        }
    }
}
