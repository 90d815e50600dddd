//! Unit aggregation: WSD announcements to discovery events.

use std::collections::HashMap;

use scanbridge_discovery::{
    DiscoveryEvent, EventQueue, Metadata, SearchRealm, ServiceProto, ServiceType, UnitID,
};
use tracing::{debug, warn};

use crate::metadata::DeviceMetadata;
use crate::msg::{EndpointReference, Types};

/// What the backend should do after an announcement was absorbed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FollowUp {
    /// Nothing further.
    None,

    /// The announcement carried no transfer addresses; the endpoint
    /// needs a Resolve round.
    Resolve(EndpointReference),

    /// Fetch the device metadata from the transfer address.
    FetchMetadata { xaddr: String, address: String },
}

#[derive(Debug, Default)]
struct UnitEntry {
    types: Types,
    xaddrs: Vec<String>,
    ids: Vec<UnitID>,
    metadata_requested: bool,
}

/// The per-backend table of devices seen on the wire.
///
/// WSD discovery traffic only identifies devices; what a device
/// actually hosts (print service, scan service) and what it is called
/// comes from the metadata exchange. Units are announced to the
/// discovery queue once the metadata arrives; a device whose metadata
/// cannot be fetched falls back to units derived from the announced
/// types, named by the endpoint address.
pub(crate) struct UnitsTable {
    queue: EventQueue,
    seen: HashMap<String, UnitEntry>,
}

impl UnitsTable {
    pub(crate) fn new(queue: EventQueue) -> Self {
        Self {
            queue,
            seen: HashMap::new(),
        }
    }

    /// Absorbs a Hello / ProbeMatch / ResolveMatch announcement.
    pub(crate) fn announce(
        &mut self,
        endpoint_reference: &EndpointReference,
        types: &Types,
        xaddrs: &[String],
    ) -> FollowUp {
        let address = endpoint_reference.address.clone();
        let entry = self.seen.entry(address.clone()).or_default();

        entry.types = types.clone();
        for xaddr in xaddrs {
            if !entry.xaddrs.contains(xaddr) {
                entry.xaddrs.push(xaddr.clone());
            }
        }

        if entry.xaddrs.is_empty() {
            debug!(address = %address, "announcement without XAddrs, resolving");
            return FollowUp::Resolve(endpoint_reference.clone());
        }

        if !entry.metadata_requested {
            entry.metadata_requested = true;
            return FollowUp::FetchMetadata {
                xaddr: entry.xaddrs[0].clone(),
                address,
            };
        }

        FollowUp::None
    }

    /// Applies fetched device metadata, announcing the device units.
    pub(crate) fn apply_metadata(&mut self, address: &str, meta: &DeviceMetadata) {
        let Some(entry) = self.seen.get_mut(address) else {
            return;
        };

        let device_name = if !meta.this_device.friendly_name.is_empty() {
            meta.this_device.friendly_name.clone()
        } else if !meta.this_model.model_name.is_empty() {
            meta.this_model.model_name.clone()
        } else {
            address.to_string()
        };

        let uuid = EndpointReference {
            address: address.to_string(),
        }
        .uuid();

        // Service types hosted by the device: the Relationship section
        // is authoritative, the multicast Types field is the fallback.
        let mut svc_types: Vec<ServiceType> = Vec::new();
        for hosted in &meta.relationship.hosted {
            if hosted.types.is_print() {
                push_unique(&mut svc_types, ServiceType::Printer);
            }
            if hosted.types.is_scan() {
                push_unique(&mut svc_types, ServiceType::Scanner);
            }
        }
        if svc_types.is_empty() {
            if entry.types.is_print() {
                push_unique(&mut svc_types, ServiceType::Printer);
            }
            if entry.types.is_scan() {
                push_unique(&mut svc_types, ServiceType::Scanner);
            }
        }

        let metadata = Metadata {
            make_model: if meta.this_model.model_name.is_empty() {
                device_name.clone()
            } else {
                format!(
                    "{} {}",
                    meta.this_model.manufacturer, meta.this_model.model_name
                )
                .trim()
                .to_string()
            },
            friendly_name: meta.this_device.friendly_name.clone(),
            location: String::new(),
            admin_url: meta.this_model.presentation_url.clone(),
            manufacturer: meta.this_model.manufacturer.clone(),
            firmware: meta.this_device.firmware_version.clone(),
            serial: meta.this_device.serial_number.clone(),
        };

        for svc_type in svc_types {
            let id = UnitID {
                device_name: device_name.clone(),
                uuid,
                queue: String::new(),
                realm: SearchRealm::Wsd,
                zone: String::new(),
                variant: String::new(),
                svc_type,
                svc_proto: ServiceProto::Wsd,
                serial: meta.this_device.serial_number.clone(),
            };

            self.queue.push(DiscoveryEvent::AddUnit { id: id.clone() });
            self.queue.push(DiscoveryEvent::Metadata {
                id: id.clone(),
                meta: metadata.clone(),
            });

            // Per-service endpoints of the matching hosted services.
            // The device transfer address is a fallback for units
            // whose hosted section does not name an endpoint; an
            // endpoint may belong to one unit only.
            let mut pushed = 0;
            for hosted in &meta.relationship.hosted {
                let matches = match svc_type {
                    ServiceType::Printer => hosted.types.is_print(),
                    ServiceType::Scanner => hosted.types.is_scan(),
                    ServiceType::Faxout => false,
                };
                if matches {
                    for epr in &hosted.endpoint_references {
                        push_endpoint(&self.queue, &id, &epr.address);
                        pushed += 1;
                    }
                }
            }
            if pushed == 0 {
                for xaddr in &entry.xaddrs {
                    push_endpoint(&self.queue, &id, xaddr);
                }
            }

            entry.ids.push(id);
        }
    }

    /// Announces units straight from the multicast types, when the
    /// metadata exchange is unavailable.
    pub(crate) fn apply_without_metadata(&mut self, address: &str) {
        let Some(entry) = self.seen.get_mut(address) else {
            return;
        };
        if !entry.ids.is_empty() {
            return;
        }

        let uuid = EndpointReference {
            address: address.to_string(),
        }
        .uuid();

        let mut svc_types = Vec::new();
        if entry.types.is_print() {
            svc_types.push(ServiceType::Printer);
        }
        if entry.types.is_scan() {
            svc_types.push(ServiceType::Scanner);
        }

        for svc_type in svc_types {
            let id = UnitID {
                device_name: address.to_string(),
                uuid,
                queue: String::new(),
                realm: SearchRealm::Wsd,
                zone: String::new(),
                variant: String::new(),
                svc_type,
                svc_proto: ServiceProto::Wsd,
                serial: String::new(),
            };

            self.queue.push(DiscoveryEvent::AddUnit { id: id.clone() });
            for xaddr in &entry.xaddrs {
                push_endpoint(&self.queue, &id, xaddr);
            }
            entry.ids.push(id);
        }
    }

    /// Absorbs a Bye: the device is gone, and so are its units.
    pub(crate) fn bye(&mut self, endpoint_reference: &EndpointReference) {
        if let Some(entry) = self.seen.remove(&endpoint_reference.address) {
            for id in entry.ids {
                self.queue.push(DiscoveryEvent::DelUnit { id });
            }
        }
    }
}

fn push_unique(types: &mut Vec<ServiceType>, svc: ServiceType) {
    if !types.contains(&svc) {
        types.push(svc);
    }
}

fn push_endpoint(queue: &EventQueue, id: &UnitID, raw: &str) {
    match scanbridge_transport::parse_url(raw) {
        Ok(url) => queue.push(DiscoveryEvent::AddEndpoint {
            id: id.clone(),
            endpoint: url.to_string(),
        }),
        Err(err) => warn!(url = raw, error = %err, "bad endpoint URL"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        Relationship, ServiceMetadata, ThisDeviceMetadata, ThisModelMetadata,
    };

    fn epr(address: &str) -> EndpointReference {
        EndpointReference {
            address: address.to_string(),
        }
    }

    fn sample_metadata() -> DeviceMetadata {
        DeviceMetadata {
            this_device: ThisDeviceMetadata {
                friendly_name: "Office MFP".into(),
                firmware_version: "3.14".into(),
                serial_number: "QX55512".into(),
            },
            this_model: ThisModelMetadata {
                manufacturer: "Example Corp".into(),
                model_name: "MFP-9000".into(),
                ..Default::default()
            },
            relationship: Relationship {
                host: None,
                hosted: vec![
                    ServiceMetadata {
                        endpoint_references: vec![epr("http://192.168.1.50:80/wsd/print")],
                        types: Types::parse("ns1:PrinterServiceType"),
                        service_id: "uri:print".into(),
                    },
                    ServiceMetadata {
                        endpoint_references: vec![epr("http://192.168.1.50:80/wsd/scan")],
                        types: Types::parse("ns2:ScannerServiceType"),
                        service_id: "uri:scan".into(),
                    },
                ],
            },
        }
    }

    async fn drain(queue: &EventQueue) -> Vec<DiscoveryEvent> {
        let mut events = Vec::new();
        while !queue.is_empty() {
            events.push(queue.pull().await.unwrap());
        }
        events
    }

    #[tokio::test]
    async fn test_announce_requests_metadata_once() {
        let queue = EventQueue::new();
        let mut units = UnitsTable::new(queue.clone());

        let device = epr("urn:uuid:bb37f9a8-248e-4a27-9611-14deb7e8b3a6");
        let types = Types::parse("wsdp:Device");
        let xaddrs = vec!["http://192.168.1.50:80/wsd".to_string()];

        let follow_up = units.announce(&device, &types, &xaddrs);
        assert_eq!(
            follow_up,
            FollowUp::FetchMetadata {
                xaddr: "http://192.168.1.50:80/wsd".into(),
                address: device.address.clone(),
            }
        );

        // Retransmissions of the same Hello do not re-request.
        assert_eq!(units.announce(&device, &types, &xaddrs), FollowUp::None);
    }

    #[tokio::test]
    async fn test_announce_without_xaddrs_needs_resolve() {
        let queue = EventQueue::new();
        let mut units = UnitsTable::new(queue.clone());

        let device = epr("urn:uuid:bb37f9a8-248e-4a27-9611-14deb7e8b3a6");
        let follow_up = units.announce(&device, &Types::parse("wsdp:Device"), &[]);
        assert_eq!(follow_up, FollowUp::Resolve(device));
    }

    #[tokio::test]
    async fn test_metadata_announces_units() {
        let queue = EventQueue::new();
        let mut units = UnitsTable::new(queue.clone());

        let device = epr("urn:uuid:bb37f9a8-248e-4a27-9611-14deb7e8b3a6");
        units.announce(
            &device,
            &Types::parse("wsdp:Device"),
            &["http://192.168.1.50:80/wsd".to_string()],
        );
        units.apply_metadata(&device.address, &sample_metadata());

        let events = drain(&queue).await;

        let adds: Vec<&UnitID> = events
            .iter()
            .filter_map(|e| match e {
                DiscoveryEvent::AddUnit { id } => Some(id),
                _ => None,
            })
            .collect();
        assert_eq!(adds.len(), 2);
        assert!(adds.iter().all(|id| id.device_name == "Office MFP"));
        assert!(adds.iter().all(|id| id.realm == SearchRealm::Wsd));
        assert!(adds.iter().any(|id| id.svc_type == ServiceType::Printer));
        assert!(adds.iter().any(|id| id.svc_type == ServiceType::Scanner));
        assert!(adds.iter().all(|id| id.uuid.is_some()));

        // Each unit received metadata and its endpoints; the printer
        // gets the print endpoint, not the scan one.
        let printer_endpoints: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                DiscoveryEvent::AddEndpoint { id, endpoint }
                    if id.svc_type == ServiceType::Printer =>
                {
                    Some(endpoint.as_str())
                }
                _ => None,
            })
            .collect();
        assert!(printer_endpoints.contains(&"http://192.168.1.50/wsd/print"));
        assert!(!printer_endpoints.contains(&"http://192.168.1.50/wsd/scan"));

        let has_meta = events.iter().any(|e| {
            matches!(e, DiscoveryEvent::Metadata { meta, .. }
                if meta.manufacturer == "Example Corp" && meta.serial == "QX55512")
        });
        assert!(has_meta);
    }

    #[tokio::test]
    async fn test_bye_deletes_units() {
        let queue = EventQueue::new();
        let mut units = UnitsTable::new(queue.clone());

        let device = epr("urn:uuid:bb37f9a8-248e-4a27-9611-14deb7e8b3a6");
        units.announce(
            &device,
            &Types::parse("wsdp:Device"),
            &["http://192.168.1.50:80/wsd".to_string()],
        );
        units.apply_metadata(&device.address, &sample_metadata());
        let _ = drain(&queue).await;

        units.bye(&device);
        let events = drain(&queue).await;

        let dels = events
            .iter()
            .filter(|e| matches!(e, DiscoveryEvent::DelUnit { .. }))
            .count();
        assert_eq!(dels, 2);
    }

    #[tokio::test]
    async fn test_fallback_units_without_metadata() {
        let queue = EventQueue::new();
        let mut units = UnitsTable::new(queue.clone());

        let device = epr("urn:uuid:bb37f9a8-248e-4a27-9611-14deb7e8b3a6");
        units.announce(
            &device,
            &Types::parse("wsdp:Device wprt:PrintDeviceType"),
            &["http://192.168.1.50:80/wsd".to_string()],
        );
        units.apply_without_metadata(&device.address);

        let events = drain(&queue).await;
        let adds = events
            .iter()
            .filter(|e| matches!(e, DiscoveryEvent::AddUnit { .. }))
            .count();
        assert_eq!(adds, 1);
    }
}
