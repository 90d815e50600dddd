//! DNS-SD discovery backend.
//!
//! Browses the printer and scanner service types over mDNS and
//! translates resolved services into discovery events. The backend
//! does not require any particular daemon: the `mdns-sd` service
//! daemon it embeds does its own multicast I/O.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use mdns_sd::{ServiceDaemon, ServiceEvent as MdnsEvent, ServiceInfo};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::event::{DiscoveryEvent, EventQueue};
use crate::params::{PrinterParameters, ScannerParameters};
use crate::unit::{Metadata, SearchRealm, ServiceProto, ServiceType, UnitID};
use crate::{Backend, DiscoveryError, Result};

/// One browsed service type and what its instances are.
struct SvcKind {
    /// DNS-SD service type, fully qualified.
    ty: &'static str,
    proto: ServiceProto,
    svc: ServiceType,
    /// Endpoint URL scheme.
    scheme: &'static str,
    /// UnitID variant, distinguishing TLS and plaintext sightings of
    /// the same unit.
    variant: &'static str,
}

const SERVICE_KINDS: &[SvcKind] = &[
    SvcKind {
        ty: "_ipp._tcp.local.",
        proto: ServiceProto::Ipp,
        svc: ServiceType::Printer,
        scheme: "ipp",
        variant: "",
    },
    SvcKind {
        ty: "_ipps._tcp.local.",
        proto: ServiceProto::Ipp,
        svc: ServiceType::Printer,
        scheme: "ipps",
        variant: "tls",
    },
    SvcKind {
        ty: "_printer._tcp.local.",
        proto: ServiceProto::Lpd,
        svc: ServiceType::Printer,
        scheme: "http",
        variant: "",
    },
    SvcKind {
        ty: "_uscan._tcp.local.",
        proto: ServiceProto::Escl,
        svc: ServiceType::Scanner,
        scheme: "http",
        variant: "",
    },
    SvcKind {
        ty: "_uscans._tcp.local.",
        proto: ServiceProto::Escl,
        svc: ServiceType::Scanner,
        scheme: "https",
        variant: "tls",
    },
    SvcKind {
        ty: "_fax-ipp._tcp.local.",
        proto: ServiceProto::Ipp,
        svc: ServiceType::Faxout,
        scheme: "ipp",
        variant: "",
    },
];

/// DNS-SD discovery backend.
pub struct DnssdBackend {
    mdns: ServiceDaemon,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closing: Arc<AtomicBool>,

    // fullname -> unit IDs announced for it, for DelUnit on removal.
    seen: Arc<DashMap<String, Vec<UnitID>>>,
}

impl DnssdBackend {
    /// Creates the backend. Fails if the mDNS daemon cannot be
    /// started.
    pub fn new() -> Result<Self> {
        let mdns = ServiceDaemon::new()
            .map_err(|err| DiscoveryError::Backend(format!("mdns daemon: {}", err)))?;

        Ok(Self {
            mdns,
            tasks: Mutex::new(Vec::new()),
            closing: Arc::new(AtomicBool::new(false)),
            seen: Arc::new(DashMap::new()),
        })
    }
}

#[async_trait]
impl Backend for DnssdBackend {
    fn name(&self) -> &str {
        "dnssd"
    }

    fn start(&self, queue: EventQueue) {
        let mut tasks = self.tasks.lock();

        for kind in SERVICE_KINDS {
            let receiver = match self.mdns.browse(kind.ty) {
                Ok(receiver) => receiver,
                Err(err) => {
                    error!(service_type = kind.ty, error = %err, "browse failed");
                    continue;
                }
            };

            let queue = queue.clone();
            let closing = Arc::clone(&self.closing);
            let seen = Arc::clone(&self.seen);

            tasks.push(tokio::spawn(async move {
                while !closing.load(Ordering::SeqCst) {
                    match receiver.recv_async().await {
                        Ok(event) => handle_mdns_event(kind, event, &queue, &seen),
                        Err(_) => break,
                    }
                }
                debug!(service_type = kind.ty, "browser task stopped");
            }));
        }

        debug!("backend started");
    }

    async fn close(&self) {
        self.closing.store(true, Ordering::SeqCst);

        if let Err(err) = self.mdns.shutdown() {
            warn!(error = %err, "mdns daemon shutdown failed");
        }

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            task.abort();
            let _ = task.await;
        }
    }
}

fn handle_mdns_event(
    kind: &SvcKind,
    event: MdnsEvent,
    queue: &EventQueue,
    seen: &DashMap<String, Vec<UnitID>>,
) {
    match event {
        MdnsEvent::ServiceResolved(info) => {
            debug!(
                service = info.get_fullname(),
                hostname = info.get_hostname(),
                port = info.get_port(),
                "service resolved"
            );

            let id = unit_id(kind, &info);

            queue.push(DiscoveryEvent::AddUnit { id: id.clone() });
            queue.push(DiscoveryEvent::Metadata {
                id: id.clone(),
                meta: metadata_from_txt(&info),
            });

            match kind.svc {
                ServiceType::Printer => queue.push(DiscoveryEvent::PrinterParameters {
                    id: id.clone(),
                    params: printer_params_from_txt(&info),
                }),
                ServiceType::Faxout => queue.push(DiscoveryEvent::FaxoutParameters {
                    id: id.clone(),
                    params: printer_params_from_txt(&info),
                }),
                ServiceType::Scanner => queue.push(DiscoveryEvent::ScannerParameters {
                    id: id.clone(),
                    params: scanner_params_from_txt(&info),
                }),
            }

            for endpoint in endpoints(kind, &info) {
                queue.push(DiscoveryEvent::AddEndpoint {
                    id: id.clone(),
                    endpoint,
                });
            }

            seen.entry(info.get_fullname().to_string())
                .or_default()
                .push(id);
        }

        MdnsEvent::ServiceRemoved(_, fullname) => {
            debug!(service = fullname, "service removed");

            if let Some((_, ids)) = seen.remove(&fullname) {
                for id in dedup(ids) {
                    queue.push(DiscoveryEvent::DelUnit { id });
                }
            }
        }

        MdnsEvent::SearchStarted(ty) => debug!(service_type = ty, "search started"),
        MdnsEvent::SearchStopped(ty) => debug!(service_type = ty, "search stopped"),

        _ => {}
    }
}

fn unit_id(kind: &SvcKind, info: &ServiceInfo) -> UnitID {
    let instance = instance_name(info.get_fullname(), kind.ty);

    UnitID {
        device_name: instance,
        uuid: txt(info, "UUID").and_then(|s| Uuid::parse_str(&s).ok()),
        queue: queue_name(kind, info),
        realm: SearchRealm::Dnssd,
        zone: String::new(),
        variant: kind.variant.to_string(),
        svc_type: kind.svc,
        svc_proto: kind.proto,
        serial: String::new(),
    }
}

// "My Printer._ipp._tcp.local." -> "My Printer"
fn instance_name(fullname: &str, ty: &str) -> String {
    fullname
        .strip_suffix(ty)
        .map(|s| s.trim_end_matches('.'))
        .unwrap_or(fullname)
        .to_string()
}

// The resource path within the device: "rp" for IPP services, "rs"
// for eSCL scanners.
fn queue_name(kind: &SvcKind, info: &ServiceInfo) -> String {
    let key = match kind.proto {
        ServiceProto::Escl => "rs",
        _ => "rp",
    };
    txt(info, key).unwrap_or_default()
}

fn txt(info: &ServiceInfo, key: &str) -> Option<String> {
    info.get_property_val_str(key)
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty())
}

fn metadata_from_txt(info: &ServiceInfo) -> Metadata {
    Metadata {
        make_model: txt(info, "ty").unwrap_or_default(),
        friendly_name: String::new(),
        location: txt(info, "note").unwrap_or_default(),
        admin_url: txt(info, "adminurl").unwrap_or_default(),
        manufacturer: txt(info, "usb_MFG").unwrap_or_default(),
        firmware: String::new(),
        serial: String::new(),
    }
}

fn printer_params_from_txt(info: &ServiceInfo) -> PrinterParameters {
    PrinterParameters {
        document_formats: list(txt(info, "pdl")),
        media_sizes: Vec::new(),
        color: flag(txt(info, "Color")),
        duplex: flag(txt(info, "Duplex")),
        priority: txt(info, "priority")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
    }
}

fn scanner_params_from_txt(info: &ServiceInfo) -> ScannerParameters {
    let sources = list(txt(info, "is"));
    ScannerParameters {
        document_formats: list(txt(info, "pdl")),
        color_modes: list(txt(info, "cs")),
        adf_duplex: sources.iter().any(|s| s == "duplex"),
        input_sources: sources,
        resolutions: Vec::new(),
        brightness: None,
        contrast: None,
    }
}

fn list(value: Option<String>) -> Vec<String> {
    value
        .map(|s| {
            s.split(',')
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn flag(value: Option<String>) -> bool {
    matches!(value.as_deref(), Some("T") | Some("t") | Some("true"))
}

fn endpoints(kind: &SvcKind, info: &ServiceInfo) -> Vec<String> {
    let path = {
        let queue = queue_name(kind, info);
        if queue.is_empty() {
            "/".to_string()
        } else if queue.starts_with('/') {
            queue
        } else {
            format!("/{}", queue)
        }
    };

    let mut out = Vec::new();
    for addr in info.get_addresses() {
        let raw = if addr.is_ipv6() {
            format!("{}://[{}]:{}{}", kind.scheme, addr, info.get_port(), path)
        } else {
            format!("{}://{}:{}{}", kind.scheme, addr, info.get_port(), path)
        };

        // Canonicalize so that the cache endpoint index never sees two
        // spellings of the same URL.
        match scanbridge_transport::parse_url(&raw) {
            Ok(url) => out.push(url.to_string()),
            Err(err) => warn!(url = raw, error = %err, "bad endpoint URL"),
        }
    }

    out.sort();
    out
}

fn dedup(ids: Vec<UnitID>) -> Vec<UnitID> {
    let mut out: Vec<UnitID> = Vec::new();
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_name() {
        assert_eq!(
            instance_name("My Printer._ipp._tcp.local.", "_ipp._tcp.local."),
            "My Printer"
        );
        assert_eq!(instance_name("odd-name", "_ipp._tcp.local."), "odd-name");
    }

    #[test]
    fn test_list_parsing() {
        assert_eq!(
            list(Some("image/jpeg, application/pdf".into())),
            ["image/jpeg", "application/pdf"]
        );
        assert!(list(None).is_empty());
        assert!(list(Some("".into())).is_empty());
    }

    #[test]
    fn test_flag_parsing() {
        assert!(flag(Some("T".into())));
        assert!(flag(Some("true".into())));
        assert!(!flag(Some("F".into())));
        assert!(!flag(None));
    }

    #[test]
    fn test_backend_creation() {
        // May fail in sandboxes without multicast networking; the
        // constructor surface is what is checked here.
        if let Ok(backend) = DnssdBackend::new() {
            assert_eq!(backend.name(), "dnssd");
        }
    }
}
