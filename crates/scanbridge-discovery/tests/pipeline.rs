//! End-to-end discovery pipeline: backends feeding one client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scanbridge_discovery::{
    Backend, Client, DiscoveredUnit, DiscoveryEvent, EventQueue, Metadata, Mode,
    PrinterParameters, ScannerParameters, SearchRealm, ServiceProto, ServiceType, UnitID,
};

fn unit_id(name: &str, realm: SearchRealm, svc: ServiceType) -> UnitID {
    UnitID {
        device_name: name.to_string(),
        uuid: None,
        queue: String::new(),
        realm,
        zone: String::new(),
        variant: String::new(),
        svc_type: svc,
        svc_proto: ServiceProto::Ipp,
        serial: String::new(),
    }
}

/// A backend that replays a canned event sequence.
struct ReplayBackend {
    name: &'static str,
    events: Vec<DiscoveryEvent>,
}

#[async_trait]
impl Backend for ReplayBackend {
    fn name(&self) -> &str {
        self.name
    }

    fn start(&self, queue: EventQueue) {
        for event in &self.events {
            queue.push(event.clone());
        }
    }

    async fn close(&self) {}
}

async fn settle() {
    // Let the client worker drain the queue.
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_two_backends_aggregate_into_one_snapshot() {
    let printer = unit_id("Front Desk", SearchRealm::Dnssd, ServiceType::Printer);
    let scanner = unit_id("Front Desk", SearchRealm::Wsd, ServiceType::Scanner);

    let dnssd = ReplayBackend {
        name: "fake-dnssd",
        events: vec![
            DiscoveryEvent::AddUnit { id: printer.clone() },
            DiscoveryEvent::Metadata {
                id: printer.clone(),
                meta: Metadata {
                    make_model: "Example MFP-9000".into(),
                    ..Metadata::default()
                },
            },
            DiscoveryEvent::PrinterParameters {
                id: printer.clone(),
                params: PrinterParameters {
                    color: true,
                    ..Default::default()
                },
            },
            DiscoveryEvent::AddEndpoint {
                id: printer.clone(),
                endpoint: "ipp://10.0.0.9/ipp/print".into(),
            },
        ],
    };

    let wsd = ReplayBackend {
        name: "fake-wsd",
        events: vec![
            DiscoveryEvent::AddUnit { id: scanner.clone() },
            DiscoveryEvent::ScannerParameters {
                id: scanner.clone(),
                params: ScannerParameters::default(),
            },
            DiscoveryEvent::AddEndpoint {
                id: scanner.clone(),
                endpoint: "http://10.0.0.9:8080/eSCL".into(),
            },
        ],
    };

    let client = Client::new();
    client.add_backend(Arc::new(dnssd)).unwrap();
    client.add_backend(Arc::new(wsd)).unwrap();

    settle().await;

    let devices = client.get_devices(Mode::Snapshot).await;
    assert_eq!(devices.len(), 2);

    let print = devices
        .iter()
        .find_map(|unit| match unit {
            DiscoveredUnit::Print(p) => Some(p),
            _ => None,
        })
        .expect("print unit present");
    assert_eq!(print.meta.make_model, "Example MFP-9000");
    assert!(print.params.color);

    let scan = devices
        .iter()
        .find_map(|unit| match unit {
            DiscoveredUnit::Scan(s) => Some(s),
            _ => None,
        })
        .expect("scan unit present");
    assert_eq!(scan.endpoints, ["http://10.0.0.9:8080/eSCL"]);

    client.close().await;
}

#[tokio::test]
async fn test_endpoint_conflicts_across_backends_are_dropped() {
    let first = unit_id("A", SearchRealm::Dnssd, ServiceType::Printer);
    let second = unit_id("B", SearchRealm::Wsd, ServiceType::Printer);

    let backend = ReplayBackend {
        name: "fake",
        events: vec![
            DiscoveryEvent::AddUnit { id: first.clone() },
            DiscoveryEvent::PrinterParameters {
                id: first.clone(),
                params: PrinterParameters::default(),
            },
            DiscoveryEvent::AddEndpoint {
                id: first.clone(),
                endpoint: "ipp://10.0.0.1/".into(),
            },
            DiscoveryEvent::AddUnit { id: second.clone() },
            DiscoveryEvent::PrinterParameters {
                id: second.clone(),
                params: PrinterParameters::default(),
            },
            // Conflicts with the binding above; discovery is best
            // effort, so the event is dropped, not fatal.
            DiscoveryEvent::AddEndpoint {
                id: second.clone(),
                endpoint: "ipp://10.0.0.1/".into(),
            },
        ],
    };

    let client = Client::new();
    client.add_backend(Arc::new(backend)).unwrap();
    settle().await;

    let devices = client.get_devices(Mode::Snapshot).await;
    assert_eq!(devices.len(), 2);

    let owner = devices.iter().find(|u| u.id() == &first).unwrap();
    let intruder = devices.iter().find(|u| u.id() == &second).unwrap();

    assert_eq!(owner.endpoints(), ["ipp://10.0.0.1/"]);
    assert!(intruder.endpoints().is_empty());

    client.close().await;
}

#[tokio::test]
async fn test_del_unit_removes_from_snapshot() {
    let id = unit_id("Transient", SearchRealm::Wsd, ServiceType::Printer);

    let client = Client::new();
    let queue = client.queue();

    queue.push(DiscoveryEvent::AddUnit { id: id.clone() });
    queue.push(DiscoveryEvent::PrinterParameters {
        id: id.clone(),
        params: PrinterParameters::default(),
    });
    settle().await;
    assert_eq!(client.get_devices(Mode::Snapshot).await.len(), 1);

    queue.push(DiscoveryEvent::DelUnit { id });
    settle().await;
    assert!(client.get_devices(Mode::Snapshot).await.is_empty());

    client.close().await;
}
