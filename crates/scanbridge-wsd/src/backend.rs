//! The WSD multicast discovery backend.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use scanbridge_discovery::{Backend, EventQueue};
use scanbridge_transport::netstate::{NetEvent, Notifier};
use scanbridge_transport::McastSocket;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::msg::{Body, Msg, Types};
use crate::sched::{Sched, SchedEvent};
use crate::units::{FollowUp, UnitsTable};
use crate::{metadata, multicast_v4, multicast_v6, ns_map, Result, WsdError};

/// Receive buffer size; a WSD datagram fits a UDP packet.
const RECV_BUFFER_SIZE: usize = 65536;

/// The WS-Discovery backend.
///
/// Opens the two WSD multicast sockets, follows the network state
/// notifier to keep the group memberships per interface, probes the
/// network on the scheduler cadence and folds incoming Hello / Bye /
/// ProbeMatches / ResolveMatches traffic into discovery events.
///
/// Packets looped back from our own sockets (source port equals one of
/// our bound ports on a local address) are silently discarded.
pub struct WsdBackend {
    inner: Arc<Inner>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

struct Inner {
    mconn4: McastSocket,
    mconn6: McastSocket,
    netmon: Notifier,
    closing: AtomicBool,

    // Loop prevention state.
    local_ports: [u16; 2],
    local_addrs: std::sync::RwLock<HashSet<IpAddr>>,

    units: AsyncMutex<Option<UnitsTable>>,
}

impl WsdBackend {
    /// Creates the backend, opening both multicast sockets.
    pub fn new() -> Result<Self> {
        let mconn4 = McastSocket::new(multicast_v4())?;
        let mconn6 = McastSocket::new(multicast_v6())?;

        let local_ports = [mconn4.local_port()?, mconn6.local_port()?];

        Ok(Self {
            inner: Arc::new(Inner {
                mconn4,
                mconn6,
                netmon: Notifier::new(),
                closing: AtomicBool::new(false),
                local_ports,
                local_addrs: std::sync::RwLock::new(HashSet::new()),
                units: AsyncMutex::new(None),
            }),
            tasks: std::sync::Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Backend for WsdBackend {
    fn name(&self) -> &str {
        "wsdd"
    }

    fn start(&self, queue: EventQueue) {
        // No receive task is running yet, the lock cannot be held.
        if let Ok(mut guard) = self.inner.units.try_lock() {
            *guard = Some(UnitsTable::new(queue));
        }

        let mut tasks = self.tasks.lock().unwrap();

        // Network state task: group membership per interface.
        tasks.push(tokio::spawn(netmon_proc(Arc::clone(&self.inner))));

        // Receive tasks, one per socket.
        tasks.push(tokio::spawn(mconn_proc(Arc::clone(&self.inner), false)));
        tasks.push(tokio::spawn(mconn_proc(Arc::clone(&self.inner), true)));

        // Probe scheduler task.
        tasks.push(tokio::spawn(probe_proc(Arc::clone(&self.inner))));

        debug!("backend started");
    }

    async fn close(&self) {
        self.inner.closing.store(true, Ordering::SeqCst);
        self.inner.netmon.close();

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().unwrap().drain(..).collect();
        for task in tasks {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Inner {
    // Source (ip, port) matching one of our sockets on a local
    // address means the packet is our own echo.
    fn is_looped(&self, from: SocketAddr) -> bool {
        self.local_ports.contains(&from.port())
            && self.local_addrs.read().unwrap().contains(&from.ip())
    }

    async fn input(self: &Arc<Self>, data: &[u8], from: SocketAddr, ifindex: u32) {
        if self.is_looped(from) {
            return;
        }

        debug!(bytes = data.len(), from = %from, ifindex, "packet received");

        // Decode failures on one packet never kill the backend.
        let msg = match scanbridge_xml::decode(&ns_map(), data).map_err(WsdError::from) {
            Ok(doc) => match Msg::decode(doc.root()) {
                Ok(msg) => msg,
                Err(err) => {
                    warn!(error = %err, from = %from, "undecodable message");
                    return;
                }
            },
            Err(err) => {
                warn!(error = %err, from = %from, "undecodable packet");
                return;
            }
        };

        debug!(action = %msg.header.action, "message received");

        let follow_ups = {
            let mut guard = self.units.lock().await;
            let Some(units) = guard.as_mut() else {
                return;
            };

            match &msg.body {
                Body::Hello(hello) => vec![units.announce(
                    &hello.endpoint_reference,
                    &hello.types,
                    &hello.xaddrs,
                )],
                Body::Bye(bye) => {
                    units.bye(&bye.endpoint_reference);
                    Vec::new()
                }
                Body::ProbeMatches(matches) => matches
                    .matches
                    .iter()
                    .map(|m| units.announce(&m.endpoint_reference, &m.types, &m.xaddrs))
                    .collect(),
                Body::ResolveMatches(matches) => matches
                    .match_
                    .iter()
                    .map(|m| units.announce(&m.endpoint_reference, &m.types, &m.xaddrs))
                    .collect(),
                // We are a client; probes and resolves from others are
                // not for us to answer.
                Body::Probe(_) | Body::Resolve(_) => Vec::new(),
            }
        };

        for follow_up in follow_ups {
            match follow_up {
                FollowUp::None => {}
                FollowUp::Resolve(epr) => {
                    tokio::spawn(resolve_proc(Arc::clone(self), epr));
                }
                FollowUp::FetchMetadata { xaddr, address } => {
                    tokio::spawn(fetch_metadata_proc(Arc::clone(self), xaddr, address));
                }
            }
        }
    }

    async fn send_probe(&self, msg: &Msg) {
        let bytes = msg.encode();

        if let Err(err) = self.mconn4.send_to(&bytes, multicast_v4()).await {
            if !self.closing.load(Ordering::SeqCst) {
                warn!(error = %err, "IPv4 probe send failed");
            }
        }
        if let Err(err) = self.mconn6.send_to(&bytes, multicast_v6()).await {
            if !self.closing.load(Ordering::SeqCst) {
                debug!(error = %err, "IPv6 probe send failed");
            }
        }
    }
}

// Follows netstate events, joining and leaving the multicast groups
// per interface.
async fn netmon_proc(inner: Arc<Inner>) {
    while let Some(event) = inner.netmon.get().await {
        debug!(event = %event, "network state");

        match event {
            NetEvent::AddPrimaryAddress(addr) => {
                inner.local_addrs.write().unwrap().insert(addr.addr());

                let result = match addr.addr() {
                    IpAddr::V4(_) => inner.mconn4.join(addr.addr(), addr.iface().index()),
                    IpAddr::V6(_) => inner.mconn6.join(addr.addr(), addr.iface().index()),
                };
                if let Err(err) = result {
                    warn!(addr = %addr, error = %err, "multicast join failed");
                }
            }

            NetEvent::DelPrimaryAddress(addr) => {
                inner.local_addrs.write().unwrap().remove(&addr.addr());

                let result = match addr.addr() {
                    IpAddr::V4(_) => inner.mconn4.leave(addr.addr(), addr.iface().index()),
                    IpAddr::V6(_) => inner.mconn6.leave(addr.addr(), addr.iface().index()),
                };
                if let Err(err) = result {
                    debug!(addr = %addr, error = %err, "multicast leave failed");
                }
            }

            NetEvent::InterfaceAdd(_) | NetEvent::InterfaceDel(_) => {}
        }
    }
}

// Receives multicast datagrams from one socket.
async fn mconn_proc(inner: Arc<Inner>, ipv6: bool) {
    let mconn = if ipv6 { &inner.mconn6 } else { &inner.mconn4 };
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];

    loop {
        match mconn.recv_from(&mut buf).await {
            Ok((n, from, ifindex)) => {
                inner.input(&buf[..n], from, ifindex).await;
            }
            Err(err) => {
                if inner.closing.load(Ordering::SeqCst) {
                    return;
                }
                error!(error = %err, "UDP recv failed");
            }
        }
    }
}

// Sends probes on the browse scheduler cadence.
async fn probe_proc(inner: Arc<Inner>) {
    let sched = Sched::browse();
    let mut msg = Msg::probe(Types::device());

    while let Some(event) = sched.next().await {
        match event {
            SchedEvent::NewMessage => msg = Msg::probe(Types::device()),
            SchedEvent::Send => inner.send_probe(&msg).await,
        }
    }
}

// Chases one endpoint with Resolve messages until the resolve
// scheduler gives up.
async fn resolve_proc(inner: Arc<Inner>, epr: crate::msg::EndpointReference) {
    let sched = Sched::resolve();
    let mut msg = Msg::resolve(epr.clone());

    while let Some(event) = sched.next().await {
        match event {
            SchedEvent::NewMessage => msg = Msg::resolve(epr.clone()),
            SchedEvent::Send => inner.send_probe(&msg).await,
        }
    }
}

// Fetches device metadata over HTTP and applies it to the units
// table.
async fn fetch_metadata_proc(inner: Arc<Inner>, xaddr: String, address: String) {
    match metadata::fetch(&xaddr, &address).await {
        Ok(meta) => {
            let mut guard = inner.units.lock().await;
            if let Some(units) = guard.as_mut() {
                units.apply_metadata(&address, &meta);
            }
        }
        Err(err) => {
            warn!(xaddr = %xaddr, error = %err, "metadata fetch failed");
            let mut guard = inner.units.lock().await;
            if let Some(units) = guard.as_mut() {
                units.apply_without_metadata(&address);
            }
        }
    }
}
