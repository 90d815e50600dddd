//! Network state monitoring.
//!
//! The [`Notifier`] periodically snapshots the host's network
//! interfaces and addresses and diffs successive snapshots into
//! events: interface appeared/disappeared, primary address
//! added/removed.
//!
//! A "primary address" is an address a discovery backend would bind
//! multicast membership to: loopback interfaces and interfaces without
//! multicast capability are excluded. Consumers treat every
//! [`NetEvent::AddPrimaryAddress`] as a cue to join their multicast
//! groups on that interface, and [`NetEvent::DelPrimaryAddress`] to
//! leave.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::net::IpAddr;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default interval between interface snapshots.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Capacity of the event channel. Interface churn is slow; a full
/// channel simply delays the next poll.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// A network interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetIf {
    index: u32,
    name: String,
}

impl NetIf {
    /// Creates an interface handle.
    pub fn new(index: u32, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
        }
    }

    /// Returns the interface index.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Returns the interface name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for NetIf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.index)
    }
}

/// A local address together with the interface that carries it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IfAddr {
    addr: IpAddr,
    iface: NetIf,
}

impl IfAddr {
    /// Creates an interface address.
    pub fn new(addr: IpAddr, iface: NetIf) -> Self {
        Self { addr, iface }
    }

    /// Returns the address.
    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    /// Returns the owning interface.
    pub fn iface(&self) -> &NetIf {
        &self.iface
    }
}

impl fmt::Display for IfAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%{}", self.addr, self.iface)
    }
}

/// Network state change events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetEvent {
    /// A network interface appeared.
    InterfaceAdd(NetIf),

    /// A network interface disappeared.
    InterfaceDel(NetIf),

    /// A primary address appeared on a multicast-capable interface.
    AddPrimaryAddress(IfAddr),

    /// A primary address went away.
    DelPrimaryAddress(IfAddr),
}

impl fmt::Display for NetEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetEvent::InterfaceAdd(nif) => write!(f, "interface added: {}", nif),
            NetEvent::InterfaceDel(nif) => write!(f, "interface deleted: {}", nif),
            NetEvent::AddPrimaryAddress(addr) => write!(f, "primary address added: {}", addr),
            NetEvent::DelPrimaryAddress(addr) => write!(f, "primary address deleted: {}", addr),
        }
    }
}

/// Observes the host's network interfaces and emits [`NetEvent`]s.
///
/// The first snapshot is reported as a burst of add events so that a
/// freshly subscribed consumer learns the current state without a
/// special bootstrap path.
pub struct Notifier {
    rx: async_channel::Receiver<NetEvent>,
    task: JoinHandle<()>,
}

impl Notifier {
    /// Creates a notifier with the default poll interval.
    pub fn new() -> Self {
        Self::with_interval(DEFAULT_POLL_INTERVAL)
    }

    /// Creates a notifier with a custom poll interval.
    pub fn with_interval(interval: Duration) -> Self {
        let (tx, rx) = async_channel::bounded(EVENT_CHANNEL_CAPACITY);

        let task = tokio::spawn(async move {
            let mut previous = Snapshot::default();

            loop {
                match Snapshot::take() {
                    Ok(current) => {
                        for event in previous.diff(&current) {
                            debug!(event = %event, "network state");
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                        previous = current;
                    }
                    Err(err) => warn!(error = %err, "interface snapshot failed"),
                }

                tokio::time::sleep(interval).await;
            }
        });

        Self { rx, task }
    }

    /// Waits for the next network state event.
    ///
    /// Returns `None` after the notifier is closed.
    pub async fn get(&self) -> Option<NetEvent> {
        self.rx.recv().await.ok()
    }

    /// Stops the notifier.
    pub fn close(&self) {
        self.rx.close();
        self.task.abort();
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        self.close();
    }
}

/// One snapshot of interfaces and their primary addresses.
#[derive(Debug, Clone, Default)]
struct Snapshot {
    interfaces: Vec<NetIf>,
    addrs: Vec<IfAddr>,
}

impl Snapshot {
    #[cfg(unix)]
    fn take() -> io::Result<Self> {
        let raw = getifaddrs()?;

        let mut interfaces: Vec<NetIf> = Vec::new();
        let mut addrs = Vec::new();

        for entry in raw {
            if !interfaces.contains(&entry.iface) {
                interfaces.push(entry.iface.clone());
            }

            // Primary addresses exclude loopback and interfaces that
            // cannot carry multicast.
            if entry.loopback || !entry.multicast {
                continue;
            }

            if let Some(addr) = entry.addr {
                addrs.push(IfAddr::new(addr, entry.iface));
            }
        }

        Ok(Self { interfaces, addrs })
    }

    #[cfg(not(unix))]
    fn take() -> io::Result<Self> {
        Ok(Self::default())
    }

    fn diff(&self, current: &Snapshot) -> Vec<NetEvent> {
        let mut events = Vec::new();

        // Address removals first, then interface removals, then
        // interface additions, then address additions: a consumer
        // always sees an interface before its addresses and never
        // after its last address.
        for addr in &self.addrs {
            if !current.addrs.contains(addr) {
                events.push(NetEvent::DelPrimaryAddress(addr.clone()));
            }
        }
        for nif in &self.interfaces {
            if !current.interfaces.contains(nif) {
                events.push(NetEvent::InterfaceDel(nif.clone()));
            }
        }
        for nif in &current.interfaces {
            if !self.interfaces.contains(nif) {
                events.push(NetEvent::InterfaceAdd(nif.clone()));
            }
        }
        for addr in &current.addrs {
            if !self.addrs.contains(addr) {
                events.push(NetEvent::AddPrimaryAddress(addr.clone()));
            }
        }

        events
    }
}

#[cfg(unix)]
struct RawIfAddr {
    iface: NetIf,
    addr: Option<IpAddr>,
    loopback: bool,
    multicast: bool,
}

#[cfg(unix)]
fn getifaddrs() -> io::Result<Vec<RawIfAddr>> {
    use std::ffi::CStr;

    let mut out = Vec::new();
    let mut ifaddrs: *mut libc::ifaddrs = std::ptr::null_mut();

    // SAFETY:
    // - ifaddrs is a valid pointer to a null pointer for getifaddrs to fill
    // - the returned list is freed with freeifaddrs below
    let ret = unsafe { libc::getifaddrs(&mut ifaddrs) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }

    let mut ifa = ifaddrs;
    while !ifa.is_null() {
        // SAFETY: ifa is non-null and points into the getifaddrs list
        let entry = unsafe { &*ifa };

        // SAFETY: ifa_name is non-null and NUL-terminated per getifaddrs
        let name = unsafe { CStr::from_ptr(entry.ifa_name) }
            .to_string_lossy()
            .into_owned();

        let index = match std::ffi::CString::new(name.as_str()) {
            // SAFETY: cstr is a valid NUL-terminated interface name
            Ok(cstr) => unsafe { libc::if_nametoindex(cstr.as_ptr()) },
            Err(_) => 0,
        };

        let addr = if entry.ifa_addr.is_null() {
            None
        } else {
            // SAFETY: ifa_addr is non-null; sa_family selects the layout
            unsafe {
                let sa = &*entry.ifa_addr;
                match sa.sa_family as libc::c_int {
                    libc::AF_INET => {
                        let sin = &*(entry.ifa_addr as *const libc::sockaddr_in);
                        Some(IpAddr::V4(std::net::Ipv4Addr::from(u32::from_be(
                            sin.sin_addr.s_addr,
                        ))))
                    }
                    libc::AF_INET6 => {
                        let sin6 = &*(entry.ifa_addr as *const libc::sockaddr_in6);
                        Some(IpAddr::V6(std::net::Ipv6Addr::from(sin6.sin6_addr.s6_addr)))
                    }
                    _ => None,
                }
            }
        };

        out.push(RawIfAddr {
            iface: NetIf::new(index, name),
            addr,
            loopback: entry.ifa_flags & libc::IFF_LOOPBACK as libc::c_uint != 0,
            multicast: entry.ifa_flags & libc::IFF_MULTICAST as libc::c_uint != 0,
        });

        ifa = entry.ifa_next;
    }

    // SAFETY: ifaddrs came from getifaddrs and has not been freed yet
    unsafe { libc::freeifaddrs(ifaddrs) };

    Ok(out)
}

/// A reference-counted set of network interfaces.
///
/// Backends track how many of their resources (joined groups, local
/// addresses) live on each interface: membership is dropped only when
/// the last reference goes away.
#[derive(Debug, Default)]
pub struct InterfaceSet {
    counts: HashMap<NetIf, usize>,
}

impl InterfaceSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a reference to the interface. Returns the reference count
    /// before the addition.
    pub fn add(&mut self, nif: &NetIf) -> usize {
        let count = self.counts.entry(nif.clone()).or_insert(0);
        let before = *count;
        *count += 1;
        before
    }

    /// Drops a reference to the interface. Returns the reference count
    /// after the removal.
    pub fn del(&mut self, nif: &NetIf) -> usize {
        match self.counts.get_mut(nif) {
            Some(count) => {
                *count = count.saturating_sub(1);
                let after = *count;
                if after == 0 {
                    self.counts.remove(nif);
                }
                after
            }
            None => 0,
        }
    }

    /// Returns the current reference count of the interface.
    pub fn contains(&self, nif: &NetIf) -> usize {
        self.counts.get(nif).copied().unwrap_or(0)
    }

    /// Bulk-adds addresses, deduplicating repeated addresses so each
    /// distinct address contributes one reference to its interface.
    pub fn add_addrs(&mut self, addrs: &[IfAddr]) {
        let mut seen: Vec<&IfAddr> = Vec::new();
        for addr in addrs {
            if !seen.contains(&addr) {
                seen.push(addr);
                self.add(addr.iface());
            }
        }
    }
}
