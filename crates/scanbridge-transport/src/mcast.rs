//! UDP multicast socket.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

/// A UDP socket prepared for multicast reception.
///
/// The socket is bound to `ANY:port` with `SO_REUSEADDR` so it can be
/// joined to its multicast group on multiple interfaces at the same
/// time and can coexist with other listeners of the same group.
///
/// [`McastSocket::recv_from`] reports the index of the interface each
/// datagram arrived on, taken from the `IP_PKTINFO` / `IPV6_PKTINFO`
/// ancillary data.
#[derive(Debug)]
pub struct McastSocket {
    socket: UdpSocket,
    group: SocketAddr,
}

impl McastSocket {
    /// Creates a multicast socket for the given group address.
    ///
    /// Fails immediately if the address is not a multicast address.
    pub fn new(group: SocketAddr) -> io::Result<Self> {
        if !group.ip().is_multicast() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} not multicast", group.ip()),
            ));
        }

        let domain = if group.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        if group.is_ipv6() {
            socket.set_only_v6(true)?;
        }
        socket.set_nonblocking(true)?;

        let bind_addr: SocketAddr = if group.is_ipv4() {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), group.port())
        } else {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), group.port())
        };
        socket.bind(&bind_addr.into())?;

        enable_pktinfo(&socket, group.is_ipv6())?;

        let socket = UdpSocket::from_std(socket.into())?;

        Ok(Self { socket, group })
    }

    /// Returns the multicast group address the socket was created for.
    pub fn group(&self) -> SocketAddr {
        self.group
    }

    /// Returns the local port the socket is bound to.
    pub fn local_port(&self) -> io::Result<u16> {
        Ok(self.socket.local_addr()?.port())
    }

    /// Joins the multicast group on the interface identified by the
    /// local address / interface index pair.
    pub fn join(&self, local: IpAddr, ifindex: u32) -> io::Result<()> {
        match (self.group.ip(), local) {
            (IpAddr::V4(group), IpAddr::V4(local)) => {
                self.socket.join_multicast_v4(group, local)
            }
            (IpAddr::V6(group), IpAddr::V6(_)) => {
                self.socket.join_multicast_v6(&group, ifindex)
            }
            (IpAddr::V4(_), _) => Err(family_mismatch("join IPv4 group on IPv6 socket")),
            (IpAddr::V6(_), _) => Err(family_mismatch("join IPv6 group on IPv4 socket")),
        }
    }

    /// Leaves the multicast group on the interface identified by the
    /// local address / interface index pair.
    pub fn leave(&self, local: IpAddr, ifindex: u32) -> io::Result<()> {
        match (self.group.ip(), local) {
            (IpAddr::V4(group), IpAddr::V4(local)) => {
                self.socket.leave_multicast_v4(group, local)
            }
            (IpAddr::V6(group), IpAddr::V6(_)) => {
                self.socket.leave_multicast_v6(&group, ifindex)
            }
            (IpAddr::V4(_), _) => Err(family_mismatch("leave IPv4 group on IPv6 socket")),
            (IpAddr::V6(_), _) => Err(family_mismatch("leave IPv6 group on IPv4 socket")),
        }
    }

    /// Sends a datagram.
    pub async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(buf, target).await
    }

    /// Receives a datagram, returning its length, the source address
    /// and the index of the interface it was received on.
    #[cfg(target_os = "linux")]
    pub async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr, u32)> {
        use std::os::fd::AsRawFd;
        use tokio::io::Interest;

        let fd = self.socket.as_raw_fd();
        self.socket
            .async_io(Interest::READABLE, || recvmsg_pktinfo(fd, buf))
            .await
    }

    /// Receives a datagram. Without pktinfo support the receiving
    /// interface is reported as 0.
    #[cfg(not(target_os = "linux"))]
    pub async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr, u32)> {
        let (n, from) = self.socket.recv_from(buf).await?;
        Ok((n, from, 0))
    }
}

fn family_mismatch(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, format!("can't {}", what))
}

/// Enables reception of packet info ancillary data.
#[cfg(target_os = "linux")]
fn enable_pktinfo(socket: &Socket, is_ipv6: bool) -> io::Result<()> {
    use std::os::fd::AsRawFd;

    let fd = socket.as_raw_fd();
    let val: libc::c_int = 1;
    let (level, option) = if is_ipv6 {
        (libc::IPPROTO_IPV6, libc::IPV6_RECVPKTINFO)
    } else {
        (libc::IPPROTO_IP, libc::IP_PKTINFO)
    };

    // SAFETY:
    // - fd is a valid socket descriptor owned by `socket`
    // - val is a properly initialized c_int on the stack
    // - the option length matches the c_int size
    let ret = unsafe {
        libc::setsockopt(
            fd,
            level,
            option,
            &val as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };

    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(not(target_os = "linux"))]
fn enable_pktinfo(_socket: &Socket, _is_ipv6: bool) -> io::Result<()> {
    Ok(())
}

/// Non-blocking recvmsg that also extracts the receiving interface
/// index from the control messages.
#[cfg(target_os = "linux")]
fn recvmsg_pktinfo(fd: i32, buf: &mut [u8]) -> io::Result<(usize, SocketAddr, u32)> {
    // Control message buffer, aligned for cmsghdr.
    #[repr(C, align(8))]
    struct CmsgBuf([u8; 128]);
    let mut cmsg_buf = CmsgBuf([0u8; 128]);

    let mut name: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    let mut iov = libc::iovec {
        iov_base: buf.as_mut_ptr() as *mut libc::c_void,
        iov_len: buf.len(),
    };

    let mut msg: libc::msghdr = unsafe { std::mem::zeroed() };
    msg.msg_name = &mut name as *mut _ as *mut libc::c_void;
    msg.msg_namelen = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = cmsg_buf.0.as_mut_ptr() as *mut libc::c_void;
    msg.msg_controllen = cmsg_buf.0.len() as _;

    // SAFETY:
    // - fd is a valid nonblocking socket descriptor
    // - all msghdr buffers are initialized above and outlive the call
    let n = unsafe { libc::recvmsg(fd, &mut msg, 0) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }

    let from = sockaddr_to_addr(&name).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "unrecognized source address")
    })?;

    let mut ifindex = 0u32;
    // SAFETY:
    // - msg was populated by a successful recvmsg call
    // - CMSG_FIRSTHDR/CMSG_NXTHDR walk only within msg_control
    unsafe {
        let mut cmsg = libc::CMSG_FIRSTHDR(&msg);
        while !cmsg.is_null() {
            let hdr = &*cmsg;
            if hdr.cmsg_level == libc::IPPROTO_IP && hdr.cmsg_type == libc::IP_PKTINFO {
                let info: libc::in_pktinfo =
                    std::ptr::read_unaligned(libc::CMSG_DATA(cmsg) as *const libc::in_pktinfo);
                ifindex = info.ipi_ifindex as u32;
            } else if hdr.cmsg_level == libc::IPPROTO_IPV6
                && hdr.cmsg_type == libc::IPV6_PKTINFO
            {
                let info: libc::in6_pktinfo =
                    std::ptr::read_unaligned(libc::CMSG_DATA(cmsg) as *const libc::in6_pktinfo);
                ifindex = info.ipi6_ifindex;
            }
            cmsg = libc::CMSG_NXTHDR(&msg, cmsg);
        }
    }

    Ok((n as usize, from, ifindex))
}

#[cfg(target_os = "linux")]
fn sockaddr_to_addr(storage: &libc::sockaddr_storage) -> Option<SocketAddr> {
    match storage.ss_family as libc::c_int {
        libc::AF_INET => {
            // SAFETY: ss_family == AF_INET guarantees sockaddr_in layout
            let sa = unsafe { &*(storage as *const _ as *const libc::sockaddr_in) };
            let ip = Ipv4Addr::from(u32::from_be(sa.sin_addr.s_addr));
            Some(SocketAddr::V4(SocketAddrV4::new(
                ip,
                u16::from_be(sa.sin_port),
            )))
        }
        libc::AF_INET6 => {
            // SAFETY: ss_family == AF_INET6 guarantees sockaddr_in6 layout
            let sa = unsafe { &*(storage as *const _ as *const libc::sockaddr_in6) };
            let ip = Ipv6Addr::from(sa.sin6_addr.s6_addr);
            Some(SocketAddr::V6(SocketAddrV6::new(
                ip,
                u16::from_be(sa.sin6_port),
                sa.sin6_flowinfo,
                sa.sin6_scope_id,
            )))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_non_multicast_address_rejected() {
        let err = McastSocket::new("192.168.1.1:3702".parse().unwrap()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_multicast_socket_creation() {
        let sock = McastSocket::new("239.255.255.250:0".parse().unwrap()).unwrap();
        assert!(sock.local_port().unwrap() > 0);
        assert_eq!(sock.group().ip(), "239.255.255.250".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_two_sockets_share_a_port() {
        // SO_REUSEADDR lets two multicast sockets bind the same port.
        let first = McastSocket::new("239.255.255.250:3999".parse().unwrap()).unwrap();
        let second = McastSocket::new("239.255.255.250:3999".parse().unwrap());
        assert!(second.is_ok(), "second bind failed: {:?}", second.err());
        drop(first);
    }

    #[tokio::test]
    async fn test_join_family_mismatch() {
        let sock = McastSocket::new("239.255.255.250:0".parse().unwrap()).unwrap();
        let err = sock.join("::1".parse().unwrap(), 1).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);

        let sock6 = McastSocket::new("[ff02::c]:0".parse().unwrap()).unwrap();
        let err = sock6.join("127.0.0.1".parse().unwrap(), 1).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_loopback_send_recv() {
        let receiver = McastSocket::new("239.255.255.250:0".parse().unwrap()).unwrap();
        let port = receiver.local_port().unwrap();

        // Plain unicast delivery to the bound port exercises the
        // recvmsg path without requiring multicast routing.
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender
            .send_to(b"probe", format!("127.0.0.1:{}", port))
            .await
            .unwrap();

        let mut buf = [0u8; 64];
        let (n, from, _ifindex) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"probe");
        assert_eq!(from.ip(), "127.0.0.1".parse::<IpAddr>().unwrap());
    }
}
