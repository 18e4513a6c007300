//! Interface selection and SSDP sockets.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use anyhow::{anyhow, Context, Result};
use canon_ssdp_protocol::{MULTICAST_ADDR, SSDP_PORT};
use nix::ifaddrs::getifaddrs;
use nix::net::if_::InterfaceFlags;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// An IPv4 interface candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAddr {
    pub name: String,
    pub addr: Ipv4Addr,
    pub up: bool,
    pub loopback: bool,
}

/// Pick the address to use for `requested`, or the first usable one.
pub fn select_interface(
    candidates: &[InterfaceAddr],
    requested: Option<&str>,
) -> Option<InterfaceAddr> {
    match requested {
        Some(name) => candidates.iter().find(|c| c.name == name).cloned(),
        None => candidates
            .iter()
            .find(|c| c.up && !c.loopback)
            .cloned(),
    }
}

/// IPv4 addresses of the local interfaces.
pub fn ipv4_interfaces() -> Result<Vec<InterfaceAddr>> {
    let addrs = getifaddrs().context("Failed to list network interfaces")?;
    Ok(addrs
        .filter_map(|ifaddr| {
            let addr = ifaddr.address.as_ref()?.as_sockaddr_in()?.ip();
            Some(InterfaceAddr {
                name: ifaddr.interface_name.clone(),
                addr,
                up: ifaddr.flags.contains(InterfaceFlags::IFF_UP),
                loopback: ifaddr.flags.contains(InterfaceFlags::IFF_LOOPBACK),
            })
        })
        .collect())
}

/// Resolve the interface to listen and announce on.
pub fn resolve_interface(requested: Option<&str>) -> Result<InterfaceAddr> {
    let candidates = ipv4_interfaces()?;
    select_interface(&candidates, requested).ok_or_else(|| match requested {
        Some(name) => anyhow!("Interface {name} has no IPv4 address"),
        None => anyhow!("No usable IPv4 interface found"),
    })
}

/// A socket bound to the SSDP port and joined to the multicast group on
/// `interface`. Several sockets in this process may share the port.
pub fn multicast_socket(interface: Ipv4Addr) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, SSDP_PORT)).into())?;
    socket.join_multicast_v4(&MULTICAST_ADDR, &interface)?;
    socket.set_multicast_if_v4(&interface)?;
    socket.set_multicast_ttl_v4(4)?;
    UdpSocket::from_std(socket.into())
}

/// An ephemeral-port socket for sending multicast from `interface` and
/// receiving unicast replies.
pub async fn unicast_socket(interface: Ipv4Addr) -> io::Result<UdpSocket> {
    let socket = UdpSocket::bind(SocketAddrV4::new(interface, 0)).await?;
    socket.set_multicast_ttl_v4(4)?;
    Ok(socket)
}

/// Unpack a `recv_from` result on a buffer of `capacity` bytes.
///
/// Receive errors are logged and yield `None`; the socket stays in use.
pub(crate) fn received_datagram(
    received: io::Result<(usize, SocketAddr)>,
    capacity: usize,
    socket: &'static str,
) -> Option<(usize, SocketAddr)> {
    match received {
        Ok((len, from)) => {
            if len >= capacity {
                debug!(socket, from = %from, len, "Datagram filled the buffer, may be truncated");
            }
            Some((len, from))
        }
        Err(e) => {
            warn!(socket, error = %e, "Failed to receive datagram");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<InterfaceAddr> {
        vec![
            InterfaceAddr {
                name: "lo".to_string(),
                addr: Ipv4Addr::LOCALHOST,
                up: true,
                loopback: true,
            },
            InterfaceAddr {
                name: "eth0".to_string(),
                addr: Ipv4Addr::new(192, 168, 1, 2),
                up: false,
                loopback: false,
            },
            InterfaceAddr {
                name: "wlan0".to_string(),
                addr: Ipv4Addr::new(10, 0, 0, 2),
                up: true,
                loopback: false,
            },
        ]
    }

    #[test]
    fn test_default_interface_skips_loopback_and_down() {
        let selected = select_interface(&candidates(), None).unwrap();
        assert_eq!(selected.name, "wlan0");
    }

    #[test]
    fn test_requested_interface_is_used_verbatim() {
        let selected = select_interface(&candidates(), Some("lo")).unwrap();
        assert_eq!(selected.addr, Ipv4Addr::LOCALHOST);
        assert!(select_interface(&candidates(), Some("eth9")).is_none());
    }

    #[test]
    fn test_receive_error_is_skipped() {
        let err = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert_eq!(received_datagram(Err(err), 2048, "unicast"), None);
    }

    #[test]
    fn test_received_datagram_is_passed_through() {
        let from: SocketAddr = "10.0.0.5:1900".parse().unwrap();
        assert_eq!(received_datagram(Ok((120, from)), 2048, "multicast"), Some((120, from)));
        assert_eq!(received_datagram(Ok((2048, from)), 2048, "multicast"), Some((2048, from)));
    }
}
