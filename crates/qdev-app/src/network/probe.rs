//! Port probing and external address discovery

use std::io::ErrorKind;
use std::net::{IpAddr, TcpListener, ToSocketAddrs, UdpSocket};

use qdev_core::prelude::*;

/// Outcome of a single bind attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortStatus {
    Free,
    Occupied,
    /// The host does not map to any local interface
    HostUnavailable(String),
    /// Anything else the socket layer reported
    Failed(String),
}

/// Checks whether a host/port can be bound.
#[cfg_attr(test, mockall::automock)]
pub trait PortProber: Send + Sync {
    fn probe(&self, host: &str, port: u16) -> PortStatus;
}

/// Discovers an address other devices on the network can reach us on.
#[cfg_attr(test, mockall::automock)]
pub trait IpResolver: Send + Sync {
    fn external_ip(&self) -> Result<String>;
}

/// [`PortProber`] that binds a real TCP listener and immediately drops it
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpPortProber;

impl PortProber for TcpPortProber {
    fn probe(&self, host: &str, port: u16) -> PortStatus {
        let addrs: Vec<_> = match (host, port).to_socket_addrs() {
            Ok(addrs) => addrs.collect(),
            Err(e) => return PortStatus::HostUnavailable(e.to_string()),
        };
        let Some(addr) = addrs.first() else {
            return PortStatus::HostUnavailable(format!("{} did not resolve", host));
        };

        match TcpListener::bind(addr) {
            Ok(listener) => {
                drop(listener);
                PortStatus::Free
            }
            // Privileged ports are skipped like taken ones.
            Err(e) if matches!(e.kind(), ErrorKind::AddrInUse | ErrorKind::PermissionDenied) => {
                trace!("{}:{} unavailable: {}", host, port, e);
                PortStatus::Occupied
            }
            Err(e) if e.kind() == ErrorKind::AddrNotAvailable => {
                PortStatus::HostUnavailable(e.to_string())
            }
            Err(e) => PortStatus::Failed(e.to_string()),
        }
    }
}

/// [`IpResolver`] that asks the routing table which local address would be
/// used to reach a public host. No packet is sent.
#[derive(Debug, Clone)]
pub struct RouteIpResolver {
    probe_target: String,
}

impl Default for RouteIpResolver {
    fn default() -> Self {
        Self {
            probe_target: "8.8.8.8:80".to_string(),
        }
    }
}

impl IpResolver for RouteIpResolver {
    fn external_ip(&self) -> Result<String> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(&self.probe_target).map_err(|e| {
            Error::address_unavailable("external", format!("no route to network: {}", e))
        })?;
        let ip = socket.local_addr()?.ip();
        if is_routable(ip) {
            debug!("Discovered external address {}", ip);
            Ok(ip.to_string())
        } else {
            Err(Error::address_unavailable(
                ip.to_string(),
                "no non-loopback network interface found",
            ))
        }
    }
}

fn is_routable(ip: IpAddr) -> bool {
    !ip.is_loopback() && !ip.is_unspecified()
}
