//! Node identity as seen by the other replica set members

use std::net::{IpAddr, ToSocketAddrs, UdpSocket};

use crate::error::{Error, Result};

/// Advertised `host:port` of this node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdentity {
    pub address: String,
    pub port: u16,
}

impl NodeIdentity {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    /// Use the advertised hostname when configured, the machine IP otherwise
    pub fn resolve(advertised_hostname: Option<&str>, port: u16) -> Result<Self> {
        match advertised_hostname.filter(|h| !h.is_empty()) {
            Some(host) => Ok(Self::new(host, port)),
            None => {
                let ip = machine_ip()?;
                tracing::debug!("No advertised hostname, using machine IP {}", ip);
                Ok(Self::new(ip.to_string(), port))
            }
        }
    }

    /// Member string used in membership commands and status listings
    pub fn member(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl std::fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Address of the interface holding the default route, or of the hostname
/// when there is no route
pub fn machine_ip() -> Result<IpAddr> {
    match default_route_ip() {
        Ok(ip) => Ok(ip),
        Err(e) => {
            tracing::debug!("No default route ({}), resolving the hostname", e);
            hostname_ip()
        }
    }
}

/// Connecting a UDP socket sends nothing; it only makes the kernel pick the
/// outgoing interface.
fn default_route_ip() -> std::io::Result<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect("8.8.8.8:80")?;
    let ip = socket.local_addr()?.ip();
    if ip.is_unspecified() {
        return Err(std::io::Error::new(std::io::ErrorKind::AddrNotAvailable, "unspecified local address"));
    }
    Ok(ip)
}

fn hostname_ip() -> Result<IpAddr> {
    let unknown = |reason: String| Error::Config(format!("Unable to determine machine IP: {}", reason));

    let hostname = nix::unistd::gethostname().map_err(|e| unknown(e.to_string()))?;
    let hostname = hostname.to_string_lossy();
    let addresses = (&*hostname, 0u16)
        .to_socket_addrs()
        .map_err(|e| unknown(format!("{}: {}", hostname, e)))?;

    first_routable(addresses.map(|a| a.ip()))
        .ok_or_else(|| unknown(format!("{} only resolves to loopback addresses", hostname)))
}

/// First address other members could reach
fn first_routable(addresses: impl IntoIterator<Item = IpAddr>) -> Option<IpAddr> {
    addresses
        .into_iter()
        .find(|ip| !ip.is_loopback() && !ip.is_unspecified())
}
