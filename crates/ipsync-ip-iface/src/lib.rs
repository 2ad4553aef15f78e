// # Network Interface IP Finder
//
// Finds the host's public IPv4 address by enumerating the addresses bound to
// local network interfaces (`getifaddrs` through `nix`).
//
// ## Selection Rule
//
// The first IPv4 address, in kernel enumeration order, that is none of:
// private (RFC 1918), link-local, loopback, unspecified, broadcast.
//
// IPv6 addresses are ignored: the managed record is an A record.
//
// ## Platform Support
//
// Unix only. On other platforms the finder builds but every lookup fails.

use async_trait::async_trait;
use ipsync_core::config::IpFinderConfig;
use ipsync_core::traits::{IpFinder, IpFinderFactory};
use ipsync_core::{Error, ProviderRegistry, Result};
use std::net::Ipv4Addr;

/// An IPv4 address bound to a named interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAddr {
    /// Interface name (e.g., "eth0")
    pub name: String,
    /// Address bound to the interface
    pub ip: Ipv4Addr,
}

impl InterfaceAddr {
    pub fn new(name: impl Into<String>, ip: Ipv4Addr) -> Self {
        Self {
            name: name.into(),
            ip,
        }
    }
}

/// Whether `ip` is usable as the target of a public A record
pub fn is_public(ip: Ipv4Addr) -> bool {
    !(ip.is_private()
        || ip.is_link_local()
        || ip.is_loopback()
        || ip.is_unspecified()
        || ip.is_broadcast())
}

/// Pick the first public address, optionally restricted to one interface
pub fn select_public_ipv4<'a>(
    addrs: impl IntoIterator<Item = &'a InterfaceAddr>,
    interface: Option<&str>,
) -> Option<Ipv4Addr> {
    addrs
        .into_iter()
        .filter(|addr| interface.is_none_or(|name| addr.name == name))
        .map(|addr| addr.ip)
        .find(|ip| is_public(*ip))
}

/// Enumerate every IPv4 address bound to a local interface
#[cfg(unix)]
pub fn interface_addrs() -> Result<Vec<InterfaceAddr>> {
    let ifaddrs = nix::ifaddrs::getifaddrs().map_err(|errno| Error::Network(errno.into()))?;

    let addrs = ifaddrs
        .filter_map(|ifaddr| {
            let sin = *ifaddr.address.as_ref()?.as_sockaddr_in()?;
            let ip = *std::net::SocketAddrV4::from(sin).ip();
            Some(InterfaceAddr::new(ifaddr.interface_name, ip))
        })
        .collect();

    Ok(addrs)
}

#[cfg(not(unix))]
pub fn interface_addrs() -> Result<Vec<InterfaceAddr>> {
    Err(Error::ip_finder(
        "Interface enumeration is only supported on Unix",
    ))
}

/// Interface-based IP finder
#[derive(Debug, Clone, Default)]
pub struct InterfaceIpFinder {
    /// Only consider this interface
    interface: Option<String>,
}

impl InterfaceIpFinder {
    /// Create a finder, optionally restricted to one interface
    pub fn new(interface: Option<String>) -> Self {
        Self { interface }
    }
}

#[async_trait]
impl IpFinder for InterfaceIpFinder {
    async fn find_public_ip(&self) -> Result<Option<Ipv4Addr>> {
        let addrs = interface_addrs()
            .map_err(|e| Error::ip_finder(format!("Failed to list interface addresses: {e}")))?;

        let found = select_public_ipv4(&addrs, self.interface.as_deref());

        tracing::debug!(
            interface = self.interface.as_deref().unwrap_or("*"),
            candidates = addrs.len(),
            ip = ?found,
            "Scanned interface addresses"
        );

        Ok(found)
    }

    fn finder_name(&self) -> &'static str {
        "iface"
    }
}

/// Factory for creating interface IP finders
pub struct IfaceFactory;

impl IpFinderFactory for IfaceFactory {
    fn create(&self, config: &IpFinderConfig) -> Result<Box<dyn IpFinder>> {
        match config {
            IpFinderConfig::Iface { interface } => {
                Ok(Box::new(InterfaceIpFinder::new(interface.clone())))
            }
            _ => Err(Error::config("Invalid config for interface IP finder")),
        }
    }
}

/// Register the interface IP finder with a registry
pub fn register(registry: &ProviderRegistry) {
    registry.register_ip_finder("iface", Box::new(IfaceFactory));
}
