// # IP Finder Trait
//
// Defines the interface for discovering the host's public IPv4 address.
//
// ## Implementations
//
// - Network interfaces: `ipsync-ip-iface` crate
// - HTTP echo service: `ipsync-ip-http` crate
// - Any `Fn() -> Result<Option<Ipv4Addr>>` closure
//
// ## Usage
//
// ```rust
// use ipsync_core::IpFinder;
// use std::net::Ipv4Addr;
//
// # async fn demo() -> ipsync_core::Result<()> {
// let finder = || -> ipsync_core::Result<Option<Ipv4Addr>> {
//     Ok(Some(Ipv4Addr::new(203, 0, 113, 7)))
// };
// assert_eq!(finder.find_public_ip().await?, Some(Ipv4Addr::new(203, 0, 113, 7)));
// # Ok(())
// # }
// ```

use async_trait::async_trait;
use std::net::Ipv4Addr;

/// Trait for IP finder implementations
///
/// A finder is polled once per tick, on the reconciler's critical path.
///
/// # Trust Level: Semi-Trusted
///
/// ## Allowed Capabilities
/// - ✅ Perform platform-specific I/O (getifaddrs, sockets, HTTP)
///
/// ## Forbidden Capabilities
/// - ❌ Retry internally or block without a bound
/// - ❌ Spawn tasks
/// - ❌ Decide when to update DNS
#[async_trait]
pub trait IpFinder: Send + Sync {
    /// Discover the host's current public IPv4 address
    ///
    /// # Returns
    ///
    /// - `Ok(Some(ip))`: the public address
    /// - `Ok(None)`: no public address is currently available
    /// - `Err(Error)`: discovery failed
    async fn find_public_ip(&self) -> Result<Option<Ipv4Addr>, crate::Error>;

    /// Get the finder name (for logging/debugging)
    fn finder_name(&self) -> &'static str {
        "custom"
    }
}

#[async_trait]
impl<F> IpFinder for F
where
    F: Fn() -> Result<Option<Ipv4Addr>, crate::Error> + Send + Sync,
{
    async fn find_public_ip(&self) -> Result<Option<Ipv4Addr>, crate::Error> {
        self()
    }

    fn finder_name(&self) -> &'static str {
        "fn"
    }
}

/// Helper trait for constructing IP finders from configuration
pub trait IpFinderFactory: Send + Sync {
    /// Create an IpFinder instance from configuration
    fn create(
        &self,
        config: &crate::config::IpFinderConfig,
    ) -> Result<Box<dyn IpFinder>, crate::Error>;
}
