// # DNS Provider Trait
//
// Defines the interface for reading and overwriting the managed A record.
//
// ## Implementations
//
// - Cloudflare: `ipsync-provider-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// use ipsync_core::DnsProvider;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let provider = /* DnsProvider implementation */;
//
//     let current = provider.current_ipv4().await?;
//     provider
//         .set_a_record_ip("203.0.113.7".parse()?, &current.record_id)
//         .await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::net::Ipv4Addr;

/// Current state of the managed A record, as reported by the provider
///
/// The `record_id` is opaque: it is only meaningful when handed back to
/// [`DnsProvider::set_a_record_ip`] on the same provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentRecord {
    /// The address the record currently points at, if it exists and parses
    pub ip: Option<Ipv4Addr>,
    /// Provider-assigned record identifier
    pub record_id: String,
}

impl CurrentRecord {
    /// Create a record state
    pub fn new(ip: Option<Ipv4Addr>, record_id: impl Into<String>) -> Self {
        Self {
            ip,
            record_id: record_id.into(),
        }
    }

    /// A record state for a zone that holds no matching A record
    pub fn missing() -> Self {
        Self {
            ip: None,
            record_id: String::new(),
        }
    }
}

/// Trait for DNS provider implementations
///
/// A provider is bound to a single zone (and optionally a single record
/// name) when it is constructed. It exposes exactly two operations: read the
/// current A record, and overwrite it.
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Perform HTTP/HTTPS API calls to their endpoints only
/// - ✅ Parse provider-specific responses
/// - ✅ Return success or failure (the next tick is the retry)
///
/// ## Forbidden Capabilities
/// - ❌ Spawn tasks or threads
/// - ❌ Implement retry logic or backoff
/// - ❌ Cache record state between calls (the reconciler owns the cache)
/// - ❌ Decide whether an update is needed (owned by `Reconciler`)
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Read the current value and identifier of the managed A record
    ///
    /// # Returns
    ///
    /// - `Ok(CurrentRecord)`: the record state; `ip` is `None` when the zone
    ///   has no matching A record or its content is not an IPv4 address
    /// - `Err(Error)`: if the request failed
    async fn current_ipv4(&self) -> Result<CurrentRecord, crate::Error>;

    /// Overwrite the A record identified by `record_id` with `ip`
    ///
    /// # Idempotency
    ///
    /// Calling this repeatedly with the same arguments must be safe.
    async fn set_a_record_ip(&self, ip: Ipv4Addr, record_id: &str) -> Result<(), crate::Error>;

    /// Get the provider name (for logging/debugging)
    fn provider_name(&self) -> &'static str;
}

/// Helper trait for constructing DNS providers from configuration
///
/// Construction is async because providers usually resolve their zone
/// before they can serve requests; a failure here is a startup error.
#[async_trait]
pub trait DnsProviderFactory: Send + Sync {
    /// Create a DnsProvider instance from configuration
    async fn create(
        &self,
        config: &crate::config::ProviderConfig,
    ) -> Result<Box<dyn DnsProvider>, crate::Error>;
}
