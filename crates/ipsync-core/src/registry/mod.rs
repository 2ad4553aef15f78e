//! Plugin-based provider registry
//!
//! The registry allows DNS providers and IP finders to be registered
//! dynamically at runtime, avoiding hardcoded if-else chains in the daemon.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ipsync_core::registry::ProviderRegistry;
//!
//! let registry = ProviderRegistry::new();
//!
//! // Implementation crates register themselves
//! ipsync_provider_cloudflare::register(&registry);
//! ipsync_ip_iface::register(&registry);
//!
//! // Build the collaborators from configuration
//! let provider = registry.create_provider(&config.provider).await?;
//! let finder = registry.create_ip_finder(&config.ip_finder)?;
//! ```

use crate::config::{IpFinderConfig, ProviderConfig};
use crate::error::{Error, Result};
use crate::traits::{DnsProvider, DnsProviderFactory, IpFinder, IpFinderFactory};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Provider registry for plugin-based collaborator creation
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes. Provider factories are stored behind `Arc`
/// so that no lock is held across the await in [`ProviderRegistry::create_provider`].
#[derive(Default)]
pub struct ProviderRegistry {
    /// Registered DNS provider factories
    providers: RwLock<HashMap<String, Arc<dyn DnsProviderFactory>>>,

    /// Registered IP finder factories
    ip_finders: RwLock<HashMap<String, Box<dyn IpFinderFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a DNS provider factory
    ///
    /// # Parameters
    ///
    /// - `name`: Provider type name (e.g., "cloudflare")
    /// - `factory`: Factory object for creating provider instances
    pub fn register_provider(&self, name: impl Into<String>, factory: Box<dyn DnsProviderFactory>) {
        let mut providers = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        providers.insert(name.into(), Arc::from(factory));
    }

    /// Register an IP finder factory
    ///
    /// # Parameters
    ///
    /// - `name`: IP finder type name (e.g., "iface", "http")
    /// - `factory`: Factory object for creating IP finder instances
    pub fn register_ip_finder(&self, name: impl Into<String>, factory: Box<dyn IpFinderFactory>) {
        let mut finders = self.ip_finders.write().unwrap_or_else(PoisonError::into_inner);
        finders.insert(name.into(), factory);
    }

    /// Create a DNS provider from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn DnsProvider>)`: Created provider instance
    /// - `Err(Error)`: If provider type is not registered or creation fails
    pub async fn create_provider(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        let provider_type = config.type_name();

        // Release the lock before calling async create
        let factory = {
            let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
            providers
                .get(provider_type)
                .cloned()
                .ok_or_else(|| Error::config(format!("Unknown provider type: {}", provider_type)))?
        };

        factory.create(config).await
    }

    /// Create an IP finder from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn IpFinder>)`: Created IP finder instance
    /// - `Err(Error)`: If finder type is not registered or creation fails
    pub fn create_ip_finder(&self, config: &IpFinderConfig) -> Result<Box<dyn IpFinder>> {
        let finder_type = config.type_name();
        let finders = self.ip_finders.read().unwrap_or_else(PoisonError::into_inner);

        let factory = finders
            .get(finder_type)
            .ok_or_else(|| Error::config(format!("Unknown IP finder type: {}", finder_type)))?;

        factory.create(config)
    }

    /// List all registered provider types
    pub fn list_providers(&self) -> Vec<String> {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers.keys().cloned().collect()
    }

    /// List all registered IP finder types
    pub fn list_ip_finders(&self) -> Vec<String> {
        let finders = self.ip_finders.read().unwrap_or_else(PoisonError::into_inner);
        finders.keys().cloned().collect()
    }

    /// Check if a provider type is registered
    pub fn has_provider(&self, name: &str) -> bool {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers.contains_key(name)
    }

    /// Check if an IP finder type is registered
    pub fn has_ip_finder(&self, name: &str) -> bool {
        let finders = self.ip_finders.read().unwrap_or_else(PoisonError::into_inner);
        finders.contains_key(name)
    }
}
