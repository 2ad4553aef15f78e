//! Configuration types for ipsync
//!
//! Configuration is loaded once at startup and never hot-reloaded.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main ipsync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// DNS provider configuration
    pub provider: ProviderConfig,

    /// IP finder configuration
    #[serde(default)]
    pub ip_finder: IpFinderConfig,

    /// Reconciler settings
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
}

impl SyncConfig {
    /// Create a configuration for the given provider with default settings
    pub fn new(provider: ProviderConfig) -> Self {
        Self {
            provider,
            ip_finder: IpFinderConfig::default(),
            reconciler: ReconcilerConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.provider.validate()?;
        self.ip_finder.validate()?;
        self.reconciler.validate()?;

        Ok(())
    }
}

/// DNS provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Cloudflare provider
    Cloudflare {
        /// Cloudflare API token
        api_token: String,
        /// Name of the zone holding the A record (e.g., "example.com")
        zone_name: String,
        /// Zone ID; skips the zone lookup at startup when set
        #[serde(default)]
        zone_id: Option<String>,
        /// Record name to manage; the first A record of the zone when unset
        #[serde(default)]
        record_name: Option<String>,
        /// Perform reads but only log the writes
        #[serde(default)]
        dry_run: bool,
    },

    /// Custom provider
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ProviderConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProviderConfig::Cloudflare {
                api_token,
                zone_name,
                zone_id,
                ..
            } => {
                if api_token.is_empty() {
                    return Err(crate::Error::config("Cloudflare API token cannot be empty"));
                }
                if zone_name.is_empty() && zone_id.as_deref().is_none_or(str::is_empty) {
                    return Err(crate::Error::config(
                        "Cloudflare provider needs a zone name or a zone ID",
                    ));
                }
                Ok(())
            }
            ProviderConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom provider factory cannot be empty",
                    ));
                }
                if config.is_null() {
                    return Err(crate::Error::config(
                        "Custom provider config cannot be null",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Cloudflare { .. } => "cloudflare",
            ProviderConfig::Custom { factory, .. } => factory,
        }
    }
}

/// IP finder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpFinderConfig {
    /// Scan local network interfaces
    Iface {
        /// Only consider this interface (e.g., "eth0")
        #[serde(default)]
        interface: Option<String>,
    },

    /// Ask an HTTP echo service
    Http {
        /// URL returning the caller's address as plain text
        url: String,
    },

    /// Custom IP finder
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl IpFinderConfig {
    /// Validate the IP finder configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            IpFinderConfig::Iface { interface } => {
                if interface.as_deref().is_some_and(str::is_empty) {
                    return Err(crate::Error::config("Interface name cannot be empty"));
                }
                Ok(())
            }
            IpFinderConfig::Http { url } => {
                if url.is_empty() {
                    return Err(crate::Error::config("HTTP IP finder URL cannot be empty"));
                }
                if !url.starts_with("https://") && !url.starts_with("http://") {
                    return Err(crate::Error::config(format!(
                        "HTTP IP finder URL must use HTTP or HTTPS scheme. Got: {url}"
                    )));
                }
                Ok(())
            }
            IpFinderConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(crate::Error::config(
                        "Custom IP finder factory cannot be empty",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Get the IP finder type name
    pub fn type_name(&self) -> &str {
        match self {
            IpFinderConfig::Iface { .. } => "iface",
            IpFinderConfig::Http { .. } => "http",
            IpFinderConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for IpFinderConfig {
    fn default() -> Self {
        IpFinderConfig::Iface { interface: None }
    }
}

/// Reconciler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Time between two reconciliation attempts (in milliseconds)
    ///
    /// This is also the longest time a failure waits before it is retried.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Capacity of the diagnostic event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl ReconcilerConfig {
    /// The polling interval as a [`Duration`]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Validate the reconciler configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.interval_ms == 0 {
            return Err(crate::Error::config("Reconcile interval must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_interval_ms() -> u64 {
    300
}

fn default_event_channel_capacity() -> usize {
    100
}
