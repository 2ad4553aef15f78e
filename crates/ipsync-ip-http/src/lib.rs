// # HTTP IP Finder
//
// Asks an external echo service (e.g., api.ipify.org) for the address the
// host appears from. Useful behind NAT, where no interface carries the
// public address.
//
// One GET per call; no caching, no polling task. The reconciler decides when
// to ask.

use ipsync_core::ProviderRegistry;
use ipsync_core::config::IpFinderConfig;
use ipsync_core::traits::{IpFinder, IpFinderFactory};
use ipsync_core::{Error, Result};

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Echo services known to answer with a bare IPv4 address
pub const DEFAULT_IP_SERVICES: &[&str] = &[
    "https://api.ipify.org",
    "https://ipv4.icanhazip.com",
    "https://ifconfig.me/ip",
];

/// HTTP request timeout
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP-based IP finder
#[derive(Debug, Clone)]
pub struct HttpIpFinder {
    /// URL returning the caller's address as plain text
    url: String,

    /// HTTP client
    client: reqwest::Client,
}

impl HttpIpFinder {
    /// Create a new HTTP IP finder
    ///
    /// # Parameters
    ///
    /// - `url`: URL to fetch the IP from (e.g., "https://api.ipify.org")
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }

    /// The echo service URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Parse an echo service answer
fn parse_ipv4(body: &str) -> Result<Ipv4Addr> {
    let text = body.trim();

    match text.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => Ok(ip),
        Ok(IpAddr::V6(ip)) => Err(Error::ip_finder(format!(
            "Expected IPv4, got: {ip}"
        ))),
        Err(_) => Err(Error::ip_finder(format!("Invalid IP address: {text:?}"))),
    }
}

#[async_trait::async_trait]
impl IpFinder for HttpIpFinder {
    async fn find_public_ip(&self) -> Result<Option<Ipv4Addr>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::http(format!("Request to {} failed: {e}", self.url)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::ip_finder(format!(
                "{} answered with HTTP {status}",
                self.url
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Error::http(format!("Failed to read response: {e}")))?;

        let ip = parse_ipv4(&body)?;
        tracing::debug!(url = %self.url, ip = %ip, "Echo service answered");

        Ok(Some(ip))
    }

    fn finder_name(&self) -> &'static str {
        "http"
    }
}

/// Factory for creating HTTP IP finders
pub struct HttpFactory;

impl IpFinderFactory for HttpFactory {
    fn create(&self, config: &IpFinderConfig) -> Result<Box<dyn IpFinder>> {
        match config {
            IpFinderConfig::Http { url } => Ok(Box::new(HttpIpFinder::new(url.clone())?)),
            _ => Err(Error::config("Invalid config for HTTP IP finder")),
        }
    }
}

/// Register the HTTP IP finder with a registry
pub fn register(registry: &ProviderRegistry) {
    registry.register_ip_finder("http", Box::new(HttpFactory));
}
