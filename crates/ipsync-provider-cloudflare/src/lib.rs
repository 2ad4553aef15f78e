// # Cloudflare DNS Provider
//
// Reads and overwrites a single A record through the Cloudflare API v4.
//
// ## Behaviour
//
// - Zone ID is resolved once in `connect` (or taken from configuration)
// - One HTTP request per provider call; no retries, no caching
// - Dry-run mode performs reads and only logs writes
// - HTTP status codes are mapped onto `ipsync_core::Error` variants
//
// ## Security Requirements
//
// - API token NEVER appears in logs or `Debug` output
// - Provider fails fast if the token is empty
//
// ## API Reference
//
// - List Zones: GET `/zones?name=...`
// - List DNS Records: GET `/zones/:zone_id/dns_records?type=A[&name=...]`
// - Patch DNS Record: PATCH `/zones/:zone_id/dns_records/:record_id`

use async_trait::async_trait;
use ipsync_core::config::ProviderConfig;
use ipsync_core::traits::{CurrentRecord, DnsProvider, DnsProviderFactory};
use ipsync_core::{Error, Result};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::time::Duration;

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Default HTTP timeout for API requests (30 seconds)
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const PROVIDER_NAME: &str = "cloudflare";

/// Connection settings for [`CloudflareProvider::connect`]
#[derive(Clone)]
pub struct CloudflareSettings {
    api_token: String,
    zone_name: String,
    zone_id: Option<String>,
    record_name: Option<String>,
    dry_run: bool,
    base_url: String,
}

impl std::fmt::Debug for CloudflareSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareSettings")
            .field("api_token", &"<REDACTED>")
            .field("zone_name", &self.zone_name)
            .field("zone_id", &self.zone_id)
            .field("record_name", &self.record_name)
            .field("dry_run", &self.dry_run)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl CloudflareSettings {
    /// Settings for the zone `zone_name`, authenticated with `api_token`
    pub fn new(api_token: impl Into<String>, zone_name: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            zone_name: zone_name.into(),
            zone_id: None,
            record_name: None,
            dry_run: false,
            base_url: CLOUDFLARE_API_BASE.to_string(),
        }
    }

    /// Use a known zone ID instead of looking it up by name
    pub fn with_zone_id(mut self, zone_id: impl Into<String>) -> Self {
        self.zone_id = Some(zone_id.into());
        self
    }

    /// Only manage the A record with this name
    pub fn with_record_name(mut self, record_name: impl Into<String>) -> Self {
        self.record_name = Some(record_name.into());
        self
    }

    /// Log writes instead of performing them
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Talk to a different API endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

/// Response envelope shared by every Cloudflare API v4 endpoint
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    errors: Option<Vec<ApiMessage>>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
}

#[derive(Debug, Deserialize)]
struct DnsRecord {
    id: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Serialize)]
struct RecordPatch {
    content: String,
}

/// Cloudflare DNS provider bound to one zone
///
/// # Trust Level: Untrusted
///
/// Stateless between calls. The reconciler owns the cache and the retry.
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the provider will:
/// - Perform all GET requests (zone lookup, record lookup)
/// - Log the intended PATCH payload
/// - **NOT** modify the DNS record
pub struct CloudflareProvider {
    /// Cloudflare API token
    /// ⚠️ NEVER log this value
    api_token: String,

    /// Resolved zone ID
    zone_id: String,

    /// Record name filter for lookups
    record_name: Option<String>,

    /// API endpoint without trailing slash
    base_url: String,

    /// HTTP client for API requests
    client: reqwest::Client,

    /// Dry-run mode: if true, perform reads but skip writes
    dry_run: bool,
}

// Custom Debug implementation that hides the API token
impl std::fmt::Debug for CloudflareProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareProvider")
            .field("api_token", &"<REDACTED>")
            .field("zone_id", &self.zone_id)
            .field("record_name", &self.record_name)
            .field("base_url", &self.base_url)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl CloudflareProvider {
    /// Build the HTTP client and resolve the zone
    ///
    /// # Returns
    ///
    /// - `Ok(CloudflareProvider)`: ready to serve reads and writes
    /// - `Err(Error)`: empty token, client construction failure, or the
    ///   zone could not be resolved
    pub async fn connect(settings: CloudflareSettings) -> Result<Self> {
        if settings.api_token.is_empty() {
            return Err(Error::config("Cloudflare API token cannot be empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {e}")))?;

        let mut provider = Self {
            api_token: settings.api_token,
            zone_id: String::new(),
            record_name: settings.record_name.filter(|name| !name.is_empty()),
            base_url: settings.base_url,
            client,
            dry_run: settings.dry_run,
        };

        provider.zone_id = match settings.zone_id.filter(|id| !id.is_empty()) {
            Some(zone_id) => {
                tracing::debug!("Using pre-configured zone ID");
                zone_id
            }
            None => provider.find_zone_id(&settings.zone_name).await?,
        };

        if provider.dry_run {
            tracing::warn!(
                zone_id = %provider.zone_id,
                "Cloudflare provider running in DRY-RUN mode - no changes will be made"
            );
        }

        Ok(provider)
    }

    /// The zone this provider is bound to
    pub fn zone_id(&self) -> &str {
        &self.zone_id
    }

    /// Whether writes are skipped
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Look up the zone ID for a zone name
    ///
    /// ```http
    /// GET /zones?name=example.com
    /// Authorization: Bearer <token>
    /// ```
    async fn find_zone_id(&self, zone_name: &str) -> Result<String> {
        if zone_name.is_empty() {
            return Err(Error::config("Cloudflare zone name cannot be empty"));
        }

        tracing::debug!(zone = zone_name, "Looking up zone ID");

        let request = self
            .client
            .get(format!("{}/zones", self.base_url))
            .query(&[("name", zone_name)]);

        let zones: Vec<Zone> = self.send(request, "Zone lookup").await?;

        let zone = zones
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(format!("failed to find id for zone {zone_name}")))?;

        tracing::debug!(zone = zone_name, zone_id = %zone.id, "Found zone ID");
        Ok(zone.id)
    }

    /// Send an authenticated request and unwrap the response envelope
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        context: &str,
    ) -> Result<T> {
        let response = request
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| Error::http(format!("{context}: request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::http(format!("{context}: failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(map_status(status.as_u16(), &body, context));
        }

        parse_envelope(&body, context)
    }
}

/// Map a non-2xx status onto an error
fn map_status(status: u16, body: &str, context: &str) -> Error {
    match status {
        401 | 403 => Error::auth(format!(
            "{context}: invalid API token or insufficient permissions. Status: {status}"
        )),
        404 => Error::not_found(format!("{context}: {status} - {body}")),
        429 => Error::rate_limited(format!(
            "{context}: rate limit exceeded. Status: {status}"
        )),
        500..=599 => Error::provider(
            PROVIDER_NAME,
            format!("Cloudflare server error (transient): {status} - {body}"),
        ),
        _ => Error::provider(PROVIDER_NAME, format!("{context} failed: {status} - {body}")),
    }
}

/// Decode an API response body, rejecting `success: false`
fn parse_envelope<T: DeserializeOwned>(body: &str, context: &str) -> Result<T> {
    let envelope: Envelope<T> = serde_json::from_str(body)?;

    if !envelope.success {
        let messages = envelope
            .errors
            .unwrap_or_default()
            .iter()
            .map(|e| format!("{} ({})", e.message, e.code))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(Error::provider(
            PROVIDER_NAME,
            format!("{context} rejected: {messages}"),
        ));
    }

    envelope
        .result
        .ok_or_else(|| Error::provider(PROVIDER_NAME, format!("{context}: response has no result")))
}

/// First record wins; content that is not IPv4 reads as no value
fn first_a_record(records: Vec<DnsRecord>) -> CurrentRecord {
    match records.into_iter().next() {
        Some(record) => CurrentRecord::new(record.content.trim().parse().ok(), record.id),
        None => CurrentRecord::missing(),
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    /// ```http
    /// GET /zones/:zone_id/dns_records?type=A&name=home.example.com
    /// ```
    async fn current_ipv4(&self) -> Result<CurrentRecord> {
        let mut request = self
            .client
            .get(format!("{}/zones/{}/dns_records", self.base_url, self.zone_id))
            .query(&[("type", "A")]);
        if let Some(name) = &self.record_name {
            request = request.query(&[("name", name.as_str())]);
        }

        let records: Vec<DnsRecord> = self.send(request, "Record lookup").await?;
        let current = first_a_record(records);

        tracing::debug!(
            zone_id = %self.zone_id,
            record_id = %current.record_id,
            ip = ?current.ip,
            "Fetched A record"
        );

        Ok(current)
    }

    /// ```http
    /// PATCH /zones/:zone_id/dns_records/:record_id
    /// { "content": "1.2.3.4" }
    /// ```
    async fn set_a_record_ip(&self, ip: Ipv4Addr, record_id: &str) -> Result<()> {
        if record_id.is_empty() {
            return Err(Error::invalid_input("Cloudflare record ID cannot be empty"));
        }

        let url = format!(
            "{}/zones/{}/dns_records/{}",
            self.base_url, self.zone_id, record_id
        );
        let patch = RecordPatch {
            content: ip.to_string(),
        };

        if self.dry_run {
            tracing::info!(
                record_id,
                content = %patch.content,
                "[DRY-RUN] Would send PATCH request to {}",
                url
            );
            return Ok(());
        }

        let request = self.client.patch(&url).json(&patch);
        let _: IgnoredAny = self.send(request, "Record update").await?;

        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}

/// Factory for creating Cloudflare providers
pub struct CloudflareFactory;

#[async_trait]
impl DnsProviderFactory for CloudflareFactory {
    async fn create(&self, config: &ProviderConfig) -> Result<Box<dyn DnsProvider>> {
        match config {
            ProviderConfig::Cloudflare {
                api_token,
                zone_name,
                zone_id,
                record_name,
                dry_run,
            } => {
                if api_token.is_empty() {
                    return Err(Error::config("Cloudflare API token is required"));
                }

                let mut settings =
                    CloudflareSettings::new(api_token.clone(), zone_name.clone()).with_dry_run(*dry_run);
                if let Some(zone_id) = zone_id {
                    settings = settings.with_zone_id(zone_id.clone());
                }
                if let Some(record_name) = record_name {
                    settings = settings.with_record_name(record_name.clone());
                }

                Ok(Box::new(CloudflareProvider::connect(settings).await?))
            }
            _ => Err(Error::config("Invalid config for Cloudflare provider")),
        }
    }
}

/// Register the Cloudflare provider with a registry
///
/// # Example
///
/// ```rust
/// use ipsync_core::ProviderRegistry;
///
/// let registry = ProviderRegistry::new();
/// ipsync_provider_cloudflare::register(&registry);
/// assert!(registry.has_provider("cloudflare"));
/// ```
pub fn register(registry: &ipsync_core::ProviderRegistry) {
    registry.register_provider(PROVIDER_NAME, Box::new(CloudflareFactory));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve canned JSON responses in order, recording each request head
    async fn canned_api(responses: Vec<(u16, &'static str)>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);

        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();

                let mut raw = Vec::new();
                let mut buf = [0u8; 1024];
                loop {
                    let n = socket.read(&mut buf).await.unwrap();
                    raw.extend_from_slice(&buf[..n]);
                    let text = String::from_utf8_lossy(&raw).to_string();
                    if let Some(end) = text.find("\r\n\r\n") {
                        let length = text
                            .lines()
                            .find_map(|l| {
                                l.to_ascii_lowercase()
                                    .strip_prefix("content-length:")
                                    .map(|v| v.trim().parse::<usize>().unwrap())
                            })
                            .unwrap_or(0);
                        if raw.len() >= end + 4 + length || n == 0 {
                            break;
                        }
                    }
                    if n == 0 {
                        break;
                    }
                }
                seen.lock().unwrap().push(String::from_utf8_lossy(&raw).to_string());

                let response = format!(
                    "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });

        (base_url, requests)
    }

    fn settings(base_url: &str) -> CloudflareSettings {
        CloudflareSettings::new("secret_token_12345", "example.com").with_base_url(base_url)
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(map_status(401, "", "x"), Error::Authentication(_)));
        assert!(matches!(map_status(403, "", "x"), Error::Authentication(_)));
        assert!(matches!(map_status(404, "", "x"), Error::NotFound(_)));
        assert!(matches!(map_status(429, "", "x"), Error::RateLimited(_)));

        let server_error = map_status(502, "bad gateway", "x");
        assert!(server_error.is_transient());

        let conflict = map_status(409, "busy", "Record update");
        assert!(matches!(conflict, Error::Provider { .. }));
        assert!(!conflict.is_transient());
    }

    #[test]
    fn test_envelope_failure_carries_messages() {
        let body = r#"{"success":false,"errors":[{"code":9109,"message":"Invalid access token"}],"result":null}"#;
        let err = parse_envelope::<Vec<Zone>>(body, "Zone lookup").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Invalid access token"), "{msg}");
        assert!(msg.contains("9109"), "{msg}");
    }

    #[test]
    fn test_envelope_malformed_body() {
        let err = parse_envelope::<Vec<Zone>>("<html>", "Zone lookup").unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn test_first_record_wins() {
        let records: Vec<DnsRecord> = serde_json::from_str(
            r#"[{"id":"rec1","content":"198.51.100.4"},{"id":"rec2","content":"198.51.100.5"}]"#,
        )
        .unwrap();
        assert_eq!(
            first_a_record(records),
            CurrentRecord::new(Some(Ipv4Addr::new(198, 51, 100, 4)), "rec1")
        );
    }

    #[test]
    fn test_unparseable_content_has_no_ip() {
        let records = vec![DnsRecord {
            id: "rec1".to_string(),
            content: "not-an-ip".to_string(),
        }];
        assert_eq!(first_a_record(records), CurrentRecord::new(None, "rec1"));
        assert_eq!(first_a_record(Vec::new()), CurrentRecord::missing());
    }

    #[tokio::test]
    async fn test_empty_token_rejected() {
        let result = CloudflareProvider::connect(CloudflareSettings::new("", "example.com")).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_preconfigured_zone_skips_lookup() {
        let provider = CloudflareProvider::connect(
            settings("http://127.0.0.1:9").with_zone_id("zone123"),
        )
        .await
        .unwrap();

        assert_eq!(provider.zone_id(), "zone123");
        assert_eq!(provider.provider_name(), "cloudflare");
    }

    #[tokio::test]
    async fn test_api_token_not_exposed_in_debug() {
        let provider = CloudflareProvider::connect(
            settings("http://127.0.0.1:9").with_zone_id("zone123"),
        )
        .await
        .unwrap();

        let debug_str = format!("{:?}", provider);
        assert!(!debug_str.contains("secret_token"));
        assert!(debug_str.contains("CloudflareProvider"));

        let settings_str = format!("{:?}", settings("http://127.0.0.1:9"));
        assert!(!settings_str.contains("secret_token"));
    }

    #[tokio::test]
    async fn test_connect_resolves_zone() {
        let (base_url, requests) = canned_api(vec![(
            200,
            r#"{"success":true,"errors":[],"result":[{"id":"zone-abc"}]}"#,
        )])
        .await;

        let provider = CloudflareProvider::connect(settings(&base_url)).await.unwrap();

        assert_eq!(provider.zone_id(), "zone-abc");
        let requests = requests.lock().unwrap();
        assert!(requests[0].starts_with("GET /zones?name=example.com "));
        assert!(requests[0].contains("Bearer secret_token_12345"));
    }

    #[tokio::test]
    async fn test_connect_fails_for_unknown_zone() {
        let (base_url, _) =
            canned_api(vec![(200, r#"{"success":true,"errors":[],"result":[]}"#)]).await;

        let result = CloudflareProvider::connect(settings(&base_url)).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_read_and_write_record() {
        let (base_url, requests) = canned_api(vec![
            (
                200,
                r#"{"success":true,"errors":[],"result":[{"id":"rec1","content":"1.0.0.1"}]}"#,
            ),
            (
                200,
                r#"{"success":true,"errors":[],"result":{"id":"rec1","content":"1.1.1.1"}}"#,
            ),
        ])
        .await;

        let provider = CloudflareProvider::connect(
            settings(&base_url)
                .with_zone_id("zone123")
                .with_record_name("home.example.com"),
        )
        .await
        .unwrap();

        let current = provider.current_ipv4().await.unwrap();
        assert_eq!(current, CurrentRecord::new(Some(Ipv4Addr::new(1, 0, 0, 1)), "rec1"));

        provider
            .set_a_record_ip(Ipv4Addr::new(1, 1, 1, 1), &current.record_id)
            .await
            .unwrap();

        let requests = requests.lock().unwrap();
        assert!(requests[0].starts_with(
            "GET /zones/zone123/dns_records?type=A&name=home.example.com "
        ));
        assert!(requests[1].starts_with("PATCH /zones/zone123/dns_records/rec1 "));
        assert!(requests[1].ends_with(r#"{"content":"1.1.1.1"}"#));
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let (base_url, _) = canned_api(vec![(503, "upstream unavailable")]).await;

        let provider = CloudflareProvider::connect(settings(&base_url).with_zone_id("zone123"))
            .await
            .unwrap();

        let err = provider.current_ipv4().await.unwrap_err();
        assert!(err.is_transient(), "{err}");
    }

    #[tokio::test]
    async fn test_dry_run_skips_write() {
        // No server: any request would fail
        let provider = CloudflareProvider::connect(
            settings("http://127.0.0.1:9")
                .with_zone_id("zone123")
                .with_dry_run(true),
        )
        .await
        .unwrap();

        assert!(provider.is_dry_run());
        provider
            .set_a_record_ip(Ipv4Addr::new(1, 1, 1, 1), "rec1")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_factory_missing_token() {
        let config = ProviderConfig::Cloudflare {
            api_token: String::new(),
            zone_name: "example.com".to_string(),
            zone_id: None,
            record_name: None,
            dry_run: false,
        };

        assert!(CloudflareFactory.create(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_factory_with_zone_id() {
        let config = ProviderConfig::Cloudflare {
            api_token: "test_token".to_string(),
            zone_name: "example.com".to_string(),
            zone_id: Some("test_zone".to_string()),
            record_name: None,
            dry_run: true,
        };

        let provider = CloudflareFactory.create(&config).await.unwrap();
        assert_eq!(provider.provider_name(), "cloudflare");
    }
}
