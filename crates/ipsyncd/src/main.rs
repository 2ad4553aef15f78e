// # ipsyncd - DNS A record sync daemon
//
// Thin integration layer over ipsync-core. No DNS logic lives here.
//
// The ipsyncd daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Registering providers and IP finders
// 4. Running the reconciler until SIGTERM/SIGINT
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Reconciler
// - `IPSYNC_INTERVAL_MS`: Time between IP checks in milliseconds (default 300)
// - `IPSYNC_EVENT_CHANNEL_CAPACITY`: Diagnostic event buffer (default 100)
// - `IPSYNC_MODE`: `live` (default) or `dry-run` to log writes instead of performing them
//
// ### DNS Provider
// - `IPSYNC_PROVIDER_TYPE`: Provider type (cloudflare)
// - `IPSYNC_PROVIDER_API_TOKEN`: API token (falls back to `CLOUDFLARE_API_TOKEN`)
// - `IPSYNC_DNS_ZONE`: Zone holding the A record (e.g., example.com)
// - `IPSYNC_PROVIDER_ZONE_ID`: Zone ID; skips the zone lookup (optional)
// - `IPSYNC_RECORD_NAME`: A record to manage (optional, first A record otherwise)
//
// ### IP Finder
// - `IPSYNC_IP_FINDER_TYPE`: Type of IP finder (iface, http)
// - `IPSYNC_IP_FINDER_INTERFACE`: Only consider this interface (for iface)
// - `IPSYNC_IP_FINDER_URL`: Echo service URL (for http)
//
// ### Logging
// - `IPSYNC_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export IPSYNC_DNS_ZONE=example.com
// export IPSYNC_RECORD_NAME=home.example.com
// export CLOUDFLARE_API_TOKEN=your_token
//
// ipsyncd
// ```

use anyhow::{Context, Result};
use ipsync_core::{
    IpFinderConfig, ProviderConfig, ProviderRegistry, ReconcileEvent, Reconciler,
    ReconcilerConfig, StopReason, SyncConfig,
};
use std::env;
use std::future::Future;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tracing::{Level, error, info, trace};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IpsyncExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<IpsyncExitCode> for ExitCode {
    fn from(code: IpsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    interval_ms: u64,
    event_channel_capacity: usize,
    mode: String,
    provider_type: String,
    provider_api_token: String,
    dns_zone: String,
    provider_zone_id: Option<String>,
    record_name: Option<String>,
    ip_finder_type: String,
    ip_finder_interface: Option<String>,
    ip_finder_url: Option<String>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Ok(Self {
            interval_ms: parse_var(&var, "IPSYNC_INTERVAL_MS")?
                .unwrap_or_else(|| ReconcilerConfig::default().interval_ms),
            event_channel_capacity: parse_var(&var, "IPSYNC_EVENT_CHANNEL_CAPACITY")?
                .unwrap_or_else(|| ReconcilerConfig::default().event_channel_capacity),
            mode: var("IPSYNC_MODE").unwrap_or_else(|| "live".to_string()),
            provider_type: var("IPSYNC_PROVIDER_TYPE").unwrap_or_else(|| "cloudflare".to_string()),
            provider_api_token: var("IPSYNC_PROVIDER_API_TOKEN")
                .or_else(|| var("CLOUDFLARE_API_TOKEN"))
                .unwrap_or_default(),
            dns_zone: var("IPSYNC_DNS_ZONE").unwrap_or_default(),
            provider_zone_id: var("IPSYNC_PROVIDER_ZONE_ID"),
            record_name: var("IPSYNC_RECORD_NAME"),
            ip_finder_type: var("IPSYNC_IP_FINDER_TYPE").unwrap_or_else(|| "iface".to_string()),
            ip_finder_interface: var("IPSYNC_IP_FINDER_INTERFACE"),
            ip_finder_url: var("IPSYNC_IP_FINDER_URL"),
            log_level: var("IPSYNC_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    ///
    /// Checks what the core configuration types cannot know about:
    /// variable names in messages, placeholder tokens, domain syntax.
    fn validate(&self) -> Result<()> {
        if self.provider_api_token.is_empty() {
            anyhow::bail!(
                "IPSYNC_PROVIDER_API_TOKEN is required. \
                Set it via: export IPSYNC_PROVIDER_API_TOKEN=your_token \
                (or CLOUDFLARE_API_TOKEN)"
            );
        }

        let token_lower = self.provider_api_token.to_lowercase();
        if token_lower.contains("your_token")
            || token_lower.contains("replace_me")
            || token_lower == "token"
        {
            anyhow::bail!(
                "IPSYNC_PROVIDER_API_TOKEN appears to be a placeholder. \
                Use an actual API token from your DNS provider."
            );
        }

        match self.provider_type.as_str() {
            "cloudflare" => {}
            _ => anyhow::bail!(
                "IPSYNC_PROVIDER_TYPE '{}' is not supported. \
                Supported providers: cloudflare",
                self.provider_type
            ),
        }

        if self.dns_zone.is_empty() && self.provider_zone_id.is_none() {
            anyhow::bail!(
                "IPSYNC_DNS_ZONE is required. \
                Set it via: export IPSYNC_DNS_ZONE=example.com"
            );
        }
        if !self.dns_zone.is_empty() {
            validate_domain_name(&self.dns_zone).context("Invalid IPSYNC_DNS_ZONE")?;
        }
        if let Some(record) = &self.record_name {
            validate_domain_name(record).context("Invalid IPSYNC_RECORD_NAME")?;
        }

        match self.ip_finder_type.as_str() {
            "iface" => {}
            "http" => {
                if self.ip_finder_url.is_none() {
                    anyhow::bail!("IPSYNC_IP_FINDER_URL is required when IPSYNC_IP_FINDER_TYPE=http");
                }
            }
            _ => anyhow::bail!(
                "IPSYNC_IP_FINDER_TYPE '{}' is not supported. \
                Supported types: iface, http",
                self.ip_finder_type
            ),
        }

        if self.interval_ms == 0 {
            anyhow::bail!("IPSYNC_INTERVAL_MS must be greater than 0");
        }

        parse_mode(&self.mode)?;
        parse_log_level(&self.log_level)?;

        Ok(())
    }

    /// Whether writes are only logged
    fn is_dry_run(&self) -> bool {
        matches!(parse_mode(&self.mode), Ok(true))
    }

    /// Build the core configuration
    fn to_sync_config(&self) -> SyncConfig {
        let provider = ProviderConfig::Cloudflare {
            api_token: self.provider_api_token.clone(),
            zone_name: self.dns_zone.clone(),
            zone_id: self.provider_zone_id.clone(),
            record_name: self.record_name.clone(),
            dry_run: self.is_dry_run(),
        };

        let ip_finder = match self.ip_finder_type.as_str() {
            "http" => IpFinderConfig::Http {
                url: self.ip_finder_url.clone().unwrap_or_default(),
            },
            _ => IpFinderConfig::Iface {
                interface: self.ip_finder_interface.clone(),
            },
        };

        SyncConfig {
            provider,
            ip_finder,
            reconciler: ReconcilerConfig {
                interval_ms: self.interval_ms,
                event_channel_capacity: self.event_channel_capacity,
            },
        }
    }
}

/// Parse an optional numeric variable; a malformed value is an error
fn parse_var<T>(var: impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("{key} must be a number. Got: {raw}"))
        })
        .transpose()
}

/// Parse `IPSYNC_MODE`; `true` means dry-run
fn parse_mode(mode: &str) -> Result<bool> {
    match mode.to_lowercase().as_str() {
        "live" => Ok(false),
        "dry-run" => Ok(true),
        _ => anyhow::bail!(
            "IPSYNC_MODE '{}' is not valid. \
            Valid modes: live, dry-run",
            mode
        ),
    }
}

fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!(
            "IPSYNC_LOG_LEVEL '{}' is not valid. \
            Valid levels: trace, debug, info, warn, error",
            level
        ),
    }
}

/// Validate that a string is a valid domain name
///
/// Basic RFC 1035 checks; catches typos, not every invalid name.
fn validate_domain_name(domain: &str) -> Result<()> {
    let domain = domain.strip_suffix('.').unwrap_or(domain);

    if domain.is_empty() {
        anyhow::bail!("Domain name cannot be empty");
    }

    if domain.len() > 253 {
        anyhow::bail!(
            "Domain name too long: {} chars (max 253). Got: {}",
            domain.len(),
            domain
        );
    }

    for label in domain.split('.') {
        if label.is_empty() {
            anyhow::bail!("Domain name has empty label: '{}'", domain);
        }

        if label.len() > 63 {
            anyhow::bail!(
                "Domain label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            );
        }

        // Underscore is allowed for service labels
        if !label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            anyhow::bail!(
                "Domain label contains invalid characters. Label: '{}'. \
                Valid: alphanumeric, hyphen and underscore only.",
                label
            );
        }

        if label.starts_with('-') || label.ends_with('-') {
            anyhow::bail!(
                "Domain label cannot start or end with hyphen. Label: '{}'",
                label
            );
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return IpsyncExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return IpsyncExitCode::ConfigError.into();
    }

    let sync_config = config.to_sync_config();
    if let Err(e) = sync_config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return IpsyncExitCode::ConfigError.into();
    }

    let log_level = parse_log_level(&config.log_level).unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return IpsyncExitCode::ConfigError.into();
    }

    info!(
        provider = sync_config.provider.type_name(),
        ip_finder = sync_config.ip_finder.type_name(),
        zone = %config.dns_zone,
        interval_ms = config.interval_ms,
        dry_run = config.is_dry_run(),
        "Starting ipsyncd"
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return IpsyncExitCode::RuntimeError.into();
        }
    };

    let code = rt.block_on(async {
        let (reconciler, events) = match start(&sync_config).await {
            Ok(started) => started,
            Err(e) => {
                error!("Startup failed: {:#}", e);
                return IpsyncExitCode::ConfigError;
            }
        };

        match serve(reconciler, events).await {
            Ok(reason) => {
                info!(reason = %reason, "Shutting down ipsyncd");
                IpsyncExitCode::CleanShutdown
            }
            Err(e) => {
                error!("Daemon error: {:#}", e);
                IpsyncExitCode::RuntimeError
            }
        }
    });

    code.into()
}

/// Register collaborators and build the reconciler
///
/// Any failure here (unknown type, zone lookup) is a startup error.
async fn start(config: &SyncConfig) -> Result<(Reconciler, mpsc::Receiver<ReconcileEvent>)> {
    let registry = ProviderRegistry::new();

    #[cfg(feature = "cloudflare")]
    ipsync_provider_cloudflare::register(&registry);

    #[cfg(feature = "iface")]
    ipsync_ip_iface::register(&registry);

    #[cfg(feature = "http")]
    ipsync_ip_http::register(&registry);

    info!(
        providers = ?registry.list_providers(),
        ip_finders = ?registry.list_ip_finders(),
        "Registered plugins"
    );

    let finder = registry
        .create_ip_finder(&config.ip_finder)
        .context("Failed to create IP finder")?;
    let provider = registry
        .create_provider(&config.provider)
        .await
        .context("Failed to create DNS provider")?;

    Reconciler::new(finder, provider, &config.reconciler).context("Failed to create reconciler")
}

/// Run the reconciler until a shutdown signal arrives
async fn serve(
    mut reconciler: Reconciler,
    mut events: mpsc::Receiver<ReconcileEvent>,
) -> Result<StopReason> {
    let shutdown = shutdown_signal()?;

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            trace!(?event, "Reconciler event");
        }
    });

    let reason = reconciler.run_with_ticker(shutdown).await?;
    Ok(reason)
}

/// Install SIGTERM/SIGINT handlers and wait for either
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;

    Ok(async move {
        let name = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };
        info!(signal = name, "Received shutdown signal");
    })
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    Ok(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!(signal = "SIGINT", "Received shutdown signal"),
            Err(e) => error!("Failed to wait for CTRL-C: {}", e),
        }
    })
}
