// # ipsync-core
//
// Core library for keeping a DNS A record pointed at this host.
//
// ## Architecture Overview
//
// - **IpFinder**: Trait for discovering the host's public IPv4 address
// - **DnsProvider**: Trait for reading and overwriting the managed A record
// - **Ticker**: Fixed-interval tick source with at most one pending tick
// - **Reconciler**: The loop that turns ticks into (rare) DNS writes
// - **ProviderRegistry**: Plugin-based registry for providers and finders
//
// ## Design Principles
//
// 1. **Observe, compare, converge**: a write happens only when the public IP
//    differs from both the cache and the provider's record
// 2. **Cheap steady state**: while the IP is unchanged, ticks never reach the
//    provider
// 3. **The tick is the retry**: failures are logged and absorbed; no backoff
// 4. **Library-First**: the daemon is a thin wiring layer over this crate

pub mod config;
pub mod error;
pub mod reconciler;
pub mod registry;
pub mod ticker;
pub mod traits;

// Re-export core types for convenience
pub use config::{IpFinderConfig, ProviderConfig, ReconcilerConfig, SyncConfig};
pub use error::{Error, Result};
pub use reconciler::{ReconcileEvent, ReconcileOutcome, ReconcileStage, Reconciler, StopReason};
pub use registry::ProviderRegistry;
pub use ticker::{Tick, TickStream, Ticker};
pub use traits::{CurrentRecord, DnsProvider, IpFinder};
