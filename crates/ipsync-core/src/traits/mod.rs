//! Core traits for ipsync
//!
//! This module defines the abstract capabilities the reconciler consumes.
//!
//! - [`IpFinder`]: Discover the host's public IPv4 address
//! - [`DnsProvider`]: Read and overwrite the managed A record

pub mod dns_provider;
pub mod ip_finder;

pub use dns_provider::{CurrentRecord, DnsProvider, DnsProviderFactory};
pub use ip_finder::{IpFinder, IpFinderFactory};
