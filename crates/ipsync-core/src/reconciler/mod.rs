//! Reconciliation loop
//!
//! The Reconciler is responsible for:
//! - Polling the IpFinder once per tick
//! - Skipping the provider entirely while the public IP matches the cache
//! - Comparing the public IP against the provider's A record
//! - Overwriting the record when they differ, then updating the cache
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐
//! │   Ticker    │─── Tick ───┐
//! └─────────────┘            │
//!                            ▼
//!                   ┌──────────────┐
//!                   │  Reconciler  │──── ReconcileEvent ───▶ (diagnostics)
//!                   └──────────────┘
//!                     │          │
//!                     ▼          ▼
//!             ┌──────────┐  ┌─────────────┐
//!             │ IpFinder │  │ DnsProvider │
//!             │ (find)   │  │ (get / set) │
//!             └──────────┘  └─────────────┘
//! ```
//!
//! ## Tick Flow
//!
//! 1. Find the public IP; abort on error or absence
//! 2. Equal to the cached IP → done, provider untouched
//! 3. Read the A record; abort on error or missing value
//! 4. Equal to the record → done, cache untouched
//! 5. Write the record; on success cache the new IP
//!
//! Every failure is absorbed until the next tick, which is the only retry.

use crate::config::ReconcilerConfig;
use crate::error::{Error, Result};
use crate::ticker::{Tick, Ticker};
use crate::traits::{DnsProvider, IpFinder};
use std::fmt;
use std::future::Future;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, error, info, warn};

/// Step of a reconciliation at which it was aborted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconcileStage {
    /// Finding the public IP
    Discovery,
    /// Reading the A record from the provider
    ProviderRead,
    /// Writing the A record to the provider
    ProviderWrite,
}

impl fmt::Display for ReconcileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReconcileStage::Discovery => "discovery",
            ReconcileStage::ProviderRead => "provider_read",
            ReconcileStage::ProviderWrite => "provider_write",
        })
    }
}

/// Result of a single reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Public IP matches the cache; the provider was not contacted
    Unchanged { ip: Ipv4Addr },

    /// Public IP matches the A record; nothing was written
    InSync { ip: Ipv4Addr },

    /// The A record was overwritten
    Updated {
        previous: Ipv4Addr,
        current: Ipv4Addr,
    },

    /// Reconciliation was aborted; the cache is untouched
    Failed {
        stage: ReconcileStage,
        reason: String,
    },
}

impl ReconcileOutcome {
    /// Whether this reconciliation was aborted
    pub fn is_failure(&self) -> bool {
        matches!(self, ReconcileOutcome::Failed { .. })
    }
}

/// Why the loop terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The shutdown future completed
    Shutdown,
    /// The tick stream ended
    TicksExhausted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopReason::Shutdown => "shutdown signal",
            StopReason::TicksExhausted => "tick source closed",
        })
    }
}

/// Events emitted by the Reconciler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileEvent {
    /// Loop started
    Started {
        provider: &'static str,
        finder: &'static str,
    },

    /// One tick was processed
    Reconciled(ReconcileOutcome),

    /// Loop stopped
    Stopped { reason: StopReason },
}

/// Reconciles one A record against the host's public IP
///
/// ## Lifecycle
///
/// 1. Create with [`Reconciler::new()`]
/// 2. Drive with [`Reconciler::run()`] (any tick stream) or
///    [`Reconciler::run_with_ticker()`] (fixed interval from config)
/// 3. The loop returns once the shutdown future completes or ticks run out
///
/// ## Threading
///
/// The loop runs on a single task and borrows the reconciler mutably, so the
/// cached IP has exactly one reader and one writer. Other tasks observe the
/// reconciler through the event channel.
pub struct Reconciler {
    /// IP finder queried on every tick
    finder: Box<dyn IpFinder>,

    /// DNS provider holding the managed A record
    provider: Box<dyn DnsProvider>,

    /// Last IP this process wrote to the provider
    last_ip: Option<Ipv4Addr>,

    /// Tick period used by `run_with_ticker`
    interval: Duration,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<ReconcileEvent>,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("finder", &self.finder.finder_name())
            .field("provider", &self.provider.provider_name())
            .field("last_ip", &self.last_ip)
            .field("interval", &self.interval)
            .finish()
    }
}

impl Reconciler {
    /// Create a new reconciler
    ///
    /// # Returns
    ///
    /// A tuple of (reconciler, event_receiver) where event_receiver yields
    /// reconciler events. The receiver may be dropped if nobody is interested.
    pub fn new(
        finder: Box<dyn IpFinder>,
        provider: Box<dyn DnsProvider>,
        config: &ReconcilerConfig,
    ) -> Result<(Self, mpsc::Receiver<ReconcileEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let reconciler = Self {
            finder,
            provider,
            last_ip: None,
            interval: config.interval(),
            event_tx: tx,
        };

        Ok((reconciler, rx))
    }

    /// The IP most recently written to DNS by this reconciler
    pub fn last_ip(&self) -> Option<Ipv4Addr> {
        self.last_ip
    }

    /// Tick period used by [`Reconciler::run_with_ticker()`]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run the loop on a [`Ticker`] with the configured interval
    ///
    /// The ticker is stopped before this returns.
    pub async fn run_with_ticker<F>(&mut self, shutdown: F) -> Result<StopReason>
    where
        F: Future<Output = ()>,
    {
        let (mut ticker, ticks) = Ticker::start(self.interval)?;
        info!(interval = ?self.interval, "ip check");

        let reason = self.run(ticks, shutdown).await;
        ticker.stop();

        Ok(reason)
    }

    /// Run the loop until `shutdown` completes or `ticks` ends
    ///
    /// Ticks are handled one at a time. `shutdown` is only observed between
    /// ticks: an in-flight reconciliation always completes. When a tick and
    /// shutdown are ready together, shutdown wins.
    pub async fn run<S, F>(&mut self, mut ticks: S, shutdown: F) -> StopReason
    where
        S: Stream<Item = Tick> + Unpin,
        F: Future<Output = ()>,
    {
        self.emit_event(ReconcileEvent::Started {
            provider: self.provider.provider_name(),
            finder: self.finder.finder_name(),
        });
        info!(
            provider = self.provider.provider_name(),
            finder = self.finder.finder_name(),
            "reconciler started"
        );

        tokio::pin!(shutdown);

        let reason = loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => break StopReason::Shutdown,

                tick = ticks.next() => match tick {
                    Some(Tick) => {
                        self.reconcile().await;
                    }
                    None => break StopReason::TicksExhausted,
                },
            }
        };

        info!(reason = %reason, "reconciler stopped");
        self.emit_event(ReconcileEvent::Stopped { reason });

        reason
    }

    /// Perform a single reconciliation
    ///
    /// Never fails: aborted reconciliations are logged and reported as
    /// [`ReconcileOutcome::Failed`].
    pub async fn reconcile(&mut self) -> ReconcileOutcome {
        let outcome = self.reconcile_once().await;
        self.emit_event(ReconcileEvent::Reconciled(outcome.clone()));
        outcome
    }

    async fn reconcile_once(&mut self) -> ReconcileOutcome {
        let last_ip = self.last_ip;

        let ip = match self.finder.find_public_ip().await {
            Ok(Some(ip)) => ip,
            Ok(None) => {
                let err = Error::ip_finder("no public IPv4 address found");
                return self.abort(ReconcileStage::Discovery, None, err);
            }
            Err(err) => return self.abort(ReconcileStage::Discovery, None, err),
        };

        if last_ip == Some(ip) {
            debug!(ip = %ip, "public ip unchanged, skipping provider");
            return ReconcileOutcome::Unchanged { ip };
        }

        let current = match self.provider.current_ipv4().await {
            Ok(current) => current,
            Err(err) => return self.abort(ReconcileStage::ProviderRead, Some(ip), err),
        };

        let Some(dns_ip) = current.ip else {
            let err = Error::not_found(format!(
                "no IPv4 value in A record (record_id: {:?})",
                current.record_id
            ));
            return self.abort(ReconcileStage::ProviderRead, Some(ip), err);
        };

        // Cache stays as-is: it only ever mirrors a write made by this process.
        if dns_ip == ip {
            debug!(ip = %ip, "A record already up to date");
            return ReconcileOutcome::InSync { ip };
        }

        if let Err(err) = self.provider.set_a_record_ip(ip, &current.record_id).await {
            return self.abort(ReconcileStage::ProviderWrite, Some(ip), err);
        }

        self.last_ip = Some(ip);
        info!(
            provider = self.provider.provider_name(),
            record_id = %current.record_id,
            previous_content = %dns_ip,
            updated_content = %ip,
            "DNS A record updated"
        );

        ReconcileOutcome::Updated {
            previous: dns_ip,
            current: ip,
        }
    }

    /// Log an aborted reconciliation and turn it into an outcome
    fn abort(&self, stage: ReconcileStage, ip: Option<Ipv4Addr>, err: Error) -> ReconcileOutcome {
        let ip = ip.map(|ip| ip.to_string()).unwrap_or_default();

        if err.is_transient() {
            warn!(
                stage = %stage,
                provider = self.provider.provider_name(),
                finder = self.finder.finder_name(),
                ip = %ip,
                error = %err,
                "reconciliation aborted, retrying on next tick"
            );
        } else {
            error!(
                stage = %stage,
                provider = self.provider.provider_name(),
                finder = self.finder.finder_name(),
                ip = %ip,
                error = %err,
                "reconciliation aborted, retrying on next tick"
            );
        }

        ReconcileOutcome::Failed {
            stage,
            reason: err.to_string(),
        }
    }

    /// Emit a reconciler event
    fn emit_event(&self, event: ReconcileEvent) {
        // A full channel means nobody keeps up with the events; never block
        // the loop on diagnostics.
        if self.event_tx.try_send(event).is_err() && !self.event_tx.is_closed() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}
