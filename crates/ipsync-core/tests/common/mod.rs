//! Test doubles and common utilities for reconciler contract tests
//!
//! The doubles count every call so tests can assert exactly which
//! collaborator was contacted on each tick.

#![allow(dead_code)]

use ipsync_core::error::{Error, Result};
use ipsync_core::reconciler::{ReconcileEvent, ReconcileOutcome, Reconciler};
use ipsync_core::traits::{CurrentRecord, DnsProvider, IpFinder};
use ipsync_core::{ReconcilerConfig, Tick};
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;

/// One scripted answer of a [`ScriptedIpFinder`]
#[derive(Debug, Clone)]
pub enum Discovery {
    /// Return this address
    Ip(Ipv4Addr),
    /// Return no address
    Nothing,
    /// Fail with this message
    Fail(&'static str),
}

/// An IpFinder that replays a script, repeating the last entry forever
pub struct ScriptedIpFinder {
    script: Mutex<VecDeque<Discovery>>,
    last: Mutex<Discovery>,
    call_count: Arc<AtomicUsize>,
}

impl ScriptedIpFinder {
    pub fn new(script: impl IntoIterator<Item = Discovery>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            last: Mutex::new(Discovery::Nothing),
            call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always return the same address
    pub fn fixed(ip: Ipv4Addr) -> Self {
        Self::new([Discovery::Ip(ip)])
    }

    /// Shared handle to the call counter
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.call_count)
    }
}

#[async_trait::async_trait]
impl IpFinder for ScriptedIpFinder {
    async fn find_public_ip(&self) -> Result<Option<Ipv4Addr>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        let next = self.script.lock().unwrap().pop_front();
        let step = match next {
            Some(step) => {
                *self.last.lock().unwrap() = step.clone();
                step
            }
            None => self.last.lock().unwrap().clone(),
        };

        match step {
            Discovery::Ip(ip) => Ok(Some(ip)),
            Discovery::Nothing => Ok(None),
            Discovery::Fail(msg) => Err(Error::ip_finder(msg)),
        }
    }

    fn finder_name(&self) -> &'static str {
        "scripted"
    }
}

/// Shared state behind a [`MockDnsProvider`]
#[derive(Debug, Default)]
struct ProviderState {
    record: Option<Ipv4Addr>,
    record_id: String,
    get_calls: usize,
    writes: Vec<(Ipv4Addr, String)>,
    fail_reads: usize,
    fail_writes: usize,
    write_delay: Option<Duration>,
}

/// A mock DnsProvider holding one A record and recording every call
///
/// A successful write changes the stored record, like a real provider.
pub struct MockDnsProvider {
    state: Arc<Mutex<ProviderState>>,
}

impl MockDnsProvider {
    /// A provider whose record points at `ip` with identifier `record_id`
    pub fn with_record(ip: Ipv4Addr, record_id: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(ProviderState {
                record: Some(ip),
                record_id: record_id.to_string(),
                ..ProviderState::default()
            })),
        }
    }

    /// A provider whose zone holds no A record
    pub fn empty() -> Self {
        Self {
            state: Arc::new(Mutex::new(ProviderState::default())),
        }
    }

    /// Create a new MockDnsProvider that shares state with an existing one
    pub fn sharing_state_with(other: &Self) -> Self {
        Self {
            state: Arc::clone(&other.state),
        }
    }

    /// Fail the next `count` reads
    pub fn fail_next_reads(&self, count: usize) {
        self.state.lock().unwrap().fail_reads = count;
    }

    /// Fail the next `count` writes
    pub fn fail_next_writes(&self, count: usize) {
        self.state.lock().unwrap().fail_writes = count;
    }

    /// Make every write take `delay`
    pub fn delay_writes(&self, delay: Duration) {
        self.state.lock().unwrap().write_delay = Some(delay);
    }

    /// Change the record behind the reconciler's back
    pub fn set_record_externally(&self, ip: Ipv4Addr) {
        self.state.lock().unwrap().record = Some(ip);
    }

    /// Number of current_ipv4() calls
    pub fn get_call_count(&self) -> usize {
        self.state.lock().unwrap().get_calls
    }

    /// Every successful or failed write, in order
    pub fn writes(&self) -> Vec<(Ipv4Addr, String)> {
        self.state.lock().unwrap().writes.clone()
    }

    /// Number of set_a_record_ip() calls
    pub fn set_call_count(&self) -> usize {
        self.state.lock().unwrap().writes.len()
    }

    /// Total number of provider calls
    pub fn total_calls(&self) -> usize {
        self.get_call_count() + self.set_call_count()
    }

    /// The value currently stored in the record
    pub fn record(&self) -> Option<Ipv4Addr> {
        self.state.lock().unwrap().record
    }
}

#[async_trait::async_trait]
impl DnsProvider for MockDnsProvider {
    async fn current_ipv4(&self) -> Result<CurrentRecord> {
        let mut state = self.state.lock().unwrap();
        state.get_calls += 1;

        if state.fail_reads > 0 {
            state.fail_reads -= 1;
            return Err(Error::provider("mock", "Record lookup failed: 500"));
        }

        Ok(CurrentRecord::new(state.record, state.record_id.clone()))
    }

    async fn set_a_record_ip(&self, ip: Ipv4Addr, record_id: &str) -> Result<()> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.writes.push((ip, record_id.to_string()));

            if state.fail_writes > 0 {
                state.fail_writes -= 1;
                return Err(Error::provider("mock", "Failed to update record: 409"));
            }
            state.write_delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.state.lock().unwrap().record = Some(ip);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// A tick source driven by hand, like a ticker that never fires on its own
pub fn manual_ticks() -> (mpsc::Sender<Tick>, ReceiverStream<Tick>) {
    let (tx, rx) = mpsc::channel(8);
    (tx, ReceiverStream::new(rx))
}

/// A finite tick source that ends after `count` ticks
pub fn ticks(count: usize) -> impl Stream<Item = Tick> + Unpin {
    tokio_stream::iter(vec![Tick; count])
}

/// Build a reconciler over the given doubles with default settings
pub fn reconciler(
    finder: ScriptedIpFinder,
    provider: &MockDnsProvider,
) -> (Reconciler, mpsc::Receiver<ReconcileEvent>) {
    Reconciler::new(
        Box::new(finder),
        Box::new(MockDnsProvider::sharing_state_with(provider)),
        &ReconcilerConfig::default(),
    )
    .expect("reconciler construction succeeds")
}

/// Drain every reconciliation outcome currently buffered in the event channel
pub fn drain_outcomes(events: &mut mpsc::Receiver<ReconcileEvent>) -> Vec<ReconcileOutcome> {
    let mut outcomes = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ReconcileEvent::Reconciled(outcome) = event {
            outcomes.push(outcome);
        }
    }
    outcomes
}

pub fn ip(a: u8, b: u8, c: u8, d: u8) -> Ipv4Addr {
    Ipv4Addr::new(a, b, c, d)
}
