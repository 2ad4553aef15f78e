//! Fixed-interval tick source for the reconciler
//!
//! The ticker runs a small timer task that offers a [`Tick`] to a channel of
//! capacity one. A tick that finds the slot occupied is dropped, so a slow
//! consumer sees at most one pending tick and never a backlog.
//!
//! ```text
//! timer task ──try_send──▶ [ slot: 1 ] ──▶ TickStream ──▶ Reconciler::run
//!                 │
//!                 └── slot full → tick dropped
//! ```

use crate::error::{Error, Result};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, trace};

/// A scheduling signal with no payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick;

/// Stream of ticks produced by a [`Ticker`]
///
/// Ends once the ticker has been stopped and any buffered tick was consumed.
#[derive(Debug)]
pub struct TickStream {
    inner: ReceiverStream<Tick>,
}

impl Stream for TickStream {
    type Item = Tick;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Tick>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Periodic tick source
///
/// The first tick fires immediately. Dropping the ticker stops it.
#[derive(Debug)]
pub struct Ticker {
    period: Duration,
    task: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Start a ticker that fires every `period`
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Returns
    ///
    /// A tuple of (ticker, tick_stream). Keep the ticker alive for as long as
    /// ticks are wanted.
    pub fn start(period: Duration) -> Result<(Self, TickStream)> {
        if period.is_zero() {
            return Err(Error::config("Ticker period must be > 0"));
        }

        let (tx, rx) = mpsc::channel(1);

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // A late tick shifts the schedule instead of firing a burst.
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                match tx.try_send(Tick) {
                    Ok(()) => trace!("tick delivered"),
                    Err(TrySendError::Full(_)) => trace!("tick dropped, consumer busy"),
                    Err(TrySendError::Closed(_)) => {
                        debug!("tick receiver dropped, stopping ticker");
                        break;
                    }
                }
            }
        });

        debug!(period = ?period, "ticker started");

        Ok((
            Self {
                period,
                task: Some(task),
            },
            TickStream {
                inner: ReceiverStream::new(rx),
            },
        ))
    }

    /// The configured tick period
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Whether the timer task is still alive
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the ticker
    ///
    /// Idempotent. The tick stream ends after any tick already buffered.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("ticker stopped");
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    const PERIOD: Duration = Duration::from_millis(100);

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_is_immediate() {
        let (_ticker, mut ticks) = Ticker::start(PERIOD).unwrap();

        let started = tokio::time::Instant::now();
        assert_eq!(ticks.next().await, Some(Tick));
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_follow_period() {
        let (_ticker, mut ticks) = Ticker::start(PERIOD).unwrap();

        let started = tokio::time::Instant::now();
        ticks.next().await;
        ticks.next().await;
        ticks.next().await;
        assert_eq!(started.elapsed(), PERIOD * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_consumer_sees_at_most_one_pending_tick() {
        let (_ticker, mut ticks) = Ticker::start(PERIOD).unwrap();

        // Ten periods pass without anyone reading.
        tokio::time::sleep(PERIOD * 10 + PERIOD / 2).await;

        assert_eq!(ticks.next().await, Some(Tick));

        // Nothing else is queued: the next tick only arrives on schedule.
        let pending = tokio::time::timeout(PERIOD / 4, ticks.next()).await;
        assert!(pending.is_err(), "expected no backlog, got {:?}", pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_ends_stream() {
        let (mut ticker, ticks) = Ticker::start(PERIOD).unwrap();
        assert!(ticker.is_running());

        ticker.stop();
        ticker.stop();

        let drained = tokio::time::timeout(Duration::from_secs(5), ticks.collect::<Vec<_>>()).await;
        let remaining = drained.expect("tick stream should end after stop");
        assert!(
            remaining.len() <= 1,
            "at most the buffered tick remains, got {}",
            remaining.len()
        );
        assert!(!ticker.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_ends_stream() {
        let (ticker, ticks) = Ticker::start(PERIOD).unwrap();
        drop(ticker);

        let drained = tokio::time::timeout(Duration::from_secs(5), ticks.collect::<Vec<_>>()).await;
        assert!(drained.is_ok(), "tick stream should end once the ticker is dropped");
    }

    #[tokio::test]
    async fn test_zero_period_rejected() {
        let result = Ticker::start(Duration::ZERO);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
