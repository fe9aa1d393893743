//! # Chain Broadcast
//!
//! Fan-out of chain snapshots to every interested observer (open TCP
//! connections, WebSocket clients).
//!
//! Two kinds of notification reach an observer:
//!
//! 1. **Committed** — pushed by the ingest pipeline right after a commit.
//!    Delivery goes through a bounded `tokio::sync::broadcast` channel, so
//!    publishing never waits on a slow reader. A reader that falls more than
//!    the channel capacity behind skips the commits it missed.
//! 2. **Periodic** — every observer re-reads the store on its own timer
//!    (30 s by default) so idle peers still see the current chain. The
//!    timer lives inside the observer; no lock is held while it sleeps.
//!
//! Dropping an [`Observer`] unsubscribes it and stops its timer.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{trace, warn};

use crate::config::{BROADCAST_INTERVAL, NOTIFY_CHANNEL_CAPACITY};
use crate::storage::chain::{ChainSnapshot, ChainStore};

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// What an observer receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "chain", rename_all = "snake_case")]
pub enum Notification {
    /// A commit just happened; this is the chain it produced.
    Committed(ChainSnapshot),
    /// Timer-driven re-send of the current chain.
    Periodic(ChainSnapshot),
}

impl Notification {
    /// The chain carried by this notification.
    pub fn chain(&self) -> &ChainSnapshot {
        match self {
            Notification::Committed(chain) | Notification::Periodic(chain) => chain,
        }
    }
}

// ---------------------------------------------------------------------------
// BroadcastNotifier
// ---------------------------------------------------------------------------

/// Publishing side of the fan-out. Cheap to clone; all clones share one
/// channel.
#[derive(Clone, Debug)]
pub struct BroadcastNotifier {
    store: Arc<ChainStore>,
    tx: broadcast::Sender<ChainSnapshot>,
    interval: Duration,
}

impl BroadcastNotifier {
    /// Notifier with the default capacity and periodic interval.
    pub fn new(store: Arc<ChainStore>) -> Self {
        Self::with_settings(store, NOTIFY_CHANNEL_CAPACITY, BROADCAST_INTERVAL)
    }

    /// Notifier with explicit channel capacity and periodic interval.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or `interval` is zero.
    pub fn with_settings(store: Arc<ChainStore>, capacity: usize, interval: Duration) -> Self {
        assert!(!interval.is_zero(), "broadcast interval must be non-zero");
        let (tx, _) = broadcast::channel(capacity);
        Self {
            store,
            tx,
            interval,
        }
    }

    /// Push a committed snapshot to every current observer.
    ///
    /// Never blocks. Returns how many observers the snapshot was queued
    /// for; zero observers is not an error.
    pub fn publish(&self, snapshot: ChainSnapshot) -> usize {
        let len = snapshot.len();
        match self.tx.send(snapshot) {
            Ok(n) => {
                trace!(observers = n, len, "snapshot published");
                n
            }
            Err(_) => 0,
        }
    }

    /// Register a new observer.
    pub fn subscribe(&self) -> Observer {
        Observer {
            rx: self.tx.subscribe(),
            store: Arc::clone(&self.store),
            period: self.interval,
            ticker: None,
        }
    }

    /// Number of live observers.
    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Periodic re-broadcast interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

/// Receiving side held by one connection.
#[derive(Debug)]
pub struct Observer {
    rx: broadcast::Receiver<ChainSnapshot>,
    store: Arc<ChainStore>,
    period: Duration,
    // Created on first poll so the observer can be built outside a runtime.
    ticker: Option<Interval>,
}

impl Observer {
    /// Wait for the next notification.
    ///
    /// Returns `None` once every [`BroadcastNotifier`] clone is gone.
    /// Cancel-safe: dropping the future loses nothing.
    pub async fn next(&mut self) -> Option<Notification> {
        let period = self.period;
        let Observer {
            rx, store, ticker, ..
        } = self;
        let ticker = ticker.get_or_insert_with(|| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                res = rx.recv() => match res {
                    Ok(snapshot) => return Some(Notification::Committed(snapshot)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "observer lagged behind commits");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                },
                _ = ticker.tick() => {
                    return Some(Notification::Periodic(store.snapshot()));
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
