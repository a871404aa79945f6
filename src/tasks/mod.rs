//! Background Tasks Module
//!
//! Periodic work that keeps the cache healthy while it serves requests.
//!
//! # Tasks
//! - Expiry sweep: removes expired entries and stale access patterns
//! - Prefetch drain: turns due prefetch items into intents
//! - Prefetch fetcher: optional bridge that loads predicted keys

mod cleanup;
mod prefetch;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

pub use cleanup::spawn_cleanup_task;
pub use prefetch::{spawn_prefetch_fetcher, spawn_prefetch_task};

/// Stop signal shared by a cache and its background loops.
#[derive(Debug, Default)]
pub struct Shutdown {
    triggered: AtomicBool,
    notify: Notify,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wakes every waiting loop. Loops that check later see the flag.
    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Resolves once [`trigger`](Self::trigger) has been called.
    pub async fn wait(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_triggered() {
            return;
        }
        notified.await;
    }
}

/// Ticker whose first tick lands one full period after start.
pub(crate) fn ticker(period_ms: u64) -> Interval {
    let period = Duration::from_millis(period_ms.max(1));
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
