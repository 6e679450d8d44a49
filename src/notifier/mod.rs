//! Notification loop
//!
//! Periodically fans the cached BBO state out to every subscriber.

mod format;

pub use format::{format_snapshot, format_update};

use async_trait::async_trait;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::BboCache;
use crate::error::Result;
use crate::metrics::Metrics;
use crate::subscribers::{ChatId, SubscriberRegistry};

/// Capability to deliver a text message to one recipient
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, recipient: ChatId, text: &str) -> Result<()>;
}

/// Outcome of a single tick
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// True when the cache was empty and nothing was sent
    pub skipped: bool,
    pub delivered: Vec<ChatId>,
    pub failed: Vec<ChatId>,
}

/// Pushes formatted cache state to subscribers on a fixed cadence
pub struct NotificationLoop {
    cache: Arc<BboCache>,
    registry: Arc<SubscriberRegistry>,
    sender: Arc<dyn MessageSender>,
    metrics: Arc<Metrics>,
    period: Duration,
}

impl NotificationLoop {
    pub fn new(
        cache: Arc<BboCache>,
        registry: Arc<SubscriberRegistry>,
        sender: Arc<dyn MessageSender>,
        metrics: Arc<Metrics>,
        period: Duration,
    ) -> Self {
        Self {
            cache,
            registry,
            sender,
            metrics,
            period,
        }
    }

    /// Tick every `period` until cancelled
    ///
    /// Cancellation is only observed between ticks, so a tick in progress
    /// always finishes its deliveries.
    pub async fn run(self, cancel: CancellationToken) {
        info!(period_secs = self.period.as_secs(), "Starting notification loop");

        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        info!("Notification loop stopped");
    }

    /// Deliver the current cache state to every subscriber once
    ///
    /// Sends run concurrently; each failure is logged and does not affect
    /// the other recipients.
    pub async fn tick(&self) -> TickReport {
        let snapshots = self.cache.get_all();
        if snapshots.is_empty() {
            info!("No BBO data cached yet, skipping notification");
            return TickReport {
                skipped: true,
                ..TickReport::default()
            };
        }

        let recipients = self.registry.ids().await;
        if recipients.is_empty() {
            debug!("No subscribers, nothing to send");
            return TickReport::default();
        }

        let text = format_update(&snapshots);
        let deliveries = recipients.iter().map(|&recipient| {
            let text = text.as_str();
            async move { (recipient, self.sender.send(recipient, text).await) }
        });

        let mut report = TickReport::default();
        for (recipient, outcome) in join_all(deliveries).await {
            match outcome {
                Ok(()) => {
                    self.metrics.record_delivery(true);
                    report.delivered.push(recipient);
                }
                Err(e) => {
                    self.metrics.record_delivery(false);
                    warn!(chat_id = recipient, error = %e, "Failed to deliver BBO update");
                    report.failed.push(recipient);
                }
            }
        }

        debug!(
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "Notification tick complete"
        );
        report
    }
}
