//! Heartbeat sender bound to one open connection

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::client::{FrameSender, TransportEvent};
use crate::metrics::Metrics;
use crate::parser::OutboundFrame;

/// Background task sending `{"ping": <epoch-ms>}` on a fixed interval
///
/// The first ping goes out immediately. A failed write is reported as a
/// liveness failure and ends the task; it is never retried here.
pub struct KeepAlive {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl KeepAlive {
    pub fn spawn(
        sender: FrameSender,
        period: Duration,
        events: mpsc::UnboundedSender<TransportEvent>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(sender, period, events, metrics, cancel.clone()));

        Self {
            cancel,
            handle: Some(handle),
        }
    }

    /// Stop the task and wait until it can no longer send
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Heartbeat task failed");
            }
        }
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    sender: FrameSender,
    period: Duration,
    events: mpsc::UnboundedSender<TransportEvent>,
    metrics: Arc<Metrics>,
    cancel: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let now = now_millis();
        if let Err(e) = sender.send(&OutboundFrame::ping(now)).await {
            // stop() may have closed the socket while we were writing
            if !cancel.is_cancelled() {
                warn!(error = %e, "Heartbeat failed, reporting liveness failure");
                let _ = events.send(TransportEvent::LivenessFailure(e.to_string()));
            }
            break;
        }

        metrics.heartbeats_sent.inc();
        debug!(ping = now, "Sent heartbeat");
    }
}

fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}
