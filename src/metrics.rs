//! Prometheus metrics for the relay

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::error::Result;

/// Counters and gauges shared by the stream and notification tasks
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub frames_applied: IntCounter,
    pub frames_dropped: IntCounter,
    pub heartbeats_sent: IntCounter,
    pub reconnects: IntCounter,
    pub deliveries: IntCounterVec,
    pub connection_state: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("bbo_relay".to_string()), None)?;

        let frames_applied = IntCounter::new("frames_applied_total", "BBO frames written to the cache")?;
        let frames_dropped = IntCounter::new("frames_dropped_total", "Inbound frames dropped as malformed")?;
        let heartbeats_sent = IntCounter::new("heartbeats_sent_total", "Heartbeat frames sent")?;
        let reconnects = IntCounter::new("reconnects_total", "Stream connections lost and retried")?;
        let deliveries = IntCounterVec::new(
            Opts::new("deliveries_total", "Subscriber notifications by outcome"),
            &["outcome"],
        )?;
        let connection_state = IntGauge::new(
            "connection_state",
            "0=disconnected 1=connecting 2=connected 3=closing",
        )?;

        registry.register(Box::new(frames_applied.clone()))?;
        registry.register(Box::new(frames_dropped.clone()))?;
        registry.register(Box::new(heartbeats_sent.clone()))?;
        registry.register(Box::new(reconnects.clone()))?;
        registry.register(Box::new(deliveries.clone()))?;
        registry.register(Box::new(connection_state.clone()))?;

        Ok(Self {
            registry,
            frames_applied,
            frames_dropped,
            heartbeats_sent,
            reconnects,
            deliveries,
            connection_state,
        })
    }

    pub fn record_delivery(&self, ok: bool) {
        let outcome = if ok { "delivered" } else { "failed" };
        self.deliveries.with_label_values(&[outcome]).inc();
    }

    /// Render all metrics in the Prometheus text format
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
