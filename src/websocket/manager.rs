//! Stream supervisor
//!
//! Keeps exactly one healthy streaming connection alive, reconnecting with
//! backoff after failures, until an explicit stop.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::client::{StreamTransport, TransportContext};
use super::keepalive::KeepAlive;
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::cache::BboCache;
use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::metrics::Metrics;

/// Lifecycle of the supervised connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

impl ConnectionState {
    fn gauge_value(self) -> i64 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
            ConnectionState::Closing => 3,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Settings for the supervised stream
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub endpoint: String,
    pub symbols: Vec<String>,
    pub heartbeat_interval: Duration,
    pub connect_timeout: Duration,
    /// Reconnect when nothing arrives for this long
    pub stale_timeout: Duration,
    pub reconnect: ReconnectConfig,
}

impl StreamConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            endpoint: config.ws_endpoint.clone(),
            symbols: config.symbols.clone(),
            heartbeat_interval: Duration::from_millis(config.heartbeat_interval_ms),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            stale_timeout: Duration::from_millis(config.stale_timeout_ms),
            reconnect: ReconnectConfig {
                initial_delay: Duration::from_millis(config.reconnect_delay_ms),
                max_delay: Duration::from_millis(config.max_reconnect_delay_ms),
                multiplier: config.reconnect_backoff_multiplier,
            },
        }
    }
}

enum Lifecycle {
    Idle,
    Running {
        cancel: CancellationToken,
        task: JoinHandle<()>,
    },
    Stopped,
}

/// Owns the transport and heartbeat lifecycle
///
/// `start` and `stop` are serialized through one lock, so overlapping calls
/// never launch a second session.
pub struct StreamSupervisor {
    config: StreamConfig,
    cache: Arc<BboCache>,
    metrics: Arc<Metrics>,
    state: Arc<watch::Sender<ConnectionState>>,
    lifecycle: Mutex<Lifecycle>,
}

impl StreamSupervisor {
    pub fn new(config: StreamConfig, cache: Arc<BboCache>, metrics: Arc<Metrics>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            cache,
            metrics,
            state: Arc::new(state),
            lifecycle: Mutex::new(Lifecycle::Idle),
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Observe state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Launch the connect/reconnect session in the background
    ///
    /// Returns immediately; a second call while a session is live is a no-op.
    /// Fails with `SupervisorStopped` after `stop`.
    pub async fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;

        match &*lifecycle {
            Lifecycle::Running { task, .. } if !task.is_finished() => {
                debug!("Stream supervisor already running");
                return Ok(());
            }
            Lifecycle::Stopped => return Err(RelayError::SupervisorStopped),
            _ => {}
        }

        let cancel = CancellationToken::new();
        let session = Session {
            config: self.config.clone(),
            cache: Arc::clone(&self.cache),
            metrics: Arc::clone(&self.metrics),
            state: Arc::clone(&self.state),
            cancel: cancel.clone(),
        };

        info!(endpoint = %self.config.endpoint, "Starting stream supervisor");
        let task = tokio::spawn(session.run());
        *lifecycle = Lifecycle::Running { cancel, task };

        Ok(())
    }

    /// Stop for good: cancel retries, stop the heartbeat, unsubscribe and
    /// close, then wait for every child task to finish
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let previous = std::mem::replace(&mut *lifecycle, Lifecycle::Stopped);

        if let Lifecycle::Running { cancel, task } = previous {
            info!("Stopping stream supervisor");
            cancel.cancel();
            publish_state(&self.state, &self.metrics, ConnectionState::Closing);

            if let Err(e) = task.await {
                error!(error = %e, "Stream session task failed");
            }
        }

        publish_state(&self.state, &self.metrics, ConnectionState::Disconnected);
        info!("Stream supervisor stopped");
    }
}

fn publish_state(state: &watch::Sender<ConnectionState>, metrics: &Metrics, next: ConnectionState) {
    metrics.connection_state.set(next.gauge_value());
    state.send_replace(next);
}

/// One supervisor session: connect, run until the connection drops, back off, repeat
struct Session {
    config: StreamConfig,
    cache: Arc<BboCache>,
    metrics: Arc<Metrics>,
    state: Arc<watch::Sender<ConnectionState>>,
    cancel: CancellationToken,
}

impl Session {
    async fn run(self) {
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());

        while !self.cancel.is_cancelled() {
            self.set_state(ConnectionState::Connecting);

            let (events_tx, mut events_rx) = mpsc::unbounded_channel();
            let ctx = TransportContext {
                cache: Arc::clone(&self.cache),
                metrics: Arc::clone(&self.metrics),
                events: events_tx.clone(),
                idle_timeout: self.config.stale_timeout,
            };

            let connect = StreamTransport::connect(
                &self.config.endpoint,
                &self.config.symbols,
                self.config.connect_timeout,
                ctx,
            );

            // Dropping the in-flight connect future abandons the attempt
            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => break,
                outcome = connect => outcome,
            };

            match outcome {
                Ok(mut transport) => {
                    self.set_state(ConnectionState::Connected);
                    policy.reset();
                    info!("Stream connected");

                    let mut keepalive = KeepAlive::spawn(
                        transport.sender(),
                        self.config.heartbeat_interval,
                        events_tx,
                        Arc::clone(&self.metrics),
                    );

                    let shutdown = tokio::select! {
                        _ = self.cancel.cancelled() => true,
                        event = events_rx.recv() => {
                            warn!(event = ?event, "Stream connection lost");
                            false
                        }
                    };

                    keepalive.stop().await;
                    transport.disconnect().await;

                    if shutdown {
                        break;
                    }
                    self.metrics.reconnects.inc();
                    self.set_state(ConnectionState::Disconnected);
                }
                Err(e) => {
                    self.set_state(ConnectionState::Disconnected);
                    warn!(error = %e, attempt = policy.attempts() + 1, "Stream connect failed");
                }
            }

            let delay = policy.next_delay();
            info!(delay_ms = delay.as_millis() as u64, "Reconnecting after delay");

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        debug!("Stream session finished");
    }

    /// Transitions after cancellation belong to `stop`
    fn set_state(&self, next: ConnectionState) {
        if !self.cancel.is_cancelled() {
            publish_state(&self.state, &self.metrics, next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> StreamConfig {
        StreamConfig {
            endpoint: "ws://127.0.0.1:1/quote/ws/v2".to_string(),
            symbols: vec!["ETHUSDT".to_string()],
            heartbeat_interval: Duration::from_millis(50),
            connect_timeout: Duration::from_millis(500),
            stale_timeout: Duration::from_secs(45),
            reconnect: ReconnectConfig::fixed(Duration::from_millis(50)),
        }
    }

    fn supervisor() -> StreamSupervisor {
        StreamSupervisor::new(
            unreachable_config(),
            Arc::new(BboCache::new()),
            Arc::new(Metrics::new().unwrap()),
        )
    }

    #[test]
    fn test_stream_config_from_config() {
        let config = Config {
            reconnect_backoff_multiplier: 1,
            ..Config::default()
        };
        let stream = StreamConfig::from_config(&config);
        assert_eq!(stream.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(stream.stale_timeout, Duration::from_secs(45));
        assert_eq!(stream.reconnect.initial_delay, Duration::from_secs(5));
        assert_eq!(stream.reconnect.multiplier, 1);
        assert_eq!(stream.symbols, vec!["ETHUSDT".to_string()]);
    }

    #[tokio::test]
    async fn test_initial_state_is_disconnected() {
        let supervisor = supervisor();
        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
        assert_eq!(supervisor.state().to_string(), "disconnected");
    }

    #[tokio::test]
    async fn test_stop_during_retry_loop_is_terminal() {
        let supervisor = supervisor();
        supervisor.start().await.unwrap();
        sleep(Duration::from_millis(150)).await;

        tokio::time::timeout(Duration::from_secs(2), supervisor.stop())
            .await
            .expect("stop should not hang while retrying");

        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
        assert!(matches!(supervisor.start().await, Err(RelayError::SupervisorStopped)));
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let supervisor = supervisor();
        supervisor.stop().await;
        supervisor.stop().await;
        assert_eq!(supervisor.state(), ConnectionState::Disconnected);
    }
}
