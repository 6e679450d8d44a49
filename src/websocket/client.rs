//! Streaming transport for the HashKey quote endpoint
//!
//! Handles connection, the subscription handshake, inbound frame dispatch
//! into the BBO cache, and teardown. The transport never reconnects on its
//! own; close and error events are reported to the supervisor.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::Message,
    MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::cache::BboCache;
use crate::error::{RelayError, Result};
use crate::metrics::Metrics;
use crate::parser::{InboundFrame, OutboundFrame};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Connection-level events consumed by the supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Server closed the connection or the stream ended
    Closed(Option<String>),
    /// Read error on the connection
    Error(String),
    /// A heartbeat could not be written
    LivenessFailure(String),
    /// Nothing was read for the whole idle window
    Stale(Duration),
}

/// Collaborators the transport writes into
#[derive(Clone)]
pub struct TransportContext {
    pub cache: Arc<BboCache>,
    pub metrics: Arc<Metrics>,
    pub events: mpsc::UnboundedSender<TransportEvent>,
    /// Longest allowed gap between inbound frames
    pub idle_timeout: Duration,
}

/// Cloneable write half of an open connection
#[derive(Clone)]
pub struct FrameSender {
    sink: Arc<Mutex<Option<WsSink>>>,
}

impl FrameSender {
    fn new(sink: WsSink) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Some(sink))),
        }
    }

    #[cfg(test)]
    pub(crate) fn closed() -> Self {
        Self {
            sink: Arc::new(Mutex::new(None)),
        }
    }

    /// Write one frame; fails with `RelayError::Send` once the connection is closed
    pub async fn send(&self, frame: &OutboundFrame) -> Result<()> {
        let text = frame.to_json()?;
        let mut guard = self.sink.lock().await;
        let sink = guard
            .as_mut()
            .ok_or_else(|| RelayError::Send("connection is not open".to_string()))?;

        sink.send(Message::Text(text))
            .await
            .map_err(|e| RelayError::Send(e.to_string()))
    }

    pub async fn is_open(&self) -> bool {
        self.sink.lock().await.is_some()
    }

    /// Close the write half. Returns false if it was already closed.
    async fn close(&self) -> bool {
        let sink = self.sink.lock().await.take();
        match sink {
            Some(mut sink) => {
                if let Err(e) = sink.close().await {
                    debug!(error = %e, "Error while closing WebSocket");
                }
                true
            }
            None => false,
        }
    }
}

/// One streaming connection to the exchange
pub struct StreamTransport {
    symbols: Vec<String>,
    sender: FrameSender,
    reader: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl StreamTransport {
    /// Connect and subscribe to the BBO topic for every symbol
    ///
    /// The whole handshake (WebSocket upgrade plus subscribe frames) must
    /// finish within `handshake_timeout`.
    pub async fn connect(
        url: &str,
        symbols: &[String],
        handshake_timeout: Duration,
        ctx: TransportContext,
    ) -> Result<Self> {
        info!(url = %url, symbols = ?symbols, "Connecting to HashKey WebSocket");

        let handshake = async {
            let (ws_stream, response) = connect_async(url).await.map_err(|e| {
                RelayError::Connection(format!("Failed to connect: {}", e))
            })?;
            debug!(status = ?response.status(), "WebSocket upgrade complete");

            let (mut sink, stream) = ws_stream.split();
            for symbol in symbols {
                let frame = OutboundFrame::subscribe(symbol).to_json()?;
                sink.send(Message::Text(frame)).await.map_err(|e| {
                    RelayError::Connection(format!("Failed to subscribe {}: {}", symbol, e))
                })?;
                info!(symbol = %symbol, "Subscribed to BBO topic");
            }

            Ok::<_, RelayError>((sink, stream))
        };

        let (sink, stream) = timeout(handshake_timeout, handshake)
            .await
            .map_err(|_| RelayError::ConnectionTimeout(handshake_timeout))??;

        let cancel = CancellationToken::new();
        let reader = tokio::spawn(read_loop(stream, ctx, cancel.clone()));

        Ok(Self {
            symbols: symbols.to_vec(),
            sender: FrameSender::new(sink),
            reader: Some(reader),
            cancel,
        })
    }

    /// Handle for writing frames on this connection
    pub fn sender(&self) -> FrameSender {
        self.sender.clone()
    }

    /// Unsubscribe if still open, close the socket and wait for the reader
    ///
    /// Safe to call more than once.
    pub async fn disconnect(&mut self) {
        if self.sender.is_open().await {
            for symbol in &self.symbols {
                match self.sender.send(&OutboundFrame::unsubscribe(symbol)).await {
                    Ok(()) => info!(symbol = %symbol, "Unsubscribed from BBO topic"),
                    Err(e) => debug!(symbol = %symbol, error = %e, "Unsubscribe not sent"),
                }
            }
        }

        if self.sender.close().await {
            info!("WebSocket connection closed");
        }

        self.cancel.cancel();
        if let Some(reader) = self.reader.take() {
            if let Err(e) = reader.await {
                error!(error = %e, "Reader task failed");
            }
        }
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn read_loop(mut stream: SplitStream<WsStream>, ctx: TransportContext, cancel: CancellationToken) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = timeout(ctx.idle_timeout, stream.next()) => next,
        };

        let Ok(next) = next else {
            warn!(
                idle_ms = ctx.idle_timeout.as_millis() as u64,
                "No frame received within idle timeout, connection is stale"
            );
            let _ = ctx.events.send(TransportEvent::Stale(ctx.idle_timeout));
            break;
        };

        match next {
            Some(Ok(Message::Text(text))) => on_message(&ctx, &text),
            Some(Ok(Message::Binary(data))) => on_message(&ctx, &String::from_utf8_lossy(&data)),
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {
                trace!("Control frame received");
            }
            Some(Ok(Message::Close(frame))) => {
                warn!(frame = ?frame, "Received close frame");
                let reason = frame.map(|f| f.reason.to_string());
                let _ = ctx.events.send(TransportEvent::Closed(reason));
                break;
            }
            Some(Err(e)) => {
                error!(error = %e, "WebSocket error");
                let _ = ctx.events.send(TransportEvent::Error(e.to_string()));
                break;
            }
            None => {
                warn!("WebSocket stream ended");
                let _ = ctx.events.send(TransportEvent::Closed(None));
                break;
            }
        }
    }
    debug!("Reader task exiting");
}

fn on_message(ctx: &TransportContext, raw: &str) {
    match handle_frame(&ctx.cache, raw) {
        Ok(InboundFrame::Data(_)) => ctx.metrics.frames_applied.inc(),
        Ok(_) => {}
        Err(e) => {
            ctx.metrics.frames_dropped.inc();
            warn!(error = %e, frame = %raw, "Dropping malformed frame");
        }
    }
}

/// Classify one inbound frame and apply it to the cache
///
/// Only a successfully parsed data frame touches the cache.
pub fn handle_frame(cache: &BboCache, raw: &str) -> Result<InboundFrame> {
    let frame = InboundFrame::parse(raw)?;

    match &frame {
        InboundFrame::Heartbeat { pong } => {
            debug!(pong = ?pong, "Heartbeat acknowledged");
        }
        InboundFrame::Data(bbo) => {
            trace!(
                symbol = %bbo.symbol,
                bid = %bbo.bid_price,
                ask = %bbo.ask_price,
                "BBO update"
            );
            cache.update(bbo.clone());
        }
        InboundFrame::Unknown(msg) => {
            debug!(msg = %msg, "Ignoring unrecognised frame");
        }
    }

    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const ETH_FRAME: &str = r#"{"topic":"bbo","data":{"s":"ETHUSDT","b":"3000.5","bz":"1.2","a":"3001.0","az":"0.8","t":1700000000000}}"#;

    #[test]
    fn test_data_frame_updates_cache() {
        let cache = BboCache::new();
        let frame = handle_frame(&cache, ETH_FRAME).unwrap();
        assert_eq!(frame.kind(), "data");

        let bbo = cache.get("ETHUSDT").unwrap();
        assert_eq!(bbo.bid_price, dec!(3000.5));
        assert_eq!(bbo.bid_quantity, dec!(1.2));
        assert_eq!(bbo.ask_price, dec!(3001.0));
        assert_eq!(bbo.ask_quantity, dec!(0.8));
        assert_eq!(bbo.timestamp, 1_700_000_000_000);
    }

    #[test]
    fn test_latest_frame_wins() {
        let cache = BboCache::new();
        handle_frame(&cache, ETH_FRAME).unwrap();
        handle_frame(
            &cache,
            r#"{"topic":"bbo","data":{"s":"ETHUSDT","b":"2999","bz":"3","a":"3000","az":"4","t":1700000000500}}"#,
        )
        .unwrap();

        let bbo = cache.get("ETHUSDT").unwrap();
        assert_eq!(bbo.bid_price, dec!(2999));
        assert_eq!(bbo.timestamp, 1_700_000_000_500);
    }

    #[test]
    fn test_malformed_frame_leaves_cache_unchanged() {
        let cache = BboCache::new();
        handle_frame(&cache, ETH_FRAME).unwrap();
        let before = cache.get_all();

        assert!(handle_frame(&cache, r#"{"topic":"bbo","data":{"s":"ETHUSDT","b":"oops"}}"#).is_err());
        assert!(handle_frame(&cache, r#"{"topic":"bbo","data":{"s":"BTCUSDT","b":"1"}}"#).is_err());
        assert!(handle_frame(&cache, "{truncated").is_err());

        assert_eq!(cache.get_all(), before);
    }

    #[test]
    fn test_pong_and_unknown_do_not_touch_cache() {
        let cache = BboCache::new();
        assert_eq!(handle_frame(&cache, r#"{"pong":1}"#).unwrap().kind(), "heartbeat");
        assert_eq!(handle_frame(&cache, r#"{"code":"0","msg":"Success"}"#).unwrap().kind(), "unknown");
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_endpoint_fails() {
        let (events, _rx) = mpsc::unbounded_channel();
        let ctx = TransportContext {
            cache: Arc::new(BboCache::new()),
            metrics: Arc::new(Metrics::new().unwrap()),
            events,
            idle_timeout: Duration::from_secs(45),
        };

        let result = StreamTransport::connect(
            "ws://127.0.0.1:1/quote/ws/v2",
            &["ETHUSDT".to_string()],
            Duration::from_secs(2),
            ctx,
        )
        .await;

        assert!(matches!(
            result,
            Err(RelayError::Connection(_)) | Err(RelayError::ConnectionTimeout(_))
        ));
    }
}
