//! Health and metrics HTTP endpoints

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::cache::BboCache;
use crate::metrics::Metrics;
use crate::subscribers::SubscriberRegistry;
use crate::websocket::ConnectionState;

/// Shared state behind the health routes
#[derive(Clone)]
pub struct HealthState {
    pub connection: watch::Receiver<ConnectionState>,
    pub cache: Arc<BboCache>,
    pub registry: Arc<SubscriberRegistry>,
    pub metrics: Arc<Metrics>,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub component: &'static str,
    pub connection_state: ConnectionState,
    pub cached_symbols: Vec<String>,
    pub subscribers: usize,
    pub timestamp: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `cancel` fires
pub async fn serve(state: HealthState, port: u16, cancel: CancellationToken) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(addr = %addr, "Starting health check server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    info!("Health check server stopped");
    Ok(())
}

async fn health_check(State(state): State<HealthState>) -> Json<HealthReport> {
    let connection_state = *state.connection.borrow();
    let status = if connection_state == ConnectionState::Connected {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthReport {
        status,
        component: "bbo-relay",
        connection_state,
        cached_symbols: state.cache.symbols(),
        subscribers: state.registry.len().await,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

async fn metrics(State(state): State<HealthState>) -> Result<String, StatusCode> {
    state.metrics.encode().map_err(|e| {
        error!(error = %e, "Failed to encode metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_reports_degraded_until_connected() {
        let (tx, rx) = watch::channel(ConnectionState::Connecting);
        let registry = Arc::new(SubscriberRegistry::in_memory());
        registry.subscribe(5).await;

        let state = HealthState {
            connection: rx,
            cache: Arc::new(BboCache::new()),
            registry,
            metrics: Arc::new(Metrics::new().unwrap()),
        };

        let Json(report) = health_check(State(state.clone())).await;
        assert_eq!(report.status, "degraded");
        assert_eq!(report.subscribers, 1);
        assert!(report.cached_symbols.is_empty());

        tx.send_replace(ConnectionState::Connected);
        let Json(report) = health_check(State(state)).await;
        assert_eq!(report.status, "healthy");
        assert_eq!(
            serde_json::to_value(&report).unwrap()["connection_state"],
            "connected"
        );
    }

    #[tokio::test]
    async fn test_metrics_endpoint_renders_text() {
        let (_tx, rx) = watch::channel(ConnectionState::Disconnected);
        let metrics = Arc::new(Metrics::new().unwrap());
        metrics.heartbeats_sent.inc();

        let state = HealthState {
            connection: rx,
            cache: Arc::new(BboCache::new()),
            registry: Arc::new(SubscriberRegistry::in_memory()),
            metrics,
        };

        let body = super::metrics(State(state)).await.unwrap();
        assert!(body.contains("bbo_relay_heartbeats_sent_total 1"));
    }
}
