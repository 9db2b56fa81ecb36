//! Health and metrics endpoint of the worker process

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::ledger::FjallStore;
use crate::observability::{Metrics, MetricsSnapshot};
use crate::queue::{FjallQueue, Subscription};

#[derive(Clone)]
pub struct StatusState {
    pub queue: Arc<FjallQueue>,
    pub ledger: Arc<FjallStore>,
    pub subscription: Arc<Subscription>,
    pub metrics: Arc<Metrics>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub components: BTreeMap<&'static str, &'static str>,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    #[serde(flatten)]
    pub counters: MetricsSnapshot,
    /// Unacknowledged tasks, absent if the queue could not be read
    pub task_lag: Option<u64>,
}

pub fn router(state: StatusState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the status router until `cancel` fires
pub async fn serve(
    address: SocketAddr,
    state: StatusState,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(address).await?;
    info!(%address, "Status endpoint listening");

    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}

async fn health(State(state): State<StatusState>) -> impl IntoResponse {
    let mut components = BTreeMap::new();

    let check = |ok: bool| if ok { "healthy" } else { "unhealthy" };
    components.insert("queue", check(state.queue.health_check().is_ok()));
    components.insert("ledger", check(state.ledger.health_check().is_ok()));

    let all_healthy = components.values().all(|status| *status == "healthy");
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: check(all_healthy),
        components,
        version: env!("CARGO_PKG_VERSION"),
    };

    (status_code, Json(response))
}

async fn metrics(State(state): State<StatusState>) -> impl IntoResponse {
    Json(MetricsResponse {
        counters: state.metrics.snapshot(),
        task_lag: state.subscription.lag().ok(),
    })
}
