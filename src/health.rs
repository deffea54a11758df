//! Health endpoint (spec §6 "CLI / health").
//!
//! Optional HTTP server exposing `/healthz` and `/readyz`, modeled on the
//! facilitator's own Axum server bootstrap in `main.rs` — same
//! `TcpListener::bind` + `axum::serve` + graceful-shutdown shape, reduced to
//! two literal-`ok` routes plus a JSON stats snapshot.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::stats::Stats;

async fn healthz() -> &'static str {
    "ok"
}

async fn readyz() -> &'static str {
    "ok"
}

async fn stats_snapshot(State(stats): State<Arc<Stats>>) -> impl IntoResponse {
    axum::Json(stats.snapshot())
}

pub fn router(stats: Arc<Stats>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/stats", get(stats_snapshot))
        .layer(TraceLayer::new_for_http())
        .with_state(stats)
}

/// Binds and serves the health router until `cancel` fires. A bind failure
/// is logged but not fatal to the process (the push loop runs regardless of
/// whether health checks are reachable).
pub async fn serve(port: u16, stats: Arc<Stats>, cancel: CancellationToken) {
    if port == 0 {
        tracing::info!("health endpoint disabled (HEALTHZ_PORT=0)");
        return;
    }
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%addr, error = %err, "failed to bind health endpoint");
            return;
        }
    };
    tracing::info!(%addr, "health endpoint listening");
    let shutdown = async move { cancel.cancelled().await };
    if let Err(err) = axum::serve(listener, router(stats)).with_graceful_shutdown(shutdown).await {
        tracing::error!(error = %err, "health endpoint server error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn healthz_returns_literal_ok() {
        let app = router(Arc::new(Stats::new()));
        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
    }

    #[tokio::test]
    async fn stats_endpoint_returns_a_json_snapshot() {
        let stats = Arc::new(Stats::new());
        stats.record_posted();
        let app = router(stats);
        let response = app
            .oneshot(Request::builder().uri("/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["posted"], 1);
    }
}
