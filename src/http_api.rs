use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::ConnectionManager;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    tcp_connections: usize,
    rtu_status: &'static str,
}

#[derive(Debug, Serialize)]
struct StatsResponse {
    total_requests: u64,
    active_connections: usize,
    total_errors: u64,
    avg_response_time_ms: u64,
    requests_per_second: f64,
}

type ApiState = Arc<ConnectionManager>;

async fn health_handler(State(state): State<ApiState>) -> impl IntoResponse {
    match state.get_stats().await {
        Ok(stats) => {
            let response = HealthResponse {
                status: "ok",
                tcp_connections: stats.active_connections,
                rtu_status: "ok",
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            error!("Failed to query connection stats: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn stats_handler(State(state): State<ApiState>) -> impl IntoResponse {
    match state.get_stats().await {
        Ok(stats) => {
            let response = StatsResponse {
                total_requests: stats.total_requests,
                active_connections: stats.active_connections,
                total_errors: stats.total_errors,
                avg_response_time_ms: stats.avg_response_time_ms,
                requests_per_second: stats.requests_per_second,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            error!("Failed to query connection stats: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn start_http_server(
    address: String,
    port: u16,
    manager: Arc<ConnectionManager>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .with_state(manager);

    let addr = format!("{}:{}", address, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("HTTP server shutting down");
        })
        .await?;

    Ok(())
}
