//! Axum-based scrape endpoint

use crate::error::{ExporterError, Result};
use crate::identity::DeviceIdentity;
use crate::metrics::PrometheusSink;
use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub sink: Arc<PrometheusSink>,
    pub identity: Arc<DeviceIdentity>,
}

pub(crate) async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub(crate) async fn metrics(State(state): State<AppState>) -> Response {
    match state.sink.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, state.sink.content_type())],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

pub(crate) async fn device(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.identity.as_ref().clone())
}

/// Routes served by the exporter
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/api/health", get(health))
        .route("/api/device", get(device))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind the scrape listener. Failing here is a startup error.
pub async fn bind(host: &str, port: u16) -> Result<TcpListener> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| ExporterError::web(format!("Invalid bind address {}:{}: {}", host, port, e)))?;

    TcpListener::bind(addr)
        .await
        .map_err(|e| ExporterError::web(format!("Failed to bind {}: {}", addr, e)))
}

/// Serve on an already bound listener until `shutdown` flips to true
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Serving metrics on http://{}/metrics", addr);
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await
        .map_err(|e| ExporterError::web(e.to_string()))
}
