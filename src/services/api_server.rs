//! HTTP server for the review API.
//!
//! Binds the routes from `api_routes` to a TCP listener and shuts down
//! gracefully when the cancellation token fires.

use std::future::IntoFuture;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::services::api_routes::review_routes;
use crate::services::ReviewService;

/// Build the full router with tracing and CORS layers.
pub fn build_router(service: ReviewService) -> Router {
    review_routes()
        .with_state(service)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Serve the review API on `listener` until `shutdown` is cancelled.
///
/// In-flight requests get `drain_timeout` to finish once shutdown starts;
/// connections still open after that are dropped.
pub async fn serve(
    listener: TcpListener,
    service: ReviewService,
    shutdown: CancellationToken,
    drain_timeout: Duration,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        log::info!("[server] Listening on http://{}", addr);
    }

    let token = shutdown.clone();
    let server = axum::serve(listener, build_router(service))
        .with_graceful_shutdown(async move { token.cancelled().await })
        .into_future();
    let mut server = std::pin::pin!(server);

    tokio::select! {
        result = &mut server => {
            log::info!("[server] Stopped");
            return result;
        }
        _ = shutdown.cancelled() => {
            log::info!("[server] Shutting down, draining for up to {:?}", drain_timeout);
        }
    }

    match tokio::time::timeout(drain_timeout, server).await {
        Ok(result) => {
            log::info!("[server] Stopped");
            result
        }
        Err(_) => {
            log::warn!("[server] Connections still open after {:?}, dropping them", drain_timeout);
            Ok(())
        }
    }
}
