//! HTTP surface for remote task triggering
//!
//! Exposes the update endpoints plus a ping health check. Requests flow
//! through authentication, task resolution, and then into the shell runner,
//! either blocking until completion (sync) or acknowledging immediately
//! (async).

mod delay;
mod error;
mod handlers;

pub use delay::DelayLayer;
pub use error::ApiError;
pub use handlers::{spawn_detached, AppState, UpdateRequest};

use std::time::Duration;

use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;

/// Build the dispatcher router.
///
/// The delay layer is installed only for a non-zero delay, and `/ping` sits
/// outside it. Externally supplied throttling or rate-limiting layers stack
/// on top of the returned router through the usual tower layering.
pub fn router(state: AppState, update_delay: Duration) -> Router {
    let mut updates = Router::new()
        .route("/update/:task/:key", get(handlers::update_get))
        .route("/update", post(handlers::update_post));

    if !update_delay.is_zero() {
        updates = updates.layer(DelayLayer::new(update_delay));
    }

    Router::new()
        .merge(updates)
        .route("/ping", get(ping_handler))
        .with_state(state)
}

/// Run the HTTP server until SIGINT/SIGTERM.
pub async fn run_server(listen: &str, app: Router) -> anyhow::Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("can't listen on {}", listen))?;
    log::info!("start http server on {}", listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server failed")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::warn!("interrupt signal");
}

/// Health check endpoint
async fn ping_handler() -> &'static str {
    "pong"
}
