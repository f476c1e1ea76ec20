//! HTTP layer.
//!
//! This module provides:
//! - Shared application state holding the fixture store
//! - The `/api/v1` router, assembled from one sub-router per endpoint family
//! - A latency middleware that delays and logs every request
//! - `serve`, which binds and runs until Ctrl-C or SIGTERM

mod extract;
mod routes;

pub use extract::{JsonBody, OptionalJsonBody, Params, MAX_LIMIT};
pub use routes::admin::{ResetRequest, ResetResponse};

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::{from_fn_with_state, Next};
use axum::response::Response;
use axum::Router;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::{Config, LatencyConfig};
use crate::error::AppResult;
use crate::storage::FixtureStore;

/// Application state shared across handlers.
#[derive(Debug)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// The fixture store every handler reads and mutates.
    pub store: RwLock<FixtureStore>,
}

impl AppState {
    /// Create state with a store seeded from `config.fixtures`.
    pub fn new(config: Config) -> Self {
        let store = FixtureStore::seeded(&config.fixtures);
        Self {
            config,
            store: RwLock::new(store),
        }
    }

    /// Whether strict tier-policy validation is on.
    pub fn strict(&self) -> bool {
        self.config.validation.strict
    }
}

/// Shared application state handle
pub type SharedState = Arc<AppState>;

/// Build the full router.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .merge(routes::admin::router())
        .merge(routes::sources::router())
        .merge(routes::plugins::router())
        .merge(routes::extensions::router())
        .merge(routes::anomaly::router())
        .merge(routes::streaming::router())
        .merge(routes::tiering::router())
        .merge(routes::versions::router())
        .layer(from_fn_with_state(state.clone(), latency_middleware))
        .with_state(state)
}

/// Sleep a random delay from the configured range, then log the request.
async fn latency_middleware(
    State(state): State<SharedState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let delay_ms = draw_delay_ms(&state.config.latency);
    if delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    let response = next.run(request).await;
    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        delay_ms,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Request handled"
    );
    response
}

fn draw_delay_ms(latency: &LatencyConfig) -> u64 {
    if !latency.is_enabled() {
        return 0;
    }
    rand::rng().random_range(latency.min_ms.min(latency.max_ms)..=latency.max_ms)
}

/// Bind `config.bind_address()` and serve until a shutdown signal.
pub async fn serve(config: Config) -> AppResult<()> {
    let address = config.bind_address();
    let state: SharedState = Arc::new(AppState::new(config));
    let app = build_router(state);

    let listener = TcpListener::bind(&address).await?;
    info!(address = %listener.local_addr()?, "Mock API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Mock API stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = tokio::signal::ctrl_c() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
