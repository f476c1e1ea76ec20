//! # Dashboard Mock API
//!
//! A seedable, in-memory mock of the data-quality dashboard's REST backend.
//! It serves the plugin marketplace, anomaly detection, streaming,
//! storage tiering and versioning endpoints with deterministic fixtures, so
//! the dashboard can be developed and tested without the real services.
//!
//! ## Architecture
//!
//! ```text
//! Dashboard / ApiClient → axum router → domain modules → FixtureStore
//!                              ↑
//!                      latency middleware
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use dashboard_mock_api::{server, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     server::serve(config).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Anomaly detection: single runs, explanations, batches, comparisons and streaming.
pub mod anomaly;
/// Typed REST client for the mock API.
pub mod client;
/// Configuration management.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Deterministic fixture factories.
pub mod factories;
/// Entity types served by the API.
pub mod models;
/// Plugin actions, lifecycle state machine and extensions.
pub mod plugins;
/// Report rendering for custom reporters.
pub mod reports;
/// HTTP layer: router, extractors and middleware.
pub mod server;
/// In-memory fixture store.
pub mod storage;
/// Storage tier policies and simulated migrations.
pub mod tiering;
/// Validation result versioning.
pub mod versioning;

pub use client::ApiClient;
pub use config::Config;
pub use error::{ApiError, AppError, AppResult};
pub use server::{build_router, AppState, SharedState};
pub use storage::FixtureStore;
