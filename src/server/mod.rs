//! HTTP server for the pipeline bot.
//!
//! Two endpoints:
//!
//! - `POST /webhook` - Accepts GitLab webhook deliveries and runs them
//!   through the orchestrator synchronously
//! - `GET /health` - Returns 200 if the server is running
//!
//! The webhook response reports the terminal outcome of the delivery;
//! only notification delivery happens after the response.

use std::sync::Arc;

pub mod health;
pub mod webhook;

pub use health::health_handler;
pub use webhook::webhook_handler;

use crate::orchestrator::Orchestrator;

/// Shared application state, passed to handlers via Axum's `State`
/// extractor.
#[derive(Clone, Debug)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        AppState { orchestrator }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/health", get(health_handler))
        .with_state(app_state)
}
