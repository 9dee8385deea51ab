//! Axum router construction for the Observer API.
//!
//! Assembles all routes into a single [`Router`] with CORS enabled for
//! cross-origin dashboard access.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use colony_ledger::LedgerStore;

use crate::handlers;
use crate::operator;
use crate::state::AppState;

/// Build the complete Axum router for the Observer server.
///
/// See [`handlers`] and [`operator`] for the route table.
pub fn build_router<S: LedgerStore + 'static>(state: Arc<AppState<S>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/cycle", get(handlers::get_cycle::<S>))
        .route("/api/phenomenon", get(handlers::get_phenomenon::<S>))
        .route("/api/admin/phenomenon", post(handlers::activate_phenomenon::<S>))
        .route("/api/pass/last", get(handlers::last_pass::<S>))
        // Participants
        .route("/api/participants/{id}", get(handlers::get_participant::<S>))
        .route(
            "/api/participants/{id}/protection",
            get(handlers::get_protection::<S>),
        )
        .route(
            "/api/participants/{id}/insurance",
            post(handlers::buy_insurance::<S>),
        )
        .route(
            "/api/participants/{id}/transactions",
            get(handlers::list_transactions::<S>),
        )
        .route("/api/participants/{id}/work", post(handlers::do_work::<S>))
        .route(
            "/api/participants/{id}/investment",
            post(handlers::mark_investment::<S>),
        )
        // Operator
        .route("/api/operator/status", get(operator::status::<S>))
        .route("/api/operator/pause", post(operator::pause::<S>))
        .route("/api/operator/resume", post(operator::resume::<S>))
        .route("/api/operator/stop", post(operator::stop::<S>))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
