//! Route-Definitionen fuer die REST-API (/v1/...)

use axum::{
    routing::{get, post},
    Router,
};

use crate::rest::{handlers, AppState};

/// Erstellt den vollstaendigen /v1/-Router
pub fn v1_router() -> Router<AppState> {
    Router::new()
        // Anfragen
        .route("/v1/requests", post(handlers::anfragen::create_request))
        .route(
            "/v1/requests/group",
            post(handlers::anfragen::create_group_request),
        )
        .route("/v1/requests", get(handlers::anfragen::list_requests))
        .route(
            "/v1/requests/:id/accept",
            post(handlers::anfragen::accept_request),
        )
        .route(
            "/v1/requests/:id/cancel",
            post(handlers::anfragen::cancel_request),
        )
        // Signalisierung
        .route("/v1/events", get(handlers::events::subscribe_events))
        // Raum-Zugang
        .route("/v1/token", post(handlers::token::issue_token))
        .route("/v1/rooms/:id/roster", get(handlers::raeume::get_roster))
        // Health
        .route("/v1/health", get(handlers::health))
}
