//! REST-Handler des Beistand Servers

pub mod anfragen;
pub mod events;
pub mod raeume;
pub mod token;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};

/// GET /v1/health – Health-Check-Endpunkt
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}
