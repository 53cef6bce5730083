//! REST-Schicht des Beistand Servers

pub mod handlers;
pub mod routes;

use std::sync::Arc;

use axum::{
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    Router,
};
use chrono::Duration as ChronoDuration;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use beistand_db::SqliteDb;
use beistand_matching::{MatchingError, MatchingService, RaumLedger};
use beistand_signaling::BroadcastHub;

use crate::config::ServerConfig;

/// Axum-State: die verdrahteten Subsysteme
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<SqliteDb>,
    pub matching: Arc<MatchingService<SqliteDb>>,
    pub ledger: Arc<RaumLedger<SqliteDb>>,
    pub hub: BroadcastHub,
    /// Verbindungs-URL des Medien-Servers (geht mit jedem Token raus)
    pub media_url: String,
    pub token_ttl_sekunden: i64,
}

impl AppState {
    /// Verdrahtet die Subsysteme gegen eine gemeinsame Datenbank
    pub fn neu(db: Arc<SqliteDb>, config: &ServerConfig) -> Self {
        Self {
            matching: MatchingService::mit_ttl(
                db.clone(),
                ChronoDuration::minutes(config.vermittlung.anfrage_ttl_minuten),
            ),
            ledger: RaumLedger::neu(db.clone()),
            hub: BroadcastHub::neu(),
            db,
            media_url: config.media.url.clone(),
            token_ttl_sekunden: config.media.token_ttl_sekunden,
        }
    }
}

/// Baut die fertige Axum-App mit CORS und Request-Tracing
pub fn app(state: AppState, cors_origins: &[String]) -> Router {
    // CORS konfigurieren: entweder spezifische Origins oder Any
    let cors = if cors_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = cors_origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(tower_http::cors::Any)
    };

    routes::v1_router()
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Fehlerantwort fuer die REST-API
pub fn fehler_antwort(status: StatusCode, nachricht: &str, code: u32) -> Response {
    (
        status,
        Json(json!({
            "error": {
                "code": code,
                "message": nachricht
            }
        })),
    )
        .into_response()
}

/// Extrahiert die Benutzer-Identitaet aus dem `x-user-id`-Header
///
/// Die vorgelagerte Authentifizierung liegt ausserhalb dieses Dienstes;
/// hier zaehlt nur, dass eine gueltige UUID mitkommt.
pub fn identitaet_aus_headers(headers: &HeaderMap) -> Result<Uuid, Response> {
    let wert = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            fehler_antwort(StatusCode::UNAUTHORIZED, "x-user-id-Header fehlt", 401)
        })?;

    wert.parse::<Uuid>().map_err(|_| {
        fehler_antwort(
            StatusCode::UNAUTHORIZED,
            "x-user-id ist keine gueltige UUID",
            401,
        )
    })
}

/// Bildet Matching-Fehler auf HTTP-Antworten ab
///
/// Race-Ausgaenge sind 409: der Client soll ein freundliches "zu spaet"
/// zeigen und die Liste auffrischen, kein Fehlerbanner.
pub fn matching_fehler_antwort(fehler: MatchingError) -> Response {
    let (status, code) = match &fehler {
        MatchingError::NichtGefunden(_) => (StatusCode::NOT_FOUND, 404),
        MatchingError::Abgelaufen
        | MatchingError::BereitsVermittelt
        | MatchingError::BereitsErledigt => (StatusCode::CONFLICT, 409),
        MatchingError::NichtBerechtigt(_) => (StatusCode::FORBIDDEN, 403),
        MatchingError::Datenbank(_) => (StatusCode::INTERNAL_SERVER_ERROR, 500),
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(fehler = %fehler, "Interner Fehler in der Vermittlung");
        return fehler_antwort(status, "Interner Fehler", 500);
    }
    fehler_antwort(status, &fehler.to_string(), code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identitaet_aus_gueltigem_header() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", id.to_string().parse().unwrap());
        assert_eq!(identitaet_aus_headers(&headers).unwrap(), id);
    }

    #[test]
    fn fehlender_header_wird_abgelehnt() {
        let headers = HeaderMap::new();
        assert!(identitaet_aus_headers(&headers).is_err());
    }

    #[test]
    fn kaputte_uuid_wird_abgelehnt() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", "nicht-uuid".parse().unwrap());
        assert!(identitaet_aus_headers(&headers).is_err());
    }
}
