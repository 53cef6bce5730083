//! REST-Handler fuer Raum-Zugangs-Tokens

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{Duration, Utc};
use rand::RngCore;
use serde::Deserialize;
use serde_json::json;

use beistand_db::models::NeuerRaumToken;
use beistand_db::RaumTokenRepository;

use crate::rest::{fehler_antwort, identitaet_aus_headers, matching_fehler_antwort, AppState};

#[derive(Debug, Deserialize)]
pub struct TokenBody {
    pub room: String,
}

/// POST /v1/token – Zugangs-Token fuer einen Raum ausstellen
///
/// Nur aktive Ledger-Eintraege bekommen ein Token (403 sonst). Das
/// Token selbst ist opak und wird fuer Audit und spaetere Validierung
/// persistiert.
pub async fn issue_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<TokenBody>,
) -> Response {
    let user = match identitaet_aus_headers(&headers) {
        Ok(u) => u,
        Err(r) => return r,
    };

    if let Err(e) = state.ledger.autorisieren(&body.room, user).await {
        return matching_fehler_antwort(e);
    }

    let token = token_generieren();
    let expires_at = Utc::now() + Duration::seconds(state.token_ttl_sekunden);
    let record = match state
        .db
        .insert(NeuerRaumToken {
            token: &token,
            room_id: &body.room,
            identity: user,
            expires_at,
        })
        .await
    {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(fehler = %e, "Raum-Token konnte nicht persistiert werden");
            return fehler_antwort(StatusCode::INTERNAL_SERVER_ERROR, "Interner Fehler", 500);
        }
    };

    tracing::info!(raum = %body.room, user = %user, "Raum-Token ausgestellt");
    (
        StatusCode::OK,
        Json(json!({
            "token": record.token,
            "url": state.media_url,
            "expires_at": record.expires_at,
        })),
    )
        .into_response()
}

/// Erzeugt ein opakes Raum-Token (32 Zufallsbytes, URL-sicher kodiert)
fn token_generieren() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    let encoded = base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes);
    format!("bt_{encoded}")
}
