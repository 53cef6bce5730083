//! REST-Handler fuer Raum-Endpunkte

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use crate::rest::{identitaet_aus_headers, matching_fehler_antwort, AppState};

/// GET /v1/rooms/:id/roster – aktive Teilnehmer eines Raums
///
/// Nur Mitglieder duerfen das Roster sehen; alle anderen bekommen 403
/// und sollen vom Raum wegnavigieren.
pub async fn get_roster(
    State(state): State<AppState>,
    Path(raum): Path<String>,
    headers: HeaderMap,
) -> Response {
    let user = match identitaet_aus_headers(&headers) {
        Ok(u) => u,
        Err(r) => return r,
    };

    if let Err(e) = state.ledger.autorisieren(&raum, user).await {
        return matching_fehler_antwort(e);
    }

    match state.ledger.roster(&raum).await {
        Ok(eintraege) => {
            let roster: Vec<_> = eintraege
                .into_iter()
                .map(|e| {
                    json!({
                        "user_id": e.teilnehmer.user_id,
                        "role": e.teilnehmer.role,
                        "joined_at": e.teilnehmer.joined_at,
                        "display_name": e.profil.as_ref().map(|p| p.display_name.clone()),
                        "avatar_url": e.profil.as_ref().and_then(|p| p.avatar_url.clone()),
                    })
                })
                .collect();
            (StatusCode::OK, Json(json!({ "room": raum, "roster": roster }))).into_response()
        }
        Err(e) => matching_fehler_antwort(e),
    }
}
