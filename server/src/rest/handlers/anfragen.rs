//! REST-Handler fuer Anfrage-Endpunkte
//!
//! Die Handler sind duenne Uebersetzer: Identitaet aus dem Header,
//! Aufruf in die Matching-Engine, Broadcast als Latenz-Abkuerzung,
//! Fehler auf HTTP-Status abbilden.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use uuid::Uuid;

use beistand_db::models::AnfrageArt;
use beistand_db::AnfrageRepository;
use beistand_signaling::{user_topic, CallEvent, LOBBY_TOPIC};

use crate::rest::{
    fehler_antwort, identitaet_aus_headers, matching_fehler_antwort, AppState,
};

/// POST /v1/requests – direkte Anfrage in die Lobby stellen
pub async fn create_request(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user = match identitaet_aus_headers(&headers) {
        Ok(u) => u,
        Err(r) => return r,
    };

    match state.matching.anfrage_erstellen(user).await {
        Ok(anfrage) => {
            // Abkuerzung fuer bereits lauschende Clients; der Poll-Fallback
            // traegt die Anfrage ohnehin
            state.hub.veroeffentlichen(
                LOBBY_TOPIC,
                CallEvent::RequestCreated {
                    request_id: anfrage.id,
                    requester_id: user,
                },
            );
            (StatusCode::CREATED, Json(json!({ "request": anfrage }))).into_response()
        }
        Err(e) => matching_fehler_antwort(e),
    }
}

/// POST /v1/requests/group – Gruppenanruf eroeffnen (Host-first)
///
/// Der Raum steht sofort fest; der Eroeffnende kann direkt hinein,
/// waehrend die Anfrage fuer Beitritte offen bleibt.
pub async fn create_group_request(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user = match identitaet_aus_headers(&headers) {
        Ok(u) => u,
        Err(r) => return r,
    };

    match state.matching.gruppen_anfrage_erstellen(user).await {
        Ok((anfrage, raum)) => {
            state.hub.veroeffentlichen(
                LOBBY_TOPIC,
                CallEvent::RequestCreated {
                    request_id: anfrage.id,
                    requester_id: user,
                },
            );
            (
                StatusCode::CREATED,
                Json(json!({ "request": anfrage, "room": raum })),
            )
                .into_response()
        }
        Err(e) => matching_fehler_antwort(e),
    }
}

/// GET /v1/requests – offene Anfragen entdecken
///
/// Eigene und abgelaufene Anfragen fehlen, aelteste zuerst.
pub async fn list_requests(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user = match identitaet_aus_headers(&headers) {
        Ok(u) => u,
        Err(r) => return r,
    };

    match state.matching.entdecken(user).await {
        Ok(offene) => {
            let eintraege: Vec<_> = offene
                .into_iter()
                .map(|o| json!({ "request": o.anfrage, "profile": o.profil }))
                .collect();
            (StatusCode::OK, Json(json!({ "requests": eintraege }))).into_response()
        }
        Err(e) => matching_fehler_antwort(e),
    }
}

/// POST /v1/requests/:id/accept – Anfrage annehmen bzw. Gruppe beitreten
///
/// Direkt: genau ein Gewinner (Compare-and-Swap), Verlierer bekommen 409.
/// Gruppe: beliebig viele Beitritte solange die Anfrage offen ist.
pub async fn accept_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Response {
    let user = match identitaet_aus_headers(&headers) {
        Ok(u) => u,
        Err(r) => return r,
    };

    let art = match state.db.get(id).await {
        Ok(Some(anfrage)) => anfrage.art,
        Ok(None) => {
            return fehler_antwort(StatusCode::NOT_FOUND, "Anfrage nicht gefunden", 404)
        }
        Err(e) => {
            tracing::error!(fehler = %e, "Anfrage konnte nicht geladen werden");
            return fehler_antwort(StatusCode::INTERNAL_SERVER_ERROR, "Interner Fehler", 500);
        }
    };

    let ergebnis = match art {
        AnfrageArt::Direct => state.matching.annehmen(id, user).await,
        AnfrageArt::Group => state.matching.gruppe_beitreten(id, user).await,
    };

    match ergebnis {
        Ok(angenommen) => {
            // Der Anfragende erfaehrt sofort vom Match und navigiert in
            // den Raum; ohne Subscriber bleibt das folgenlos
            state.hub.veroeffentlichen(
                &user_topic(angenommen.requester_id),
                CallEvent::CallAccepted {
                    request_id: angenommen.anfrage_id,
                    from: user,
                    to: angenommen.requester_id,
                    room: angenommen.raum.clone(),
                },
            );
            state.hub.veroeffentlichen(
                &user_topic(angenommen.requester_id),
                CallEvent::NavigateToRoom {
                    to: angenommen.requester_id,
                    room: angenommen.raum.clone(),
                },
            );
            (
                StatusCode::OK,
                Json(json!({ "request_id": angenommen.anfrage_id, "room": angenommen.raum })),
            )
                .into_response()
        }
        Err(e) => matching_fehler_antwort(e),
    }
}

/// POST /v1/requests/:id/cancel – eigene Anfrage zuruecknehmen
pub async fn cancel_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Response {
    let user = match identitaet_aus_headers(&headers) {
        Ok(u) => u,
        Err(r) => return r,
    };

    match state.matching.abbrechen(id, user).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => matching_fehler_antwort(e),
    }
}
