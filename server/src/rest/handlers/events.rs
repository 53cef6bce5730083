//! GET /v1/events – Signalisierungs-Events als Server-Sent-Events
//!
//! Remote-Clients haengen sich hier an den Broadcast-Hub: sie bekommen
//! die Lobby (neue Anfragen, Gespraechsenden) und ihr Privat-Topic
//! (Einladungen, Annahmen, Ablehnungen) in einem gemeinsamen Strom.
//! Es gilt die Hub-Semantik: keine Zustellgarantie, wer haengt verliert
//! Events und muss ueber `GET /v1/requests` nachladen.

use std::convert::Infallible;

use axum::{
    extract::State,
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
    response::Response,
};
use futures_util::stream::{unfold, BoxStream, StreamExt};
use tokio::sync::broadcast::error::RecvError;

use beistand_signaling::{user_topic, CallEvent, LOBBY_TOPIC};

use crate::rest::{identitaet_aus_headers, AppState};

type EventStrom = BoxStream<'static, Result<Event, Infallible>>;

/// Oeffnet den Event-Strom fuer den authentifizierten Benutzer
pub async fn subscribe_events(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Sse<EventStrom>, Response> {
    let user = identitaet_aus_headers(&headers)?;

    let lobby = state.hub.abonnieren(LOBBY_TOPIC);
    let privat = state.hub.abonnieren(&user_topic(user));
    tracing::debug!(user = %user, "Event-Strom geoeffnet");

    let strom = unfold((lobby, privat), |(mut lobby, mut privat)| async move {
        loop {
            let empfangen = tokio::select! {
                e = lobby.recv() => e,
                e = privat.recv() => e,
            };
            match empfangen {
                Ok(event) => match sse_frame(&event) {
                    Some(frame) => return Some((Ok(frame), (lobby, privat))),
                    None => continue,
                },
                // Ueberholte Empfaenger verlieren Events, der Strom lebt weiter
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Ok(Sse::new(strom.boxed()).keep_alive(KeepAlive::default()))
}

fn sse_frame(event: &CallEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(daten) => Some(Event::default().data(daten)),
        Err(e) => {
            tracing::warn!(fehler = %e, "Event liess sich nicht serialisieren");
            None
        }
    }
}
