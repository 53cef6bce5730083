//! Token-Issuer – Zugangs-Tokens fuer den Medien-Server

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use beistand_core::raum::RaumId;

use crate::error::{CallError, CallResult};

/// Antwort des Token-Dienstes
#[derive(Debug, Clone, Deserialize)]
pub struct TokenAntwort {
    /// Signiertes Zugangs-Token fuer genau einen Raum
    pub token: String,
    /// Verbindungs-URL des Medien-Servers
    pub url: String,
}

/// Stellt Zugangs-Tokens fuer Raeume aus
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Fordert ein Token fuer `raum` im Namen von `identitaet` an
    async fn ausstellen(
        &self,
        raum: &RaumId,
        identitaet: Uuid,
        name: &str,
    ) -> CallResult<TokenAntwort>;
}

/// HTTP-gestuetzter Token-Issuer
///
/// POSTet `{room, identity, name}` an den konfigurierten Endpunkt und
/// erwartet `{token, url}` zurueck. Jeder Fehlschlag wird als
/// [`CallError::TokenAbruf`] gemeldet; die Zustandsmaschine macht daraus
/// einen direkten Uebergang nach Ended (kein Retry).
pub struct HttpTokenIssuer {
    client: reqwest::Client,
    endpunkt: String,
}

impl HttpTokenIssuer {
    /// Erstellt einen Issuer fuer den gegebenen Endpunkt
    pub fn neu(endpunkt: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpunkt: endpunkt.into(),
        }
    }
}

#[async_trait]
impl TokenIssuer for HttpTokenIssuer {
    async fn ausstellen(
        &self,
        raum: &RaumId,
        identitaet: Uuid,
        name: &str,
    ) -> CallResult<TokenAntwort> {
        let antwort = self
            .client
            .post(&self.endpunkt)
            .json(&serde_json::json!({
                "room": raum.as_str(),
                "identity": identitaet,
                "name": name,
            }))
            .send()
            .await
            .map_err(|e| CallError::TokenAbruf(e.to_string()))?;

        if !antwort.status().is_success() {
            return Err(CallError::TokenAbruf(format!(
                "Token-Dienst antwortete mit Status {}",
                antwort.status()
            )));
        }

        antwort
            .json::<TokenAntwort>()
            .await
            .map_err(|e| CallError::TokenAbruf(format!("Ungueltige Token-Antwort: {e}")))
    }
}
