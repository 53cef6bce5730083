//! beistand-server – Bibliotheks-Root
//!
//! Komposition der Subsysteme: Datenbank, Matching-Engine, Raum-Ledger,
//! Broadcast-Hub und die REST-API. Der oeffentliche Einstiegspunkt
//! existiert auch fuer Integrationstests.

pub mod config;
pub mod rest;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use beistand_db::SqliteDb;

use config::ServerConfig;
use rest::AppState;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Server-Subsysteme und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. Datenbankverbindung herstellen und Migrationen ausfuehren
    /// 2. Matching-Engine, Ledger und Broadcast-Hub aufbauen
    /// 3. Hygiene-Sweep fuer abgelaufene Anfragen starten
    /// 4. REST-API starten
    /// 5. Auf Ctrl-C warten
    pub async fn starten(self) -> Result<()> {
        tracing::info!(
            server_name = %self.config.server.name,
            api = %self.config.api_bind_adresse(),
            "Server startet"
        );

        let db = Arc::new(
            SqliteDb::oeffnen(
                &self.config.datenbank.url,
                self.config.datenbank.max_verbindungen,
            )
            .await?,
        );
        tracing::info!(url = %self.config.datenbank.url, "Datenbank bereit");

        let state = AppState::neu(db, &self.config);

        // Hygiene-Sweep: markiert abgelaufene Anfragen als expired. Die
        // Korrektheitspfade filtern ohnehin lazy, der Sweep haelt nur die
        // Tabelle lesbar.
        let sweep_intervall = self.config.vermittlung.sweep_intervall_sekunden;
        if sweep_intervall > 0 {
            let matching = state.matching.clone();
            tokio::spawn(async move {
                let mut takt = tokio::time::interval(Duration::from_secs(sweep_intervall));
                takt.tick().await;
                loop {
                    takt.tick().await;
                    match matching.ablauf_sweep().await {
                        Ok(0) => {}
                        Ok(n) => tracing::debug!(anzahl = n, "Abgelaufene Anfragen markiert"),
                        Err(e) => tracing::warn!(fehler = %e, "Hygiene-Sweep fehlgeschlagen"),
                    }
                }
            });
        }

        let app = rest::app(state, &self.config.server.cors_origins);
        let listener = tokio::net::TcpListener::bind(self.config.api_bind_adresse()).await?;
        tracing::info!(adresse = %self.config.api_bind_adresse(), "REST-API gestartet");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        tracing::info!("Server wird beendet");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(fehler = %e, "Shutdown-Signal nicht verfuegbar");
    }
    tracing::info!("Shutdown-Signal empfangen");
}
