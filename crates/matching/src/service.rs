//! MatchingService – Lebenszyklus einer Anruf-Anfrage
//!
//! Direktanrufe sind match-first: der Raum entsteht erst beim Accept,
//! weil das Paar vorher unbekannt ist. Gruppenanrufe sind host-first:
//! der Raum entsteht bei der Erstellung und der Host betritt ihn sofort,
//! bevor irgendjemand beigetreten ist.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use beistand_core::raum::{gruppen_raum_name, quick_connect_raum_name, RaumId};
use beistand_db::{
    models::{
        AnfrageArt, AnfrageRecord, AnfrageStatus, NeueAnfrage, NeuerTeilnehmer, ProfilRecord,
        TeilnehmerRolle,
    },
    AnfrageRepository, ProfilRepository, TeilnehmerRepository,
};

use crate::error::{MatchingError, MatchingResult};

/// Gueltigkeitsdauer einer Anfrage in Minuten (Policy)
const ANFRAGE_TTL_MINUTEN: i64 = 10;

/// Standard-Limit fuer Discovery-Abfragen
const DISCOVERY_LIMIT: i64 = 50;

/// Eine offene Anfrage, dekoriert mit dem Profil des Anfragenden
#[derive(Debug, Clone)]
pub struct OffeneAnfrage {
    pub anfrage: AnfrageRecord,
    /// Nur Anzeige; fehlt das Profil, bleibt die Anfrage trotzdem gueltig
    pub profil: Option<ProfilRecord>,
}

/// Ergebnis eines erfolgreichen Accepts
#[derive(Debug, Clone)]
pub struct AngenommenerAnruf {
    pub anfrage_id: Uuid,
    pub raum: RaumId,
    pub requester_id: Uuid,
}

/// Zentrale Matching-Engine
///
/// Generisch ueber das Repository, damit Tests gegen In-Memory-SQLite
/// laufen koennen. Clone via Arc beim Aufrufer.
pub struct MatchingService<R>
where
    R: AnfrageRepository + TeilnehmerRepository + ProfilRepository,
{
    repo: Arc<R>,
    ttl: Duration,
}

impl<R> MatchingService<R>
where
    R: AnfrageRepository + TeilnehmerRepository + ProfilRepository,
{
    /// Erstellt einen neuen MatchingService mit Standard-TTL (10 Minuten)
    pub fn neu(repo: Arc<R>) -> Arc<Self> {
        Self::mit_ttl(repo, Duration::minutes(ANFRAGE_TTL_MINUTEN))
    }

    /// Erstellt einen MatchingService mit abweichender TTL (fuer Tests)
    pub fn mit_ttl(repo: Arc<R>, ttl: Duration) -> Arc<Self> {
        Arc::new(Self { repo, ttl })
    }

    // -----------------------------------------------------------------------
    // Erstellen
    // -----------------------------------------------------------------------

    /// Erstellt eine Direktanruf-Anfrage
    ///
    /// Der Raum wird absichtlich NICHT vergeben, das Paar steht erst beim
    /// Accept fest. Eine bereits offene Anfrage desselben Requesters wird
    /// nur protokolliert, nicht hart verhindert.
    pub async fn anfrage_erstellen(&self, requester_id: Uuid) -> MatchingResult<AnfrageRecord> {
        let offene = self
            .repo
            .list_available(None, Utc::now(), DISCOVERY_LIMIT)
            .await?;
        if offene.iter().any(|a| a.requester_id == requester_id) {
            tracing::warn!(
                requester = %requester_id,
                "Requester hat bereits eine offene Anfrage"
            );
        }

        let anfrage = self
            .repo
            .create(NeueAnfrage {
                requester_id,
                art: AnfrageArt::Direct,
                room_id: None,
                expires_at: Utc::now() + self.ttl,
            })
            .await?;

        tracing::info!(anfrage = %anfrage.id, requester = %requester_id, "Direktanfrage erstellt");
        Ok(anfrage)
    }

    /// Erstellt eine Gruppenanruf-Anfrage (host-first)
    ///
    /// Der Raum wird sofort gebunden und der Erstellende als Host ins
    /// Ledger eingetragen, damit er den Raum unmittelbar betreten kann.
    pub async fn gruppen_anfrage_erstellen(
        &self,
        requester_id: Uuid,
    ) -> MatchingResult<(AnfrageRecord, RaumId)> {
        let raum = gruppen_raum_name();

        let anfrage = self
            .repo
            .create(NeueAnfrage {
                requester_id,
                art: AnfrageArt::Group,
                room_id: Some(raum.as_str()),
                expires_at: Utc::now() + self.ttl,
            })
            .await?;

        TeilnehmerRepository::upsert(
            self.repo.as_ref(),
            NeuerTeilnehmer {
                room_id: raum.as_str(),
                user_id: requester_id,
                role: TeilnehmerRolle::Host,
            },
        )
        .await?;

        tracing::info!(
            anfrage = %anfrage.id,
            raum = %raum,
            host = %requester_id,
            "Gruppenanfrage erstellt, Host betritt den Raum sofort"
        );
        Ok((anfrage, raum))
    }

    // -----------------------------------------------------------------------
    // Entdecken
    // -----------------------------------------------------------------------

    /// Listet offene Anfragen fremder Benutzer, aelteste zuerst
    ///
    /// Dekoriert die Zeilen mit Profilen; fehlende Profile sind kein Fehler.
    pub async fn entdecken(&self, aktueller_user: Uuid) -> MatchingResult<Vec<OffeneAnfrage>> {
        let anfragen = self
            .repo
            .list_available(Some(aktueller_user), Utc::now(), DISCOVERY_LIMIT)
            .await?;

        let ids: Vec<Uuid> = anfragen.iter().map(|a| a.requester_id).collect();
        let profile = self.repo.get_profile(&ids).await?;

        Ok(anfragen
            .into_iter()
            .map(|anfrage| {
                let profil = profile
                    .iter()
                    .find(|p| p.user_id == anfrage.requester_id)
                    .cloned();
                OffeneAnfrage { anfrage, profil }
            })
            .collect())
    }

    // -----------------------------------------------------------------------
    // Annehmen
    // -----------------------------------------------------------------------

    /// Nimmt eine Direktanruf-Anfrage an
    ///
    /// Genau ein Akzeptor gewinnt: der Uebergang `available -> matched`
    /// laeuft als Compare-and-Swap im Store. Verlierer erhalten
    /// `BereitsVermittelt` und es entstehen fuer sie keine Raum-Bindungen.
    pub async fn annehmen(
        &self,
        anfrage_id: Uuid,
        acceptor_id: Uuid,
    ) -> MatchingResult<AngenommenerAnruf> {
        let anfrage = self.vorpruefen(anfrage_id, acceptor_id).await?;

        let raum = quick_connect_raum_name();
        let getroffen = self
            .repo
            .mark_matched(anfrage_id, raum.as_str(), Some(acceptor_id))
            .await?;
        if getroffen == 0 {
            // Jemand anderes war schneller (Accept oder Cancel)
            tracing::debug!(anfrage = %anfrage_id, acceptor = %acceptor_id, "Accept-Race verloren");
            return Err(MatchingError::BereitsVermittelt);
        }

        // Beide Parteien ins Ledger, idempotent auf (raum, user)
        for user_id in [anfrage.requester_id, acceptor_id] {
            TeilnehmerRepository::upsert(
                self.repo.as_ref(),
                NeuerTeilnehmer {
                    room_id: raum.as_str(),
                    user_id,
                    role: TeilnehmerRolle::Participant,
                },
            )
            .await?;
        }

        tracing::info!(
            anfrage = %anfrage_id,
            raum = %raum,
            requester = %anfrage.requester_id,
            acceptor = %acceptor_id,
            "Direktanfrage vermittelt"
        );
        Ok(AngenommenerAnruf {
            anfrage_id,
            raum,
            requester_id: anfrage.requester_id,
        })
    }

    /// Tritt einem Gruppenanruf bei
    ///
    /// Der Raum existiert normalerweise seit der Erstellung; nur die
    /// allererste Raum-Zuweisung braucht einen CAS-Schutz (defensiver
    /// Fallback fuer Alt-Zeilen ohne Raum). Beliebig viele Beitritte
    /// sind zulaessig.
    pub async fn gruppe_beitreten(
        &self,
        anfrage_id: Uuid,
        joiner_id: Uuid,
    ) -> MatchingResult<AngenommenerAnruf> {
        let anfrage = AnfrageRepository::get(self.repo.as_ref(), anfrage_id)
            .await?
            .ok_or_else(|| MatchingError::NichtGefunden(anfrage_id.to_string()))?;

        if anfrage.status.ist_terminal() {
            return Err(MatchingError::BereitsErledigt);
        }
        if anfrage.ist_abgelaufen(Utc::now()) {
            return Err(MatchingError::Abgelaufen);
        }

        let raum = match &anfrage.room_id {
            Some(raum) => RaumId(raum.clone()),
            None => {
                // Defensiver Fallback: Raum fehlt, genau ein Client darf
                // ihn nachziehen
                let neuer = gruppen_raum_name();
                let getroffen = self
                    .repo
                    .mark_matched(anfrage_id, neuer.as_str(), None)
                    .await?;
                if getroffen == 0 {
                    // Race verloren – den Gewinner-Raum nachlesen
                    let aktuell = AnfrageRepository::get(self.repo.as_ref(), anfrage_id)
                        .await?
                        .ok_or_else(|| MatchingError::NichtGefunden(anfrage_id.to_string()))?;
                    aktuell
                        .room_id
                        .map(RaumId)
                        .ok_or(MatchingError::BereitsErledigt)?
                } else {
                    neuer
                }
            }
        };

        // Host-Eintrag des Erstellers bleibt durch die Idempotenz unberuehrt
        TeilnehmerRepository::upsert(
            self.repo.as_ref(),
            NeuerTeilnehmer {
                room_id: raum.as_str(),
                user_id: anfrage.requester_id,
                role: TeilnehmerRolle::Host,
            },
        )
        .await?;
        TeilnehmerRepository::upsert(
            self.repo.as_ref(),
            NeuerTeilnehmer {
                room_id: raum.as_str(),
                user_id: joiner_id,
                role: TeilnehmerRolle::Participant,
            },
        )
        .await?;

        tracing::info!(anfrage = %anfrage_id, raum = %raum, joiner = %joiner_id, "Gruppenbeitritt");
        Ok(AngenommenerAnruf {
            anfrage_id,
            raum,
            requester_id: anfrage.requester_id,
        })
    }

    // -----------------------------------------------------------------------
    // Abbrechen & Abschliessen
    // -----------------------------------------------------------------------

    /// Bricht die eigene offene Anfrage ab
    ///
    /// Verliert der Cancel gegen einen gleichzeitigen Accept, wird
    /// `BereitsVermittelt` gemeldet – nie ein stilles Nichtstun.
    pub async fn abbrechen(&self, anfrage_id: Uuid, requester_id: Uuid) -> MatchingResult<()> {
        let anfrage = AnfrageRepository::get(self.repo.as_ref(), anfrage_id)
            .await?
            .ok_or_else(|| MatchingError::NichtGefunden(anfrage_id.to_string()))?;

        if anfrage.requester_id != requester_id {
            return Err(MatchingError::NichtBerechtigt(
                "Nur der Ersteller kann seine Anfrage abbrechen".into(),
            ));
        }

        let getroffen = self.repo.mark_completed_if_available(anfrage_id).await?;
        if getroffen == 0 {
            tracing::debug!(anfrage = %anfrage_id, "Cancel-Race verloren");
            return Err(MatchingError::BereitsVermittelt);
        }

        tracing::info!(anfrage = %anfrage_id, "Anfrage abgebrochen");
        Ok(())
    }

    /// Schliesst eine vermittelte Anfrage nach Gespraechsende ab
    ///
    /// Tolerant gegenueber bereits terminalen Zeilen (Hangup beider Seiten).
    pub async fn abschliessen(&self, anfrage_id: Uuid) -> MatchingResult<()> {
        let getroffen = self.repo.mark_completed(anfrage_id).await?;
        if getroffen == 0 {
            tracing::debug!(anfrage = %anfrage_id, "Abschluss ohne Wirkung (bereits terminal)");
        }
        Ok(())
    }

    /// Hygiene-Sweep fuer abgelaufene offene Anfragen
    ///
    /// Kein Korrektheits-Mechanismus: alle Lese- und Aktionspfade filtern
    /// `expires_at` ohnehin selbst.
    pub async fn ablauf_sweep(&self) -> MatchingResult<u64> {
        let geaendert = self.repo.expire_stale(Utc::now()).await?;
        if geaendert > 0 {
            tracing::debug!(anzahl = geaendert, "Abgelaufene Anfragen aufgeraeumt");
        }
        Ok(geaendert)
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsmethoden
    // -----------------------------------------------------------------------

    /// Vorpruefung fuer den Direkt-Accept: existiert, offen, nicht abgelaufen
    ///
    /// Die eigentliche Entscheidung faellt trotzdem erst der CAS im Store –
    /// zwischen Vorpruefung und Update kann jederzeit ein anderer Client
    /// gewinnen.
    async fn vorpruefen(&self, anfrage_id: Uuid, acceptor_id: Uuid) -> MatchingResult<AnfrageRecord> {
        let anfrage = AnfrageRepository::get(self.repo.as_ref(), anfrage_id)
            .await?
            .ok_or_else(|| MatchingError::NichtGefunden(anfrage_id.to_string()))?;

        if anfrage.requester_id == acceptor_id {
            return Err(MatchingError::NichtBerechtigt(
                "Eigene Anfrage kann nicht angenommen werden".into(),
            ));
        }
        match anfrage.status {
            AnfrageStatus::Available => {}
            AnfrageStatus::Matched => return Err(MatchingError::BereitsVermittelt),
            AnfrageStatus::Completed | AnfrageStatus::Expired => {
                return Err(MatchingError::BereitsErledigt)
            }
        }
        if anfrage.ist_abgelaufen(Utc::now()) {
            return Err(MatchingError::Abgelaufen);
        }

        Ok(anfrage)
    }
}
