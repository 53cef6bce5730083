//! RaumLedger – Autorisierungs-Gate fuer Raum-Beitritte
//!
//! `autorisieren` wird vor jeder Token-Ausgabe konsultiert: wer keinen
//! aktiven Ledger-Eintrag hat, bekommt keinen Media-Zugang, selbst wenn
//! er den Raumnamen erraten hat.

use std::sync::Arc;

use uuid::Uuid;

use beistand_db::{
    models::{NeuerTeilnehmer, ProfilRecord, RaumTeilnehmerRecord, TeilnehmerRolle},
    ProfilRepository, TeilnehmerRepository,
};

use crate::error::{MatchingError, MatchingResult};

/// Roster-Zeile: Ledger-Eintrag plus Anzeige-Profil
#[derive(Debug, Clone)]
pub struct RosterEintrag {
    pub teilnehmer: RaumTeilnehmerRecord,
    pub profil: Option<ProfilRecord>,
}

/// Service-Sicht auf das Raum-Teilnahme-Ledger
pub struct RaumLedger<R>
where
    R: TeilnehmerRepository + ProfilRepository,
{
    repo: Arc<R>,
}

impl<R> RaumLedger<R>
where
    R: TeilnehmerRepository + ProfilRepository,
{
    /// Erstellt eine neue Ledger-Sicht
    pub fn neu(repo: Arc<R>) -> Arc<Self> {
        Arc::new(Self { repo })
    }

    /// Traegt einen Benutzer in einen Raum ein (idempotent)
    pub async fn eintragen(
        &self,
        raum: &str,
        user_id: Uuid,
        rolle: TeilnehmerRolle,
    ) -> MatchingResult<()> {
        TeilnehmerRepository::upsert(
            self.repo.as_ref(),
            NeuerTeilnehmer {
                room_id: raum,
                user_id,
                role: rolle,
            },
        )
        .await?;
        Ok(())
    }

    /// Prueft ob ein Benutzer den Raum betreten darf
    ///
    /// Fehlt der aktive Eintrag, wird `NichtBerechtigt` zurueckgegeben –
    /// der Aufrufer soll vom Raum wegnavigieren statt eine kaputte
    /// Media-Session zu rendern.
    pub async fn autorisieren(&self, raum: &str, user_id: Uuid) -> MatchingResult<()> {
        if self.repo.ist_aktiv(raum, user_id).await? {
            Ok(())
        } else {
            tracing::warn!(raum = %raum, user = %user_id, "Raum-Zutritt verweigert");
            Err(MatchingError::NichtBerechtigt(format!(
                "Kein aktiver Ledger-Eintrag fuer Raum '{raum}'"
            )))
        }
    }

    /// Listet den aktiven Roster eines Raums, profildekoriert
    pub async fn roster(&self, raum: &str) -> MatchingResult<Vec<RosterEintrag>> {
        let teilnehmer = self.repo.roster(raum).await?;
        let ids: Vec<Uuid> = teilnehmer.iter().map(|t| t.user_id).collect();
        let profile = self.repo.get_profile(&ids).await?;

        Ok(teilnehmer
            .into_iter()
            .map(|t| {
                let profil = profile.iter().find(|p| p.user_id == t.user_id).cloned();
                RosterEintrag { teilnehmer: t, profil }
            })
            .collect())
    }

    /// Setzt einen Teilnehmer inaktiv (Raum verlassen)
    pub async fn verlassen(&self, raum: &str, user_id: Uuid) -> MatchingResult<bool> {
        let entfernt = self.repo.deactivate(raum, user_id).await?;
        if entfernt {
            tracing::debug!(raum = %raum, user = %user_id, "Teilnehmer hat den Raum verlassen");
        }
        Ok(entfernt)
    }
}
