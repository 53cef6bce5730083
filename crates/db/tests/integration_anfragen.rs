//! Integration-Tests fuer AnfrageRepository (In-Memory SQLite)

use chrono::{Duration, Utc};
use uuid::Uuid;

use beistand_db::{
    models::{AnfrageArt, AnfrageStatus, NeueAnfrage},
    AnfrageRepository, SqliteDb,
};

async fn db() -> SqliteDb {
    SqliteDb::in_memory()
        .await
        .expect("In-Memory DB konnte nicht erstellt werden")
}

async fn offene_anfrage(db: &SqliteDb, requester: Uuid) -> Uuid {
    AnfrageRepository::create(
        db,
        NeueAnfrage {
            requester_id: requester,
            art: AnfrageArt::Direct,
            room_id: None,
            expires_at: Utc::now() + Duration::minutes(10),
        },
    )
    .await
    .unwrap()
    .id
}

#[tokio::test]
async fn anfrage_erstellen_und_laden() {
    let db = db().await;
    let requester = Uuid::new_v4();

    let anfrage = AnfrageRepository::create(
        &db,
        NeueAnfrage {
            requester_id: requester,
            art: AnfrageArt::Direct,
            room_id: None,
            expires_at: Utc::now() + Duration::minutes(10),
        },
    )
    .await
    .unwrap();

    assert_eq!(anfrage.status, AnfrageStatus::Available);
    assert!(anfrage.room_id.is_none());
    assert!(anfrage.acceptor_id.is_none());

    let geladen = AnfrageRepository::get(&db, anfrage.id).await.unwrap().unwrap();
    assert_eq!(geladen.id, anfrage.id);
    assert_eq!(geladen.requester_id, requester);
    assert_eq!(geladen.art, AnfrageArt::Direct);
}

#[tokio::test]
async fn gruppenanfrage_mit_raum_erstellen() {
    let db = db().await;

    let anfrage = AnfrageRepository::create(
        &db,
        NeueAnfrage {
            requester_id: Uuid::new_v4(),
            art: AnfrageArt::Group,
            room_id: Some("group-call-123-abcdefghi"),
            expires_at: Utc::now() + Duration::minutes(10),
        },
    )
    .await
    .unwrap();

    assert_eq!(anfrage.art, AnfrageArt::Group);
    assert_eq!(anfrage.room_id.as_deref(), Some("group-call-123-abcdefghi"));
}

#[tokio::test]
async fn discovery_schliesst_eigene_und_abgelaufene_aus() {
    let db = db().await;
    let ich = Uuid::new_v4();
    let anderer = Uuid::new_v4();

    // Eigene Anfrage
    offene_anfrage(&db, ich).await;
    // Fremde, offene Anfrage
    let fremde = offene_anfrage(&db, anderer).await;
    // Fremde, aber bereits abgelaufene Anfrage
    AnfrageRepository::create(
        &db,
        NeueAnfrage {
            requester_id: anderer,
            art: AnfrageArt::Direct,
            room_id: None,
            expires_at: Utc::now() - Duration::seconds(1),
        },
    )
    .await
    .unwrap();

    let sichtbar = db.list_available(Some(ich), Utc::now(), 50).await.unwrap();
    assert_eq!(sichtbar.len(), 1);
    assert_eq!(sichtbar[0].id, fremde);
}

#[tokio::test]
async fn discovery_sortiert_aelteste_zuerst() {
    let db = db().await;
    let erste = offene_anfrage(&db, Uuid::new_v4()).await;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let zweite = offene_anfrage(&db, Uuid::new_v4()).await;

    let sichtbar = db.list_available(None, Utc::now(), 50).await.unwrap();
    assert_eq!(sichtbar.len(), 2);
    assert_eq!(sichtbar[0].id, erste, "aelteste Anfrage muss vorne stehen");
    assert_eq!(sichtbar[1].id, zweite);
}

#[tokio::test]
async fn mark_matched_genau_einmal() {
    let db = db().await;
    let id = offene_anfrage(&db, Uuid::new_v4()).await;
    let acceptor_a = Uuid::new_v4();
    let acceptor_b = Uuid::new_v4();

    let erster = db
        .mark_matched(id, "quick-connect-1-aaa", Some(acceptor_a))
        .await
        .unwrap();
    assert_eq!(erster, 1);

    // Zweiter Versuch trifft keine 'available'-Zeile mehr
    let zweiter = db
        .mark_matched(id, "quick-connect-2-bbb", Some(acceptor_b))
        .await
        .unwrap();
    assert_eq!(zweiter, 0);

    let zeile = AnfrageRepository::get(&db, id).await.unwrap().unwrap();
    assert_eq!(zeile.status, AnfrageStatus::Matched);
    assert_eq!(zeile.room_id.as_deref(), Some("quick-connect-1-aaa"));
    assert_eq!(zeile.acceptor_id, Some(acceptor_a));
}

#[tokio::test]
async fn cancel_gegen_accept_race() {
    let db = db().await;
    let id = offene_anfrage(&db, Uuid::new_v4()).await;

    // Accept gewinnt
    assert_eq!(db.mark_matched(id, "raum", Some(Uuid::new_v4())).await.unwrap(), 1);
    // Cancel verliert und sieht 0 Treffer
    assert_eq!(db.mark_completed_if_available(id).await.unwrap(), 0);

    let zeile = AnfrageRepository::get(&db, id).await.unwrap().unwrap();
    assert_eq!(zeile.status, AnfrageStatus::Matched);
}

#[tokio::test]
async fn status_monotonie_terminal_bleibt_terminal() {
    let db = db().await;
    let id = offene_anfrage(&db, Uuid::new_v4()).await;

    assert_eq!(db.mark_completed_if_available(id).await.unwrap(), 1);

    // Keine Rueckkehr aus 'completed': weder Match noch erneutes Complete
    assert_eq!(db.mark_matched(id, "raum", None).await.unwrap(), 0);
    assert_eq!(db.mark_completed(id).await.unwrap(), 0);

    let zeile = AnfrageRepository::get(&db, id).await.unwrap().unwrap();
    assert_eq!(zeile.status, AnfrageStatus::Completed);
}

#[tokio::test]
async fn abschluss_aus_matched() {
    let db = db().await;
    let id = offene_anfrage(&db, Uuid::new_v4()).await;

    assert_eq!(db.mark_matched(id, "raum", Some(Uuid::new_v4())).await.unwrap(), 1);
    assert_eq!(db.mark_completed(id).await.unwrap(), 1);

    let zeile = AnfrageRepository::get(&db, id).await.unwrap().unwrap();
    assert_eq!(zeile.status, AnfrageStatus::Completed);
}

#[tokio::test]
async fn expire_stale_sweep() {
    let db = db().await;
    let frisch = offene_anfrage(&db, Uuid::new_v4()).await;
    AnfrageRepository::create(
        &db,
        NeueAnfrage {
            requester_id: Uuid::new_v4(),
            art: AnfrageArt::Direct,
            room_id: None,
            expires_at: Utc::now() - Duration::minutes(1),
        },
    )
    .await
    .unwrap();

    let geaendert = db.expire_stale(Utc::now()).await.unwrap();
    assert_eq!(geaendert, 1);

    let zeile = AnfrageRepository::get(&db, frisch).await.unwrap().unwrap();
    assert_eq!(zeile.status, AnfrageStatus::Available, "frische Zeile bleibt unberuehrt");
}

#[tokio::test]
async fn oeffnen_fuehrt_migrationen_selbst_aus() {
    // Direkt nach dem Oeffnen steht das Schema; ein zweiter
    // Migrationslauf durch den Aufrufer ist unnoetig.
    let db = SqliteDb::oeffnen("sqlite::memory:", 1)
        .await
        .expect("DB konnte nicht geoeffnet werden");

    let anfrage = AnfrageRepository::create(
        &db,
        NeueAnfrage {
            requester_id: Uuid::new_v4(),
            art: AnfrageArt::Direct,
            room_id: None,
            expires_at: Utc::now() + Duration::minutes(10),
        },
    )
    .await
    .unwrap();
    assert_eq!(anfrage.status, AnfrageStatus::Available);
}
