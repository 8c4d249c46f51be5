use tempfile::TempDir;
use time::macros::date;

use boxdesk::absences::{AbsencePatch, AbsenceStore};
use boxdesk::db::Database;
use boxdesk::error::BoxdeskError;
use boxdesk::reservations::{ReservationPatch, ReservationStore, DEFAULT_RESERVED_BY};
use boxdesk::threads::ThreadStore;

async fn open_db(dir: &TempDir) -> Database {
    let path = dir.path().join("nested").join("boxdesk.db");
    Database::open(path.to_str().unwrap()).await.unwrap()
}

#[tokio::test]
async fn schema_is_created_once_and_reopen_is_harmless() {
    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir).await;
    assert_eq!(
        db.table_names().await.unwrap(),
        vec!["absences", "reservations", "user_threads"]
    );
    db.ping().await.unwrap();
    db.verify_schema().await.unwrap();

    let store = ReservationStore::new(db.clone());
    store.create("2025-06-12", "10:00", "Ana").await.unwrap();
    drop(store);
    drop(db);

    let reopened = open_db(&dir).await;
    assert_eq!(reopened.table_names().await.unwrap().len(), 3);
    let rows = ReservationStore::new(reopened).list_all().await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn schema_check_reports_missing_tables() {
    use diesel::{Connection, RunQueryDsl, SqliteConnection};

    let dir = tempfile::tempdir().unwrap();
    let db = open_db(&dir).await;
    let mut raw = SqliteConnection::establish(db.path()).unwrap();
    diesel::sql_query("DROP TABLE absences").execute(&mut raw).unwrap();

    match db.verify_schema().await {
        Err(BoxdeskError::Unavailable(detail)) => assert_eq!(detail, "missing tables: absences"),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn reservations_are_validated_and_defaulted() {
    let dir = tempfile::tempdir().unwrap();
    let store = ReservationStore::new(open_db(&dir).await);

    let created = store.create("2025-06-12", "9:30", "  ").await.unwrap();
    assert_eq!(created.hour, "09:30");
    assert_eq!(created.reserved_by, DEFAULT_RESERVED_BY);

    // Same slot twice is accepted.
    store.create("2025-06-12", "09:30", "Bo").await.unwrap();
    assert_eq!(store.list_all().await.unwrap().len(), 2);

    let err = store.create("12/06/2025", "10:00", "Ana").await.unwrap_err();
    assert!(matches!(err, BoxdeskError::InvalidInput(_)));
    let err = store.create("2025-06-12", "25:00", "Ana").await.unwrap_err();
    assert!(matches!(err, BoxdeskError::InvalidInput(_)));
}

#[tokio::test]
async fn upcoming_reservations_respect_date_and_hour() {
    let dir = tempfile::tempdir().unwrap();
    let store = ReservationStore::new(open_db(&dir).await);
    store.create("2025-06-09", "18:00", "past").await.unwrap();
    store.create("2025-06-10", "08:00", "earlier today").await.unwrap();
    store.create("2025-06-10", "14:00", "later today").await.unwrap();
    store.create("2025-06-11", "07:00", "tomorrow").await.unwrap();

    let upcoming = store
        .list_upcoming(date!(2025 - 06 - 10), "12:00")
        .await
        .unwrap();
    let owners: Vec<&str> = upcoming.iter().map(|r| r.reserved_by.as_str()).collect();
    assert_eq!(owners, vec!["later today", "tomorrow"]);
}

#[tokio::test]
async fn reservation_updates_are_partial() {
    let dir = tempfile::tempdir().unwrap();
    let store = ReservationStore::new(open_db(&dir).await);
    let created = store.create("2025-06-12", "10:00", "Ana").await.unwrap();

    let updated = store
        .update(
            created.id,
            ReservationPatch {
                hour: Some("11h".to_string()),
                reserved_by: Some(String::new()),
                ..ReservationPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.hour, "11:00");
    assert_eq!(updated.date, "2025-06-12");
    assert_eq!(updated.reserved_by, "Ana");

    let err = store
        .update(created.id, ReservationPatch::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BoxdeskError::InvalidInput(_)));

    let err = store
        .update(
            999,
            ReservationPatch {
                reserved_by: Some("Bo".to_string()),
                ..ReservationPatch::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BoxdeskError::NotFound(_)));
}

#[tokio::test]
async fn absences_list_from_today_and_update() {
    let dir = tempfile::tempdir().unwrap();
    let store = AbsenceStore::new(open_db(&dir).await);
    store.create("Zoe", "2025-06-09").await.unwrap();
    let today = store.create("Ana", "2025-06-10").await.unwrap();
    store.create("Ana", "2025-06-10").await.unwrap();

    let upcoming = store.list_upcoming(date!(2025 - 06 - 10)).await.unwrap();
    assert_eq!(upcoming.len(), 2);
    assert!(upcoming.iter().all(|a| a.date == "2025-06-10"));
    assert_eq!(store.list_all().await.unwrap().len(), 3);

    let updated = store
        .update(
            today.id,
            AbsencePatch {
                name: Some("Anaïs".to_string()),
                date: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "Anaïs");
    assert_eq!(updated.date, "2025-06-10");

    assert!(matches!(
        store.create(" ", "2025-06-10").await.unwrap_err(),
        BoxdeskError::InvalidInput(_)
    ));
    assert!(matches!(
        store
            .update(42, AbsencePatch { name: Some("x".into()), date: None })
            .await
            .unwrap_err(),
        BoxdeskError::NotFound(_)
    ));
}

#[tokio::test]
async fn one_thread_row_per_user() {
    let dir = tempfile::tempdir().unwrap();
    let threads = ThreadStore::new(open_db(&dir).await);
    assert_eq!(threads.get("u1").await.unwrap(), None);

    threads.upsert("u1", "thread_a").await.unwrap();
    threads.upsert("u1", "thread_b").await.unwrap();
    threads.upsert("u2", "thread_c").await.unwrap();

    assert_eq!(threads.get("u1").await.unwrap().as_deref(), Some("thread_b"));
    assert_eq!(threads.count().await.unwrap(), 2);
    assert!(threads.delete("u1").await.unwrap());
    assert!(!threads.delete("u1").await.unwrap());
    assert_eq!(threads.count().await.unwrap(), 1);
}
