//! Database reconciler behavior against the in-memory fake.

mod common;

use common::{DatabaseHarness, database, key};
use spanner_admin::{Call, Op};
use spanner_operator::{Error, Reconciler};

#[tokio::test]
async fn test_create_missing_database() {
    let h = DatabaseHarness::new();
    h.admin.insert_instance("prod-1", 1, &[]);
    h.store.insert(database("orders", "prod-1"));

    h.reconciler.sync(&key("orders")).await.unwrap();

    assert_eq!(
        h.admin.mutations(),
        vec![Call::CreateDatabase {
            instance_id: "prod-1".into(),
            name: "orders".into(),
        }]
    );
    assert!(h.admin.database("prod-1", "orders").is_some());
    assert_eq!(h.store.writes().len(), 1);
    assert_eq!(h.recorder.reasons(), vec!["Synced"]);
}

#[tokio::test]
async fn test_existing_database_is_left_alone() {
    let h = DatabaseHarness::new();
    h.admin.insert_instance("prod-1", 1, &[]);
    h.admin.insert_database("prod-1", "orders");
    h.store.insert(database("orders", "prod-1"));

    h.reconciler.sync(&key("orders")).await.unwrap();
    h.reconciler.sync(&key("orders")).await.unwrap();

    assert!(h.admin.mutations().is_empty());
    assert_eq!(h.store.writes().len(), 2);
    // Only the first write adds the status block
    assert_eq!(h.store.changed_writes(), 1);
}

#[tokio::test]
async fn test_missing_instance_never_creates_database() {
    let h = DatabaseHarness::new();
    h.store.insert(database("orders", "absent"));

    for _ in 0..3 {
        let err = h.reconciler.sync(&key("orders")).await.unwrap_err();
        assert!(matches!(err, Error::DependencyMissing(_)));
        assert!(err.is_retryable());
    }

    assert_eq!(h.admin.count(Op::CreateDatabase), 0);
    assert!(h.store.writes().is_empty());
    assert_eq!(h.recorder.reasons(), vec!["SyncFailed"; 3]);
}

#[tokio::test]
async fn test_deleted_object_keeps_database() {
    let h = DatabaseHarness::new();
    h.admin.insert_instance("prod-1", 1, &[]);
    h.admin.insert_database("prod-1", "orders");

    h.reconciler.sync(&key("orders")).await.unwrap();

    assert!(h.admin.calls().is_empty());
    assert!(h.admin.database("prod-1", "orders").is_some());
}

#[tokio::test]
async fn test_get_database_error_is_propagated() {
    let h = DatabaseHarness::new();
    h.admin.insert_instance("prod-1", 1, &[]);
    h.store.insert(database("orders", "prod-1"));
    h.admin.fail_times(Op::GetDatabase, 1, "unavailable");

    assert!(matches!(
        h.reconciler.sync(&key("orders")).await,
        Err(Error::Admin(_))
    ));
    assert_eq!(h.admin.count(Op::CreateDatabase), 0);

    // Recovers on the next pass
    h.reconciler.sync(&key("orders")).await.unwrap();
    assert_eq!(h.admin.count(Op::CreateDatabase), 1);
}
