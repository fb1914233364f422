//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p instance-store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use instance_store::{
    CorrelationId, InstanceRecord, InstanceStore, InstanceStoreError, InstanceStoreExt,
    PostgresInstanceStore, Version,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_saga_instances_table.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and a cleared table
async fn get_test_store() -> PostgresInstanceStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE saga_instances")
        .execute(&pool)
        .await
        .unwrap();

    PostgresInstanceStore::new(pool)
}

fn record(id: CorrelationId, sleep_count: u32) -> InstanceRecord {
    InstanceRecord::new(
        id,
        "Developer",
        serde_json::json!({ "state": "Performing", "sleep_count": sleep_count }),
    )
}

#[tokio::test]
#[serial]
async fn create_then_load_instance() {
    let store = get_test_store().await;
    let id = CorrelationId::new();

    let version = store
        .compare_and_swap(Version::initial(), record(id, 0))
        .await
        .unwrap();
    assert_eq!(version, Version::first());

    let loaded = store.load(id).await.unwrap().unwrap();
    assert_eq!(loaded.id, id);
    assert_eq!(loaded.saga_type, "Developer");
    assert_eq!(loaded.version, Version::first());
    assert_eq!(loaded.state["state"], "Performing");
}

#[tokio::test]
#[serial]
async fn missing_instance_loads_as_none() {
    let store = get_test_store().await;
    assert!(store.load(CorrelationId::new()).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn update_with_matching_version_succeeds() {
    let store = get_test_store().await;
    let id = CorrelationId::new();

    store
        .compare_and_swap(Version::initial(), record(id, 0))
        .await
        .unwrap();
    let version = store
        .compare_and_swap(Version::first(), record(id, 1))
        .await
        .unwrap();

    assert_eq!(version, Version::new(2));
    let loaded = store.load(id).await.unwrap().unwrap();
    assert_eq!(loaded.state["sleep_count"], 1);
}

#[tokio::test]
#[serial]
async fn stale_update_reports_actual_version() {
    let store = get_test_store().await;
    let id = CorrelationId::new();

    store
        .compare_and_swap(Version::initial(), record(id, 0))
        .await
        .unwrap();
    store
        .compare_and_swap(Version::first(), record(id, 1))
        .await
        .unwrap();

    let err = store
        .compare_and_swap(Version::first(), record(id, 9))
        .await
        .unwrap_err();
    match err {
        InstanceStoreError::VersionConflict {
            expected, actual, ..
        } => {
            assert_eq!(expected, Version::first());
            assert_eq!(actual, Version::new(2));
        }
        other => panic!("Expected VersionConflict, got {other:?}"),
    }
}

#[tokio::test]
#[serial]
async fn duplicate_create_conflicts() {
    let store = get_test_store().await;
    let id = CorrelationId::new();

    store
        .compare_and_swap(Version::initial(), record(id, 0))
        .await
        .unwrap();
    let err = store
        .compare_and_swap(Version::initial(), record(id, 0))
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
#[serial]
async fn concurrent_creates_admit_exactly_one() {
    let store = get_test_store().await;
    let id = CorrelationId::new();

    let attempts = (0..5).map(|n| {
        let store = store.clone();
        async move {
            store
                .compare_and_swap(Version::initial(), record(id, n))
                .await
        }
    });
    let results = futures_util::future::join_all(attempts).await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(store.current_version(id).await.unwrap(), Version::first());
}

#[tokio::test]
#[serial]
async fn remove_deletes_only_at_expected_version() {
    let store = get_test_store().await;
    let id = CorrelationId::new();

    store
        .compare_and_swap(Version::initial(), record(id, 0))
        .await
        .unwrap();

    assert!(
        store
            .remove(id, Version::new(3))
            .await
            .unwrap_err()
            .is_conflict()
    );
    store.remove(id, Version::first()).await.unwrap();
    assert!(!store.exists(id).await.unwrap());

    let err = store.remove(id, Version::first()).await.unwrap_err();
    assert!(matches!(err, InstanceStoreError::InstanceNotFound(_)));
}
