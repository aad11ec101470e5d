use azurerm_sqlplugin::db::{ConnectionManager, DbPool, ReconciliationEngine};
use azurerm_sqlplugin::error::ProviderError;
use azurerm_sqlplugin::models::{ConnectionDescriptor, DatabaseType};
use rand::Rng;
use rand::distributions::Alphanumeric;
use secrecy::SecretString;
use std::time::Duration;
use tempfile::NamedTempFile;

/// Open a pool on a fresh SQLite file holding an empty `Employees` table.
async fn employees_pool(temp_file: &NamedTempFile) -> DbPool {
    let db_path = temp_file.path().to_str().unwrap().to_string();
    let manager = ConnectionManager::new(Duration::from_secs(5));
    let descriptor = ConnectionDescriptor::new(
        DatabaseType::SQLite,
        db_path,
        "",
        "",
        "",
        SecretString::from(String::new()),
    )
    .unwrap();

    let pool = manager.open(&descriptor).await.unwrap();
    if let DbPool::SQLite(p) = &pool {
        sqlx::query(
            "CREATE TABLE Employees (Id INTEGER PRIMARY KEY AUTOINCREMENT, \
             Name TEXT NOT NULL, Location TEXT NOT NULL)",
        )
        .execute(p)
        .await
        .expect("CREATE TABLE should work");
    } else {
        panic!("Expected SQLite pool");
    }
    pool
}

fn random_text(rng: &mut impl Rng, len: usize) -> String {
    rng.sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[tokio::test]
async fn test_employee_lifecycle() {
    let temp_file = NamedTempFile::new().unwrap();
    let pool = employees_pool(&temp_file).await;
    let engine = ReconciliationEngine::new();

    let id = engine.create(&pool, "Jake", "United States").await.unwrap();
    assert!(id > 0);

    let found = engine.read(&pool, "Jake", "United States").await.unwrap();
    assert_eq!(found, id);

    let rows = engine.update(&pool, "Jake", "Canada").await.unwrap();
    assert_eq!(rows, 1);
    let found = engine.read(&pool, "Jake", "Canada").await.unwrap();
    assert_eq!(found, id);

    // The old location no longer matches
    let err = engine
        .read(&pool, "Jake", "United States")
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let rows = engine.delete(&pool, "Jake", "Canada").await.unwrap();
    assert_eq!(rows, 1);
    let err = engine.read(&pool, "Jake", "Canada").await.unwrap_err();
    assert!(matches!(err, ProviderError::NotFound { .. }));
}

#[tokio::test]
async fn test_create_is_not_idempotent() {
    let temp_file = NamedTempFile::new().unwrap();
    let pool = employees_pool(&temp_file).await;
    let engine = ReconciliationEngine::new();

    let first = engine.create(&pool, "Ana", "Lisbon").await.unwrap();
    let second = engine.create(&pool, "Ana", "Lisbon").await.unwrap();
    assert_ne!(first, second);
}

#[tokio::test]
async fn test_duplicate_pairs_resolve_to_lowest_id() {
    let temp_file = NamedTempFile::new().unwrap();
    let pool = employees_pool(&temp_file).await;
    let engine = ReconciliationEngine::new();

    let first = engine.create(&pool, "Ana", "Lisbon").await.unwrap();
    let _second = engine.create(&pool, "Ana", "Lisbon").await.unwrap();

    for _ in 0..3 {
        let found = engine.read(&pool, "Ana", "Lisbon").await.unwrap();
        assert_eq!(found, first);
    }

    // Update by name touches every duplicate
    let rows = engine.update(&pool, "Ana", "Porto").await.unwrap();
    assert_eq!(rows, 2);
}

#[tokio::test]
async fn test_missing_rows_are_not_errors_for_update_and_delete() {
    let temp_file = NamedTempFile::new().unwrap();
    let pool = employees_pool(&temp_file).await;
    let engine = ReconciliationEngine::new();

    assert_eq!(engine.update(&pool, "Nobody", "Nowhere").await.unwrap(), 0);
    assert_eq!(engine.delete(&pool, "Nobody", "Nowhere").await.unwrap(), 0);
    assert_eq!(engine.update_by_id(&pool, 999, "A", "B").await.unwrap(), 0);
    assert_eq!(engine.delete_by_id(&pool, 999).await.unwrap(), 0);
}

#[tokio::test]
async fn test_id_keyed_operations() {
    let temp_file = NamedTempFile::new().unwrap();
    let pool = employees_pool(&temp_file).await;
    let engine = ReconciliationEngine::new();

    let id = engine.create(&pool, "Jake", "United States").await.unwrap();

    let record = engine.read_by_id(&pool, id).await.unwrap();
    assert_eq!(record.id, id);
    assert_eq!(record.name, "Jake");
    assert_eq!(record.location, "United States");

    let rows = engine
        .update_by_id(&pool, id, "Jacob", "Canada")
        .await
        .unwrap();
    assert_eq!(rows, 1);
    let record = engine.read_by_id(&pool, id).await.unwrap();
    assert_eq!(record.name, "Jacob");
    assert_eq!(record.location, "Canada");

    assert_eq!(engine.delete_by_id(&pool, id).await.unwrap(), 1);
    let err = engine.read_by_id(&pool, id).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_values_with_quotes_are_bound_not_interpolated() {
    let temp_file = NamedTempFile::new().unwrap();
    let pool = employees_pool(&temp_file).await;
    let engine = ReconciliationEngine::new();

    let name = "O'Brien'); DROP TABLE Employees; --";
    let id = engine.create(&pool, name, "Dublin").await.unwrap();
    assert_eq!(engine.read(&pool, name, "Dublin").await.unwrap(), id);

    // Table still exists and holds the row
    assert_eq!(engine.read_by_id(&pool, id).await.unwrap().name, name);
}

#[tokio::test]
async fn test_generated_pairs_round_trip() {
    let temp_file = NamedTempFile::new().unwrap();
    let pool = employees_pool(&temp_file).await;
    let engine = ReconciliationEngine::new();
    let mut rng = rand::thread_rng();

    for i in 0..20 {
        let name = format!("{}-{}", random_text(&mut rng, 12), i);
        let len = rng.gen_range(1..32);
        let location = random_text(&mut rng, len);

        let id = engine.create(&pool, &name, &location).await.unwrap();
        assert_eq!(engine.read(&pool, &name, &location).await.unwrap(), id);
    }
}

#[tokio::test]
async fn test_missing_table_is_data_error() {
    let temp_file = NamedTempFile::new().unwrap();
    let db_path = temp_file.path().to_str().unwrap().to_string();
    let manager = ConnectionManager::new(Duration::from_secs(5));
    let descriptor = ConnectionDescriptor::new(
        DatabaseType::SQLite,
        db_path,
        "",
        "",
        "",
        SecretString::from(String::new()),
    )
    .unwrap();
    let pool = manager.connect(&descriptor).await.unwrap();

    let err = ReconciliationEngine::new()
        .create(&pool, "Jake", "United States")
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::Data { .. }));
}

#[tokio::test]
async fn test_unreachable_server_is_connection_error() {
    let manager = ConnectionManager::new(Duration::from_secs(2));
    let descriptor = ConnectionDescriptor::new(
        DatabaseType::PostgreSQL,
        "127.0.0.1",
        "1",
        "hr",
        "admin",
        SecretString::from("pw".to_string()),
    )
    .unwrap();

    // Opening is lazy and succeeds without a server
    let pool = manager.open(&descriptor).await.unwrap();

    let engine =
        ReconciliationEngine::with_timeouts(Duration::from_secs(2), Duration::from_secs(5));
    let err = engine.read(&pool, "Jake", "Canada").await.unwrap_err();
    assert!(matches!(err, ProviderError::Connection { .. }));
    assert!(err.is_retryable());
}
