//! Integration tests for the infrastructure components
//!
//! The database test needs a reachable PostgreSQL instance and is ignored
//! by default; run it with `cargo test -- --ignored`.

use common::{
    cache::{CacheConfig, LocalCache},
    database::{DatabaseConfig, health_check, init_pool},
};
use sqlx::Row;

/// Test that verifies PostgreSQL is accessible and can run a query
#[tokio::test]
#[ignore = "requires a running PostgreSQL instance"]
async fn test_database_integration() -> Result<(), Box<dyn std::error::Error>> {
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    assert!(health_check(&pool).await?, "Database health check failed");

    let row = sqlx::query("SELECT 1 as result").fetch_one(&pool).await?;
    let result: i32 = row.get("result");
    assert_eq!(result, 1, "PostgreSQL simple query test failed");

    Ok(())
}

/// Test that the cache is shared between clones
#[test]
fn test_cache_clones_share_entries() {
    let cache: LocalCache<String, String> = LocalCache::new(&CacheConfig::default());
    let other = cache.clone();

    cache.put("integration_test_key".to_string(), "value".to_string());
    assert_eq!(
        other.get(&"integration_test_key".to_string()),
        Some("value".to_string())
    );

    other.flush();
    assert_eq!(cache.get(&"integration_test_key".to_string()), None);
}
