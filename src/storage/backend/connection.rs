use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tracing::info;

use crate::config::DatabaseConfig;
use crate::errors::{LinkgateError, Result};
use migration::{Migrator, MigratorTrait};

/// SQLite with auto-create and the pragmas a mostly-read workload wants.
pub async fn connect_sqlite(database_url: &str) -> Result<DatabaseConnection> {
    use sea_orm::SqlxSqliteConnector;
    use sea_orm::sqlx::SqlitePool;
    use sea_orm::sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
    use std::str::FromStr;

    let opt = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| LinkgateError::database_config(format!("bad SQLite URL: {}", e)))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(5))
        .pragma("cache_size", "-64000")
        .pragma("temp_store", "memory")
        .pragma("mmap_size", "536870912")
        .pragma("wal_autocheckpoint", "1000");

    let pool = SqlitePool::connect_with(opt).await.map_err(|e| {
        LinkgateError::database_connection(format!("cannot connect to SQLite database: {}", e))
    })?;

    Ok(SqlxSqliteConnector::from_sqlx_sqlite_pool(pool))
}

/// MySQL/PostgreSQL with pool sizing and timeouts from config.
pub async fn connect_generic(
    database_url: &str,
    backend_name: &str,
    config: &DatabaseConfig,
) -> Result<DatabaseConnection> {
    let mut opt = ConnectOptions::new(database_url.to_owned());
    opt.max_connections(config.pool_size)
        .min_connections(config.pool_size.min(5))
        .connect_timeout(std::time::Duration::from_secs(config.timeout))
        .acquire_timeout(std::time::Duration::from_secs(config.timeout))
        .idle_timeout(std::time::Duration::from_secs(300))
        .max_lifetime(std::time::Duration::from_secs(3600))
        .sqlx_logging(false);

    Database::connect(opt).await.map_err(|e| {
        LinkgateError::database_connection(format!(
            "cannot connect to {} database: {}",
            backend_name.to_uppercase(),
            e
        ))
    })
}

pub async fn run_migrations(db: &DatabaseConnection) -> Result<()> {
    Migrator::up(db, None)
        .await
        .map_err(|e| LinkgateError::database_operation(format!("migration failed: {}", e)))?;

    info!("Database migrations completed");
    Ok(())
}
