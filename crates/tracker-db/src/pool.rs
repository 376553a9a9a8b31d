use crate::{config::DatabaseConfig, DatabaseError, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

/// Postgres pool shared by the account and token stores
#[derive(Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    /// Open the pool without touching the schema
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!(
            database = %config.display_target(),
            max_connections = config.max_connections,
            "Opening database pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .connect(&config.url)
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Open the pool, apply the embedded schema when configured and verify
    /// the connection answers
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = Self::new(config).await?;
        if config.run_migrations {
            pool.migrate().await?;
        }
        pool.health_check().await?;
        Ok(pool)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./src/migrations").run(&self.pool).await?;
        info!("Schema up to date");
        Ok(())
    }

    pub fn inner(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
