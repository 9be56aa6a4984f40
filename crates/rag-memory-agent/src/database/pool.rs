use crate::config::MemoryConfig;
use crate::utils::error::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

#[derive(Clone)]
pub struct DbPool {
    pool: SqlitePool,
}

impl DbPool {
    pub async fn new(config: &MemoryConfig) -> Result<Self> {
        if let Some(parent) = config.ltm_db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.ltm_db_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.pool_max_size.max(1))
            .connect_with(options)
            .await?;

        // Test connection
        sqlx::query("SELECT 1").execute(&pool).await?;

        info!(path = %config.ltm_db_path.display(), "Opened long-term memory database");

        Ok(Self { pool })
    }

    pub fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
