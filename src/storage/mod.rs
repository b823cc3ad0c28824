use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};

use crate::model::ParseEnumError;
use crate::types::{PostgresConfig, RedisConfig};

pub mod memory;
pub mod models;
pub mod repository;
pub mod state;

pub use memory::MemoryRepository;
pub use repository::{AdsRepository, PgRepository};
pub use state::{profile_lock_key, LocalRunLock, RedisRunLock, RunLock, RunLockBackend};

pub type PgPool = Pool<Postgres>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("stored value could not be decoded: {0}")]
    Decode(#[from] ParseEnumError),

    #[error("report {0:?} is not keyed by target")]
    UnsupportedReport(crate::performance::ReportKind),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Create a PostgreSQL connection pool using the provided config.
///
/// Connection establishment is performed eagerly so misconfiguration
/// is surfaced early at startup.
pub async fn create_pg_pool(cfg: &PostgresConfig) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(std::time::Duration::from_secs(15))
        .connect(&cfg.url)
        .await?;
    Ok(pool)
}

pub fn create_redis_client(cfg: &RedisConfig) -> anyhow::Result<redis::Client> {
    let client = redis::Client::open(cfg.url.as_str())?;
    Ok(client)
}
