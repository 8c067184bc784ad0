pub mod postgres;
pub mod redis;
pub mod migrations;
pub mod stores;
pub mod repositories;

#[cfg(any(test, feature = "testing"))]
pub mod memory;

pub use postgres::{PostgresPool, create_postgres_pool, health_check as postgres_health_check};
pub use self::redis::{RedisCache, RedisPool, create_redis_pool, health_check as redis_health_check};
pub use stores::*;
pub use repositories::*;

use std::time::Duration;
use tix_utils::{DatabaseConfig, TixResult};

pub async fn initialize_databases(config: &DatabaseConfig) -> TixResult<(PostgresPool, RedisPool)> {
    let postgres_pool = create_postgres_pool(
        &config.postgres_url,
        config.max_connections,
        Duration::from_secs(config.connection_timeout_seconds),
    )
    .await?;
    let redis_pool = create_redis_pool(&config.redis_url).await?;

    migrations::run_postgres_migrations(&postgres_pool).await?;

    Ok((postgres_pool, redis_pool))
}
