use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

/// Connection pools for the insurance store.
///
/// `pool` connects with the restricted (row-level-security) role. `service_pool`
/// is only present when a service-role URL is configured.
pub struct Database {
    pub pool: PgPool,
    pub service_pool: Option<PgPool>,
}

async fn connect_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await?;

    sqlx::query("SELECT 1").execute(&pool).await?;

    Ok(pool)
}

impl Database {
    pub async fn new(database_url: &str, service_url: Option<&str>) -> anyhow::Result<Self> {
        let pool = connect_pool(database_url).await?;

        let service_pool = match service_url {
            Some(url) => Some(connect_pool(url).await?),
            None => None,
        };

        Ok(Self { pool, service_pool })
    }
}
