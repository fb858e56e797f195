use crate::config::DatabaseConfig;
use sqlx::{postgres::PgPoolOptions, PgPool};

const SCHEMA: &str = include_str!("../migrations/0001_init.sql");

pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}

/// Create the transcript and review tables if they are missing.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    tracing::info!("Database schema ready");
    Ok(())
}
