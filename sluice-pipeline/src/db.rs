use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

/// Creates the Postgres connection pool
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

/// Creates the tables and indexes if they do not exist yet
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create pipeline configs table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline_configs (
            id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
            datasource_id BIGINT NOT NULL,
            func TEXT NOT NULL,
            schema JSONB,
            author VARCHAR(255) NOT NULL,
            display_name VARCHAR(255) NOT NULL,
            license VARCHAR(255) NOT NULL,
            description TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Triggers look configs up by datasource
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_pipeline_configs_datasource_id ON pipeline_configs(datasource_id)",
    )
    .execute(pool)
    .await?;

    // Create transformed data table
    // Rows outlive their config; a deleted pipeline keeps its history
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS transformed_data (
            id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
            pipeline_id BIGINT NOT NULL,
            health_status VARCHAR(20) NOT NULL,
            data JSONB NOT NULL,
            schema JSONB,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create index for latest-per-pipeline reads
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_transformed_data_pipeline_id ON transformed_data(pipeline_id, created_at DESC)",
    )
    .execute(pool)
    .await?;

    // Create outbox table, drained by the message relay
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS outbox (
            id UUID PRIMARY KEY,
            routing_key VARCHAR(255) NOT NULL,
            payload JSONB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
