//! Pipeline Config Repository
//!
//! Handles all database operations related to pipeline configs.

use sluice_core::domain::pipeline::{Metadata, PipelineConfig, TransformationConfig};
use sluice_core::dto::pipeline::PipelineConfigDto;
use sqlx::PgConnection;

const COLUMNS: &str = "id, datasource_id, func, schema, author, display_name, license, description, created_at";

/// Insert a new config; the id and creation timestamp are assigned here
pub async fn insert(
    conn: &mut PgConnection,
    dto: &PipelineConfigDto,
) -> Result<PipelineConfig, sqlx::Error> {
    let row = sqlx::query_as::<_, PipelineConfigRow>(&format!(
        r#"
        INSERT INTO pipeline_configs (
            datasource_id, func, schema, author, display_name, license, description, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(dto.datasource_id)
    .bind(&dto.transformation.func)
    .bind(&dto.schema)
    .bind(&dto.metadata.author)
    .bind(&dto.metadata.display_name)
    .bind(&dto.metadata.license)
    .bind(&dto.metadata.description)
    .bind(chrono::Utc::now())
    .fetch_one(&mut *conn)
    .await?;

    Ok(row.into())
}

/// Find a config by ID
pub async fn find_by_id(
    conn: &mut PgConnection,
    id: i64,
) -> Result<Option<PipelineConfig>, sqlx::Error> {
    let row = sqlx::query_as::<_, PipelineConfigRow>(&format!(
        "SELECT {COLUMNS} FROM pipeline_configs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// List all configs
pub async fn list_all(conn: &mut PgConnection) -> Result<Vec<PipelineConfig>, sqlx::Error> {
    let rows = sqlx::query_as::<_, PipelineConfigRow>(&format!(
        "SELECT {COLUMNS} FROM pipeline_configs ORDER BY id"
    ))
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// List the configs bound to a datasource
pub async fn list_by_datasource(
    conn: &mut PgConnection,
    datasource_id: i64,
) -> Result<Vec<PipelineConfig>, sqlx::Error> {
    let rows = sqlx::query_as::<_, PipelineConfigRow>(&format!(
        "SELECT {COLUMNS} FROM pipeline_configs WHERE datasource_id = $1 ORDER BY id"
    ))
    .bind(datasource_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Replace a config; the creation timestamp is kept
///
/// Returns `None` when no config has `id`.
pub async fn update(
    conn: &mut PgConnection,
    id: i64,
    dto: &PipelineConfigDto,
) -> Result<Option<PipelineConfig>, sqlx::Error> {
    let row = sqlx::query_as::<_, PipelineConfigRow>(&format!(
        r#"
        UPDATE pipeline_configs
        SET datasource_id = $1, func = $2, schema = $3, author = $4,
            display_name = $5, license = $6, description = $7
        WHERE id = $8
        RETURNING {COLUMNS}
        "#
    ))
    .bind(dto.datasource_id)
    .bind(&dto.transformation.func)
    .bind(&dto.schema)
    .bind(&dto.metadata.author)
    .bind(&dto.metadata.display_name)
    .bind(&dto.metadata.license)
    .bind(&dto.metadata.description)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Delete a config by ID, returning the deleted row
pub async fn delete(
    conn: &mut PgConnection,
    id: i64,
) -> Result<Option<PipelineConfig>, sqlx::Error> {
    let row = sqlx::query_as::<_, PipelineConfigRow>(&format!(
        "DELETE FROM pipeline_configs WHERE id = $1 RETURNING {COLUMNS}"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Delete every config, returning the deleted rows
pub async fn delete_all(conn: &mut PgConnection) -> Result<Vec<PipelineConfig>, sqlx::Error> {
    let rows = sqlx::query_as::<_, PipelineConfigRow>(&format!(
        "DELETE FROM pipeline_configs RETURNING {COLUMNS}"
    ))
    .fetch_all(&mut *conn)
    .await?;

    let mut configs: Vec<PipelineConfig> = rows.into_iter().map(|r| r.into()).collect();
    configs.sort_by_key(|c| c.id);
    Ok(configs)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct PipelineConfigRow {
    id: i64,
    datasource_id: i64,
    func: String,
    schema: Option<serde_json::Value>,
    author: String,
    display_name: String,
    license: String,
    description: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<PipelineConfigRow> for PipelineConfig {
    fn from(row: PipelineConfigRow) -> Self {
        PipelineConfig {
            id: row.id,
            datasource_id: row.datasource_id,
            transformation: TransformationConfig { func: row.func },
            metadata: Metadata {
                author: row.author,
                display_name: row.display_name,
                license: row.license,
                description: row.description,
                creation_timestamp: row.created_at,
            },
            schema: row.schema,
        }
    }
}
