//! Transformed Data Repository
//!
//! Append-only storage of transformation outputs.

use sluice_core::domain::transformed_data::{TransformedData, TransformedDataDto};
use sqlx::PgConnection;

const COLUMNS: &str = "id, pipeline_id, health_status, data, schema, created_at";

/// Append a transformation output
pub async fn insert(
    conn: &mut PgConnection,
    dto: &TransformedDataDto,
) -> Result<TransformedData, sqlx::Error> {
    let row = sqlx::query_as::<_, TransformedDataRow>(&format!(
        r#"
        INSERT INTO transformed_data (pipeline_id, health_status, data, schema, created_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(dto.pipeline_id)
    .bind(dto.health_status.as_str())
    .bind(&dto.data)
    .bind(&dto.schema)
    .bind(chrono::Utc::now())
    .fetch_one(&mut *conn)
    .await?;

    row.try_into()
}

pub async fn find_by_id(
    conn: &mut PgConnection,
    id: i64,
) -> Result<Option<TransformedData>, sqlx::Error> {
    let row = sqlx::query_as::<_, TransformedDataRow>(&format!(
        "SELECT {COLUMNS} FROM transformed_data WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(TryInto::try_into).transpose()
}

/// Most recent output of a pipeline
pub async fn find_latest_by_pipeline(
    conn: &mut PgConnection,
    pipeline_id: i64,
) -> Result<Option<TransformedData>, sqlx::Error> {
    let row = sqlx::query_as::<_, TransformedDataRow>(&format!(
        r#"
        SELECT {COLUMNS} FROM transformed_data
        WHERE pipeline_id = $1
        ORDER BY created_at DESC, id DESC
        LIMIT 1
        "#
    ))
    .bind(pipeline_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(TryInto::try_into).transpose()
}

/// All outputs of a pipeline, newest first
pub async fn list_by_pipeline(
    conn: &mut PgConnection,
    pipeline_id: i64,
) -> Result<Vec<TransformedData>, sqlx::Error> {
    let rows = sqlx::query_as::<_, TransformedDataRow>(&format!(
        r#"
        SELECT {COLUMNS} FROM transformed_data
        WHERE pipeline_id = $1
        ORDER BY created_at DESC, id DESC
        "#
    ))
    .bind(pipeline_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(TryInto::try_into).collect()
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct TransformedDataRow {
    id: i64,
    pipeline_id: i64,
    health_status: String,
    data: serde_json::Value,
    schema: Option<serde_json::Value>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<TransformedDataRow> for TransformedData {
    type Error = sqlx::Error;

    fn try_from(row: TransformedDataRow) -> Result<Self, Self::Error> {
        let health_status = row
            .health_status
            .parse()
            .map_err(|e: String| sqlx::Error::Decode(e.into()))?;

        Ok(TransformedData {
            id: row.id,
            pipeline_id: row.pipeline_id,
            health_status,
            data: row.data,
            schema: row.schema,
            created_at: row.created_at,
        })
    }
}
