//! Outbox Repository
//!
//! Events are written in the same transaction as the change they announce.
//! Relaying them to the broker happens elsewhere.

use sqlx::PgConnection;
use uuid::Uuid;

/// Append an event to the outbox, returning its id
pub async fn insert(
    conn: &mut PgConnection,
    routing_key: &str,
    payload: &serde_json::Value,
) -> Result<Uuid, sqlx::Error> {
    let id = Uuid::new_v4();

    sqlx::query("INSERT INTO outbox (id, routing_key, payload) VALUES ($1, $2, $3)")
        .bind(id)
        .bind(routing_key)
        .bind(payload)
        .execute(&mut *conn)
        .await?;

    Ok(id)
}
