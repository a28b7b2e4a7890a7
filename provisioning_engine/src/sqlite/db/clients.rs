use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewProvisionedClient, ProvisionedClient},
    traits::PipelineError,
};

pub async fn fetch_provisioned_unit(
    line_item_id: i64,
    unit_index: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<ProvisionedClient>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM provisioned_clients WHERE line_item_id = $1 AND unit_index = $2")
        .bind(line_item_id)
        .bind(unit_index)
        .fetch_optional(conn)
        .await
}

/// Inserts the provisioned record. The `(line_item_id, unit_index)` unique constraint is what makes a
/// concurrent double-provision of the same unit a hard error instead of a silent duplicate.
pub async fn insert_provisioned_client(
    client: NewProvisionedClient,
    conn: &mut SqliteConnection,
) -> Result<ProvisionedClient, PipelineError> {
    let client: ProvisionedClient = sqlx::query_as(
        r#"
            INSERT INTO provisioned_clients (
                line_item_id,
                unit_index,
                inbound_id,
                protocol,
                credential_id,
                credential_secret,
                expires_at,
                traffic_limit_bytes,
                subscription_link,
                qr_svg
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *;
        "#,
    )
    .bind(client.line_item_id)
    .bind(client.unit_index)
    .bind(client.inbound_id)
    .bind(client.protocol)
    .bind(client.credential_id)
    .bind(client.credential_secret)
    .bind(client.expires_at)
    .bind(client.traffic_limit_bytes)
    .bind(client.subscription_link)
    .bind(client.qr_svg)
    .fetch_one(conn)
    .await?;
    debug!("📝️ Client {} recorded for item {} unit {}", client.credential_id, client.line_item_id, client.unit_index);
    Ok(client)
}

pub async fn fetch_clients_for_order(
    order_pk: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<ProvisionedClient>, sqlx::Error> {
    sqlx::query_as(
        r#"
            SELECT pc.* FROM provisioned_clients pc
            JOIN order_items oi ON oi.id = pc.line_item_id
            WHERE oi.order_id = $1
            ORDER BY pc.line_item_id ASC, pc.unit_index ASC;
        "#,
    )
    .bind(order_pk)
    .fetch_all(conn)
    .await
}

/// Upserts the failure reason, so a retried run replaces the stale one.
pub async fn record_unit_failure(
    line_item_id: i64,
    unit_index: i64,
    reason: &str,
    conn: &mut SqliteConnection,
) -> Result<(), PipelineError> {
    sqlx::query(
        r#"
            INSERT INTO provisioning_failures (line_item_id, unit_index, reason) VALUES ($1, $2, $3)
            ON CONFLICT (line_item_id, unit_index)
            DO UPDATE SET reason = excluded.reason, created_at = CURRENT_TIMESTAMP;
        "#,
    )
    .bind(line_item_id)
    .bind(unit_index)
    .bind(reason)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn clear_unit_failure(
    line_item_id: i64,
    unit_index: i64,
    conn: &mut SqliteConnection,
) -> Result<(), PipelineError> {
    sqlx::query("DELETE FROM provisioning_failures WHERE line_item_id = $1 AND unit_index = $2")
        .bind(line_item_id)
        .bind(unit_index)
        .execute(conn)
        .await?;
    Ok(())
}
