use ppg_common::Protocol;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Inbound, Plan, ServerRecord},
    traits::PipelineError,
};

pub async fn fetch_plan(plan_id: i64, conn: &mut SqliteConnection) -> Result<Plan, PipelineError> {
    sqlx::query_as("SELECT * FROM plans WHERE id = $1")
        .bind(plan_id)
        .fetch_optional(conn)
        .await?
        .ok_or(PipelineError::PlanNotFound(plan_id))
}

pub async fn fetch_server(server_id: i64, conn: &mut SqliteConnection) -> Result<ServerRecord, PipelineError> {
    sqlx::query_as("SELECT * FROM servers WHERE id = $1 AND active")
        .bind(server_id)
        .fetch_optional(conn)
        .await?
        .ok_or(PipelineError::ServerNotFound(server_id))
}

/// The least-loaded active inbound for the protocol on the server, among those with spare capacity.
pub async fn select_inbound(
    server_id: i64,
    protocol: Protocol,
    conn: &mut SqliteConnection,
) -> Result<Inbound, PipelineError> {
    sqlx::query_as(
        r#"
            SELECT * FROM inbounds
            WHERE server_id = $1 AND protocol = $2 AND active
              AND (max_clients = 0 OR client_count < max_clients)
            ORDER BY client_count ASC, id ASC
            LIMIT 1;
        "#,
    )
    .bind(server_id)
    .bind(protocol)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| PipelineError::NoInboundAvailable(protocol.to_string(), server_id))
}

pub async fn increment_inbound_clients(inbound_id: i64, conn: &mut SqliteConnection) -> Result<(), PipelineError> {
    sqlx::query("UPDATE inbounds SET client_count = client_count + 1 WHERE id = $1")
        .bind(inbound_id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn fetch_referrer(customer_id: &str, conn: &mut SqliteConnection) -> Result<Option<String>, PipelineError> {
    let referrer: Option<(Option<String>,)> =
        sqlx::query_as("SELECT referrer_id FROM customers WHERE customer_id = $1")
            .bind(customer_id)
            .fetch_optional(conn)
            .await?;
    Ok(referrer.and_then(|(r,)| r))
}

/// Qualified referrals only: referred customers who have paid at least one order.
pub async fn count_referrals(customer_id: &str, conn: &mut SqliteConnection) -> Result<i64, PipelineError> {
    let (count,): (i64,) = sqlx::query_as(
        r#"
            SELECT COUNT(DISTINCT c.customer_id) FROM customers c
            JOIN orders o ON o.customer_id = c.customer_id AND o.payment_status = 'Paid'
            WHERE c.referrer_id = $1;
        "#,
    )
    .bind(customer_id)
    .fetch_one(conn)
    .await?;
    Ok(count)
}

pub async fn upsert_customer(
    customer_id: &str,
    referrer_id: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<(), PipelineError> {
    sqlx::query(
        r#"
            INSERT INTO customers (customer_id, referrer_id) VALUES ($1, $2)
            ON CONFLICT (customer_id) DO NOTHING;
        "#,
    )
    .bind(customer_id)
    .bind(referrer_id)
    .execute(conn)
    .await?;
    Ok(())
}
