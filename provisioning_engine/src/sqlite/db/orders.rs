use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewLineItem, NewOrder, Order, OrderId, OrderLineItem, OrderStatus},
    traits::PipelineError,
};

/// Inserts a new order. Not atomic on its own; embed in a transaction together with its line items and pass
/// `&mut *tx` as the connection argument.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, PipelineError> {
    let order = sqlx::query_as(
        r#"
            INSERT INTO orders (order_id, customer_id, total_price, currency)
            VALUES ($1, $2, $3, $4)
            RETURNING *;
        "#,
    )
    .bind(order.order_id)
    .bind(order.customer_id)
    .bind(order.total_price.value())
    .bind(order.currency)
    .fetch_one(conn)
    .await?;
    Ok(order)
}

pub async fn insert_line_item(
    order_pk: i64,
    item: NewLineItem,
    conn: &mut SqliteConnection,
) -> Result<OrderLineItem, PipelineError> {
    let item = sqlx::query_as(
        "INSERT INTO order_items (order_id, plan_id, quantity) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(order_pk)
    .bind(item.plan_id)
    .bind(item.quantity)
    .fetch_one(conn)
    .await?;
    Ok(item)
}

pub async fn fetch_order_by_order_id(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    Ok(order)
}

/// The Pending→Paid transition as a single conditional update. Exactly one caller gets `Some` back, no matter
/// how many confirmations the gateway delivers.
pub async fn mark_order_paid(
    order_id: &OrderId,
    external_ref: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, PipelineError> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders
            SET payment_status = 'Paid', external_ref = $2, updated_at = CURRENT_TIMESTAMP
            WHERE order_id = $1 AND payment_status = 'Pending'
            RETURNING *;
        "#,
    )
    .bind(order_id.as_str())
    .bind(external_ref)
    .fetch_optional(conn)
    .await?;
    if order.is_some() {
        debug!("📝️ Order [{order_id}] transitioned to Paid (ref {external_ref})");
    }
    Ok(order)
}

pub async fn update_order_status(
    order_id: &OrderId,
    status: OrderStatus,
    conn: &mut SqliteConnection,
) -> Result<Order, PipelineError> {
    let order = sqlx::query_as(
        "UPDATE orders SET status = $2, updated_at = CURRENT_TIMESTAMP WHERE order_id = $1 RETURNING *",
    )
    .bind(order_id.as_str())
    .bind(status)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| PipelineError::OrderNotFound(order_id.clone()))?;
    debug!("📝️ Order [{order_id}] status set to {status}");
    Ok(order)
}

pub async fn fetch_line_items(order_pk: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderLineItem>, sqlx::Error> {
    let items = sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id ASC")
        .bind(order_pk)
        .fetch_all(conn)
        .await?;
    Ok(items)
}
