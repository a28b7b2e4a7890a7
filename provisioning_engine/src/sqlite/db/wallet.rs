use log::debug;
use ppg_common::Money;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewWalletTransaction, OrderId, WalletTransaction},
    traits::WalletError,
};

pub async fn balance(customer_id: &str, conn: &mut SqliteConnection) -> Result<Money, WalletError> {
    let balance: Option<(i64,)> = sqlx::query_as("SELECT balance FROM wallets WHERE customer_id = $1")
        .bind(customer_id)
        .fetch_optional(conn)
        .await?;
    Ok(Money::from_cents(balance.map(|(b,)| b).unwrap_or_default()))
}

/// Appends the ledger entry and adjusts the derived balance. Call inside a transaction.
pub async fn post_transaction(
    tx: NewWalletTransaction,
    conn: &mut SqliteConnection,
) -> Result<WalletTransaction, WalletError> {
    let entry: WalletTransaction = sqlx::query_as(
        r#"
            INSERT INTO wallet_transactions (customer_id, amount, tx_type, order_id, is_referral, memo)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(tx.customer_id)
    .bind(tx.amount.value())
    .bind(tx.tx_type)
    .bind(tx.order_id.map(|o| o.0))
    .bind(tx.is_referral)
    .bind(tx.memo)
    .fetch_one(&mut *conn)
    .await?;
    adjust_balance(&entry.customer_id, entry.amount, conn).await?;
    debug!("📝️ Wallet entry {} posted for {} ({})", entry.id, entry.customer_id, entry.amount);
    Ok(entry)
}

/// Posts a referral commission for the order, unless one already exists. A partial unique index on
/// `(order_id) WHERE is_referral` backs the guard, so even a race between two conditional inserts cannot
/// produce two credits.
pub async fn post_referral_credit(
    tx: NewWalletTransaction,
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<WalletTransaction>, WalletError> {
    let entry: Option<WalletTransaction> = sqlx::query_as(
        r#"
            INSERT INTO wallet_transactions (customer_id, amount, tx_type, order_id, is_referral, memo)
            SELECT $1, $2, $3, $4, TRUE, $5
            WHERE NOT EXISTS (
                SELECT 1 FROM wallet_transactions WHERE order_id = $4 AND is_referral = TRUE
            )
            RETURNING *;
        "#,
    )
    .bind(tx.customer_id)
    .bind(tx.amount.value())
    .bind(tx.tx_type)
    .bind(order_id.as_str())
    .bind(tx.memo)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(entry) = &entry {
        adjust_balance(&entry.customer_id, entry.amount, conn).await?;
    }
    Ok(entry)
}

async fn adjust_balance(customer_id: &str, delta: Money, conn: &mut SqliteConnection) -> Result<(), WalletError> {
    sqlx::query(
        r#"
            INSERT INTO wallets (customer_id, balance) VALUES ($1, $2)
            ON CONFLICT (customer_id)
            DO UPDATE SET balance = balance + excluded.balance, updated_at = CURRENT_TIMESTAMP;
        "#,
    )
    .bind(customer_id)
    .bind(delta.value())
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn history(customer_id: &str, conn: &mut SqliteConnection) -> Result<Vec<WalletTransaction>, WalletError> {
    let entries =
        sqlx::query_as("SELECT * FROM wallet_transactions WHERE customer_id = $1 ORDER BY created_at ASC, id ASC")
            .bind(customer_id)
            .fetch_all(conn)
            .await?;
    Ok(entries)
}
