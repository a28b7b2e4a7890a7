use thiserror::Error;

use crate::db_types::{NewWalletTransaction, OrderId, WalletTransaction};
use ppg_common::Money;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Wallet database error: {0}")]
    DatabaseError(String),
    #[error("Insufficient balance for {0}")]
    InsufficientBalance(String),
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for WalletError {
    fn from(e: sqlx::Error) -> Self {
        WalletError::DatabaseError(e.to_string())
    }
}

/// Append-only wallet ledger. Balances are derived state, updated in the same transaction as the ledger insert.
#[allow(async_fn_in_trait)]
pub trait WalletLedger: Clone + Send + Sync + 'static {
    async fn balance(&self, customer_id: &str) -> Result<Money, WalletError>;

    /// Appends a ledger entry and adjusts the balance atomically.
    async fn post_transaction(&self, tx: NewWalletTransaction) -> Result<WalletTransaction, WalletError>;

    /// Appends a referral commission entry for the order, unless one already exists. At most one referral
    /// credit can ever exist per order, regardless of how many times this is called. Returns the new entry,
    /// or `None` if the credit was already posted.
    async fn post_referral_credit(
        &self,
        tx: NewWalletTransaction,
        order_id: &OrderId,
    ) -> Result<Option<WalletTransaction>, WalletError>;

    async fn history(&self, customer_id: &str) -> Result<Vec<WalletTransaction>, WalletError>;
}
