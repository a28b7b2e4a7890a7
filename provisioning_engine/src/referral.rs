//! Referral commission ledger.
//!
//! When an order is paid and the buyer was referred by another customer, the referrer's wallet is credited
//! with a tiered percentage of the paid amount. The credit is keyed on the order, so replayed webhooks and
//! retried jobs can never double-pay it.

use log::*;
use ppg_common::Money;

use crate::{
    db_types::{NewWalletTransaction, Order, TransactionType},
    traits::{PipelineDatabase, PipelineError, WalletError, WalletLedger},
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReferralError {
    #[error("Referral lookup failed: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("Referral credit failed: {0}")]
    Wallet(#[from] WalletError),
}

/// The commission tier, in basis points, for a referrer with `referral_count` referred customers.
///
/// The count is evaluated live at credit time, so a referrer crossing a tier boundary earns the higher rate
/// on every subsequent order, including orders from customers referred before the boundary was crossed.
pub fn commission_rate_bp(referral_count: i64) -> i64 {
    match referral_count {
        n if n >= 15 => 300,
        n if n >= 5 => 200,
        _ => 100,
    }
}

/// The commission on `amount` at the given tier. Rounds half-up to the nearest cent.
pub fn commission_for(amount: Money, referral_count: i64) -> Money {
    amount.apply_basis_points(commission_rate_bp(referral_count))
}

#[derive(Clone)]
pub struct ReferralApi<B> {
    db: B,
}

impl<B> ReferralApi<B>
where B: PipelineDatabase + WalletLedger
{
    pub fn new(db: B) -> Self {
        Self { db }
    }

    /// Credits the referrer's wallet for a paid order, if the buyer has a referrer and no credit exists for
    /// this order yet. Returns the amount credited, or `None` when there is no referrer or the credit was
    /// already posted.
    pub async fn credit_for_order(&self, order: &Order) -> Result<Option<Money>, ReferralError> {
        let Some(referrer) = self.db.fetch_referrer(&order.customer_id).await? else {
            debug!("🤝️ Customer {} has no referrer. No commission due for order {}", order.customer_id, order.order_id);
            return Ok(None);
        };
        if referrer == order.customer_id {
            warn!("🤝️ Customer {} is their own referrer. No commission for order {}", referrer, order.order_id);
            return Ok(None);
        }
        let referral_count = self.db.count_referrals(&referrer).await?;
        let rate = commission_rate_bp(referral_count);
        let commission = order.total_price.apply_basis_points(rate);
        if !commission.is_positive() {
            debug!("🤝️ Commission for order {} rounds to zero. Nothing to credit", order.order_id);
            return Ok(None);
        }
        let tx = NewWalletTransaction {
            customer_id: referrer.clone(),
            amount: commission,
            tx_type: TransactionType::ReferralCommission,
            order_id: Some(order.order_id.clone()),
            is_referral: true,
            memo: Some(format!("Referral commission ({} bp) for order {}", rate, order.order_id)),
        };
        match self.db.post_referral_credit(tx, &order.order_id).await? {
            Some(entry) => {
                info!(
                    "🤝️ Credited {} to referrer {} for order {} ({} referrals, {} bp)",
                    entry.amount, referrer, order.order_id, referral_count, rate
                );
                Ok(Some(entry.amount))
            },
            None => {
                debug!("🤝️ Referral credit for order {} already posted. Skipping", order.order_id);
                Ok(None)
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tier_boundaries() {
        assert_eq!(commission_rate_bp(0), 100);
        assert_eq!(commission_rate_bp(4), 100);
        assert_eq!(commission_rate_bp(5), 200);
        assert_eq!(commission_rate_bp(14), 200);
        assert_eq!(commission_rate_bp(15), 300);
        assert_eq!(commission_rate_bp(100), 300);
    }

    #[test]
    fn hundred_dollar_order_at_six_referrals_earns_two_dollars() {
        let amount = Money::from_cents(10_000);
        assert_eq!(commission_for(amount, 6), Money::from_cents(200));
    }

    #[test]
    fn commission_rounds_half_up() {
        // $0.25 at 100bp is 0.25 cents, which rounds down to 0
        assert_eq!(commission_for(Money::from_cents(25), 0), Money::from_cents(0));
        // $0.50 at 100bp is exactly half a cent, which rounds up to 1
        assert_eq!(commission_for(Money::from_cents(50), 0), Money::from_cents(1));
        // $9.99 at 300bp is 29.97 cents -> 30
        assert_eq!(commission_for(Money::from_cents(999), 15), Money::from_cents(30));
    }
}
