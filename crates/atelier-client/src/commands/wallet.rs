//! Wallet balance, deposits, withdrawals and gem purchases.
//!
//! All amounts are integer cents.

use serde::Serialize;
use tracing::{debug, info};

use atelier_shared::constants::DEFAULT_TRANSACTION_LIMIT;
use atelier_shared::format::format_cents;
use atelier_shared::types::TransactionKind;
use atelier_shared::ValidationError;
use atelier_store::{Wallet, WalletChange, WalletTransaction};

use crate::error::Result;
use crate::state::{lock, SharedState};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WalletView {
    pub balance: i64,
    pub gems: i64,
    /// Newest first.
    pub transactions: Vec<WalletTransaction>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WalletOperationResult {
    pub balance: i64,
    pub gems: i64,
}

impl From<Wallet> for WalletOperationResult {
    fn from(w: Wallet) -> Self {
        Self {
            balance: w.balance_cents,
            gems: w.gems,
        }
    }
}

pub fn fetch_wallet(state: &SharedState) -> Result<WalletView> {
    let guard = lock(state)?;
    let user = guard.session.require_user()?;

    let wallet = guard.database.get_wallet(user)?;
    let transactions = guard
        .database
        .list_transactions(user, DEFAULT_TRANSACTION_LIMIT)?;

    debug!(user_id = %user, transactions = transactions.len(), "Fetched wallet");
    Ok(WalletView {
        balance: wallet.balance_cents,
        gems: wallet.gems,
        transactions,
    })
}

pub fn add_funds(state: &SharedState, amount_cents: i64) -> Result<WalletOperationResult> {
    let amount = require_positive(amount_cents)?;
    apply(
        state,
        TransactionKind::Deposit,
        amount,
        0,
        format!("Deposit of {}", format_cents(amount)),
    )
}

/// Fails with "Insufficient funds" when `amount_cents` exceeds the balance.
pub fn withdraw_funds(state: &SharedState, amount_cents: i64) -> Result<WalletOperationResult> {
    let amount = require_positive(amount_cents)?;
    apply(
        state,
        TransactionKind::Withdrawal,
        -amount,
        0,
        format!("Withdrawal of {}", format_cents(amount)),
    )
}

/// Buy `gem_amount` gems at `price_per_gem_cents` each.
pub fn purchase_gems(
    state: &SharedState,
    gem_amount: i64,
    price_per_gem_cents: i64,
) -> Result<WalletOperationResult> {
    let gems = require_positive(gem_amount)?;
    let price = require_positive(price_per_gem_cents)?;
    let cost = gems.checked_mul(price).ok_or(ValidationError::Overflow)?;

    apply(
        state,
        TransactionKind::GemPurchase,
        -cost,
        gems,
        format!("Purchased {gems} gems"),
    )
}

fn apply(
    state: &SharedState,
    kind: TransactionKind,
    amount_cents: i64,
    gems_delta: i64,
    description: String,
) -> Result<WalletOperationResult> {
    let guard = lock(state)?;
    let user = guard.session.require_user()?;

    let (wallet, entry) = guard.database.apply_wallet_change(&WalletChange {
        user_id: user,
        kind,
        amount_cents,
        gems_delta,
        description,
    })?;

    info!(user_id = %user, transaction_id = %entry.id, kind = %kind, amount_cents, "Wallet updated");
    Ok(wallet.into())
}

fn require_positive(value: i64) -> std::result::Result<i64, ValidationError> {
    if value <= 0 {
        return Err(ValidationError::NonPositiveAmount);
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::state::tests::signed_in_state;
    use atelier_store::StoreError;

    #[tokio::test]
    async fn new_wallet_is_empty() {
        let (state, _dir, _) = signed_in_state().await;
        let view = fetch_wallet(&state).unwrap();
        assert_eq!((view.balance, view.gems), (0, 0));
        assert!(view.transactions.is_empty());
    }

    #[tokio::test]
    async fn overdraw_fails_and_leaves_balance() {
        let (state, _dir, _) = signed_in_state().await;
        add_funds(&state, 1_000).unwrap();

        let err = withdraw_funds(&state, 1_001).unwrap_err();
        assert!(matches!(
            err,
            ClientError::Store(StoreError::InsufficientFunds { .. })
        ));
        assert_eq!(err.user_message(), "Insufficient funds");

        let view = fetch_wallet(&state).unwrap();
        assert_eq!(view.balance, 1_000);
        assert_eq!(view.transactions.len(), 1);

        assert_eq!(withdraw_funds(&state, 1_000).unwrap().balance, 0);
    }

    #[tokio::test]
    async fn gem_purchase_debits_balance() {
        let (state, _dir, _) = signed_in_state().await;
        add_funds(&state, 5_000).unwrap();

        let result = purchase_gems(&state, 20, 100).unwrap();
        assert_eq!(result, WalletOperationResult { balance: 3_000, gems: 20 });

        let view = fetch_wallet(&state).unwrap();
        let latest = &view.transactions[0];
        assert_eq!(latest.kind, TransactionKind::GemPurchase);
        assert_eq!(latest.amount_cents, -2_000);
        assert_eq!(latest.gems_delta, 20);
        assert_eq!(view.transactions[1].kind, TransactionKind::Deposit);
        assert_eq!(view.transactions[1].amount_cents, 5_000);
    }

    #[tokio::test]
    async fn amounts_must_be_positive() {
        let (state, _dir, _) = signed_in_state().await;
        for result in [
            add_funds(&state, 0),
            withdraw_funds(&state, -5),
            purchase_gems(&state, 0, 100),
            purchase_gems(&state, 5, 0),
        ] {
            assert!(matches!(
                result,
                Err(ClientError::Validation(ValidationError::NonPositiveAmount))
            ));
        }
        assert!(matches!(
            purchase_gems(&state, i64::MAX, 2),
            Err(ClientError::Validation(ValidationError::Overflow))
        ));
        assert!(fetch_wallet(&state).unwrap().transactions.is_empty());
    }
}
