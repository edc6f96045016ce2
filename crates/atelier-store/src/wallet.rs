//! Wallet balance and append-only transaction ledger.
//!
//! A balance change and its ledger row are written in a single SQLite
//! transaction; either both land or neither does.

use chrono::Utc;
use rusqlite::params;

use atelier_shared::types::{TransactionId, UserId};

use crate::convert::{parsed, timestamp, ts};
use crate::database::Database;
use crate::error::{not_found, Result, StoreError};
use crate::models::{Wallet, WalletChange, WalletTransaction};
use crate::realtime::{ChangeOp, TABLE_WALLETS, TABLE_WALLET_TRANSACTIONS};

impl Database {
    /// Fetch the user's wallet, creating an empty one on first access.
    pub fn get_wallet(&self, user: UserId) -> Result<Wallet> {
        let created = self.ensure_wallet(user)?;
        let wallet = self.read_wallet(user)?;
        if created {
            self.publish(TABLE_WALLETS, ChangeOp::Insert, &wallet);
        }
        Ok(wallet)
    }

    /// Most recent transactions first.
    pub fn list_transactions(&self, user: UserId, limit: u32) -> Result<Vec<WalletTransaction>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, user_id, kind, amount_cents, gems_delta, description, created_at
             FROM wallet_transactions
             WHERE user_id = ?1
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![user.to_string(), limit], row_to_transaction)?;

        let mut transactions = Vec::new();
        for row in rows {
            transactions.push(row?);
        }
        Ok(transactions)
    }

    /// Apply a balance/gem adjustment and append its ledger row atomically.
    ///
    /// Fails with [`StoreError::InsufficientFunds`] (leaving everything
    /// untouched) when the balance or gem count would drop below zero.
    pub fn apply_wallet_change(&self, change: &WalletChange) -> Result<(Wallet, WalletTransaction)> {
        let tx = self.conn().unchecked_transaction()?;

        let created = self.ensure_wallet(change.user_id)?;
        let current = self.read_wallet(change.user_id)?;

        let balance = current
            .balance_cents
            .checked_add(change.amount_cents)
            .ok_or(StoreError::Overflow)?;
        let gems = current
            .gems
            .checked_add(change.gems_delta)
            .ok_or(StoreError::Overflow)?;

        if balance < 0 || gems < 0 {
            return Err(StoreError::InsufficientFunds {
                balance: current.balance_cents,
                requested: change.amount_cents.saturating_neg(),
            });
        }

        let now = Utc::now();
        tx.execute(
            "UPDATE wallets SET balance_cents = ?2, gems = ?3, updated_at = ?4 WHERE user_id = ?1",
            params![change.user_id.to_string(), balance, gems, ts(&now)],
        )?;

        let entry = WalletTransaction {
            id: TransactionId::new(),
            user_id: change.user_id,
            kind: change.kind,
            amount_cents: change.amount_cents,
            gems_delta: change.gems_delta,
            description: change.description.clone(),
            created_at: now,
        };
        tx.execute(
            "INSERT INTO wallet_transactions
                 (id, user_id, kind, amount_cents, gems_delta, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.id.to_string(),
                entry.user_id.to_string(),
                entry.kind.as_str(),
                entry.amount_cents,
                entry.gems_delta,
                entry.description,
                ts(&entry.created_at),
            ],
        )?;

        tx.commit()?;

        let wallet = Wallet {
            user_id: change.user_id,
            balance_cents: balance,
            gems,
            updated_at: now,
        };
        let op = if created { ChangeOp::Insert } else { ChangeOp::Update };
        self.publish(TABLE_WALLETS, op, &wallet);
        self.publish(TABLE_WALLET_TRANSACTIONS, ChangeOp::Insert, &entry);

        Ok((wallet, entry))
    }

    /// Returns `true` if a new wallet row was inserted.
    fn ensure_wallet(&self, user: UserId) -> Result<bool> {
        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO wallets (user_id, balance_cents, gems, updated_at)
             VALUES (?1, 0, 0, ?2)",
            params![user.to_string(), ts(&Utc::now())],
        )?;
        Ok(inserted > 0)
    }

    fn read_wallet(&self, user: UserId) -> Result<Wallet> {
        self.conn()
            .query_row(
                "SELECT user_id, balance_cents, gems, updated_at FROM wallets WHERE user_id = ?1",
                params![user.to_string()],
                |row| {
                    Ok(Wallet {
                        user_id: parsed(row, 0)?,
                        balance_cents: row.get(1)?,
                        gems: row.get(2)?,
                        updated_at: timestamp(row, 3)?,
                    })
                },
            )
            .map_err(not_found)
    }
}

fn row_to_transaction(row: &rusqlite::Row<'_>) -> rusqlite::Result<WalletTransaction> {
    Ok(WalletTransaction {
        id: parsed(row, 0)?,
        user_id: parsed(row, 1)?,
        kind: parsed(row, 2)?,
        amount_cents: row.get(3)?,
        gems_delta: row.get(4)?,
        description: row.get(5)?,
        created_at: timestamp(row, 6)?,
    })
}
