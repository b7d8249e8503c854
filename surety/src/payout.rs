//! Outbound value transfer.
//!
//! The ledger debits a passenger's credit balance and commits that debit
//! before it calls [`Payout::transfer`]. An implementation never receives a
//! handle to the ledger.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::types::{AccountId, Amount};

/// Failure reported by a payout backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TransferError(pub String);

/// Delivers withdrawn compensation to a passenger.
pub trait Payout: Send + Sync {
    /// Move `amount` to `to`.
    fn transfer(&self, to: &AccountId, amount: Amount) -> Result<(), TransferError>;
}

/// In-process wallet that records every delivered amount.
#[derive(Debug, Default)]
pub struct InMemoryWallet {
    balances: Mutex<HashMap<AccountId, Amount>>,
    rejected: Mutex<Vec<AccountId>>,
}

impl InMemoryWallet {
    /// Create an empty wallet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every future transfer to `account`.
    pub fn reject(&self, account: &AccountId) {
        if let Ok(mut rejected) = self.rejected.lock() {
            rejected.push(account.clone());
        }
    }

    /// Total delivered to `account`.
    pub fn balance(&self, account: &AccountId) -> Amount {
        self.balances
            .lock()
            .map(|b| b.get(account).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl Payout for InMemoryWallet {
    fn transfer(&self, to: &AccountId, amount: Amount) -> Result<(), TransferError> {
        let rejected = self
            .rejected
            .lock()
            .map_err(|_| TransferError("wallet lock poisoned".to_string()))?;
        if rejected.contains(to) {
            return Err(TransferError(format!("recipient {} refused transfer", to)));
        }
        drop(rejected);

        let mut balances = self
            .balances
            .lock()
            .map_err(|_| TransferError("wallet lock poisoned".to_string()))?;
        let entry = balances.entry(to.clone()).or_insert(0);
        *entry = entry
            .checked_add(amount)
            .ok_or_else(|| TransferError(format!("balance overflow for {}", to)))?;
        Ok(())
    }
}
