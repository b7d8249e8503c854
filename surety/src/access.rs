//! Operational gate and caller allow-list.

use std::collections::BTreeSet;
use tracing::warn;

use crate::types::{unauthorized, AccountId, Result, SuretyError};

/// Process-wide switch plus the owner's allow-list of privileged callers.
#[derive(Debug, Clone)]
pub struct AccessGate {
    owner: AccountId,
    operational: bool,
    authorized: BTreeSet<AccountId>,
}

impl AccessGate {
    /// Open gate with an empty allow-list.
    pub fn new(owner: AccountId) -> Self {
        Self {
            owner,
            operational: true,
            authorized: BTreeSet::new(),
        }
    }

    /// Ledger owner.
    pub fn owner(&self) -> &AccountId {
        &self.owner
    }

    pub fn is_operational(&self) -> bool {
        self.operational
    }

    /// Fail with `NotOperational` when the gate is closed.
    pub fn require_operational(&self) -> Result<()> {
        if self.operational {
            Ok(())
        } else {
            Err(SuretyError::NotOperational)
        }
    }

    pub fn require_owner(&self, caller: &AccountId) -> Result<()> {
        if caller == &self.owner {
            return Ok(());
        }
        warn!(caller = %caller, "Owner-only call rejected");
        Err(unauthorized(format!("{} is not the owner", caller)))
    }

    /// Open or close the gate. Returns whether the flag changed.
    pub fn set_operational(&mut self, caller: &AccountId, operational: bool) -> Result<bool> {
        self.require_owner(caller)?;
        let changed = self.operational != operational;
        self.operational = operational;
        Ok(changed)
    }

    /// Add `id` to the allow-list. Returns whether it was newly added.
    pub fn authorize(&mut self, caller: &AccountId, id: AccountId) -> Result<bool> {
        self.require_owner(caller)?;
        Ok(self.authorized.insert(id))
    }

    /// Remove `id` from the allow-list. Returns whether it was present.
    pub fn deauthorize(&mut self, caller: &AccountId, id: &AccountId) -> Result<bool> {
        self.require_owner(caller)?;
        Ok(self.authorized.remove(id))
    }

    /// The owner is always authorized.
    pub fn is_authorized(&self, id: &AccountId) -> bool {
        id == &self.owner || self.authorized.contains(id)
    }

    pub fn require_authorized(&self, caller: &AccountId) -> Result<()> {
        if self.is_authorized(caller) {
            return Ok(());
        }
        warn!(caller = %caller, "Privileged call from unauthorized caller");
        Err(unauthorized(format!("{} is not an authorized caller", caller)))
    }

    /// Allow-listed identities, excluding the owner.
    pub fn authorized_callers(&self) -> impl Iterator<Item = &AccountId> {
        self.authorized.iter()
    }
}
