//! All-or-nothing state store.
//!
//! A command runs against a staged copy of the committed state. The copy
//! replaces the committed state only when the command returns `Ok`; on `Err`
//! it is dropped together with the events it buffered.
//!
//! State components are held in [`Shared`] handles, so staging a copy only
//! bumps reference counts. A component is deep-cloned the first time a
//! command mutates it, and untouched components stay shared with the
//! committed state.

use std::ops::Deref;
use std::sync::Arc;

use crate::events::SuretyEvent;
use crate::types::Result;

/// Copy-on-write handle to one state component.
#[derive(Debug, Default)]
pub struct Shared<T>(Arc<T>);

impl<T> Shared<T> {
    pub fn new(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Whether both handles point at the same allocation.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl<T: Clone> Shared<T> {
    /// Mutable access, cloning the component if it is still shared.
    pub fn make_mut(&mut self) -> &mut T {
        Arc::make_mut(&mut self.0)
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> Deref for Shared<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

/// Staged state plus the events produced while building it.
#[derive(Debug)]
pub struct Transaction<S> {
    /// Working copy
    pub state: S,
    events: Vec<SuretyEvent>,
}

impl<S> Transaction<S> {
    /// Buffer an event for publication on commit.
    pub fn emit(&mut self, event: SuretyEvent) {
        self.events.push(event);
    }
}

/// Single-writer store.
#[derive(Debug, Clone)]
pub struct Store<S> {
    committed: S,
}

impl<S: Clone> Store<S> {
    /// Create a store around its initial state.
    pub fn new(initial: S) -> Self {
        Self { committed: initial }
    }

    /// Committed state.
    pub fn state(&self) -> &S {
        &self.committed
    }

    /// Run `f` against a staged copy and commit if it succeeds.
    pub fn transact<T>(
        &mut self,
        f: impl FnOnce(&mut Transaction<S>) -> Result<T>,
    ) -> Result<(T, Vec<SuretyEvent>)> {
        let mut tx = Transaction {
            state: self.committed.clone(),
            events: Vec::new(),
        };
        let value = f(&mut tx)?;
        self.committed = tx.state;
        Ok((value, tx.events))
    }
}
