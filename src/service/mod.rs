//! The ledger service as seen by the harness.
//!
//! Every call is a blocking request/response. A returned `Ok` only means the
//! request was accepted; see [`crate::events`] for when the entity is visible.

use std::sync::Arc;

use crate::ledger::{Account, JournalEntry, Ledger};

pub mod memory;

pub use memory::{InMemoryLedgerService, LedgerSnapshot, SimulationOptions};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("{kind} {identifier} already exists")]
    AlreadyExists {
        kind: &'static str,
        identifier: String,
    },
    #[error("unknown {kind} {identifier}")]
    NotFound {
        kind: &'static str,
        identifier: String,
    },
    #[error("journal entry {transaction} is not balanced")]
    Unbalanced { transaction: String },
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("service unavailable")]
    Unavailable,
}

pub trait LedgerService: Send + Sync {
    fn create_ledger(&self, ledger: &Ledger) -> Result<(), ServiceError>;
    fn create_account(&self, account: &Account) -> Result<(), ServiceError>;
    fn create_journal_entry(&self, entry: &JournalEntry) -> Result<(), ServiceError>;
}

impl<S: LedgerService + ?Sized> LedgerService for Arc<S> {
    fn create_ledger(&self, ledger: &Ledger) -> Result<(), ServiceError> {
        (**self).create_ledger(ledger)
    }

    fn create_account(&self, account: &Account) -> Result<(), ServiceError> {
        (**self).create_account(account)
    }

    fn create_journal_entry(&self, entry: &JournalEntry) -> Result<(), ServiceError> {
        (**self).create_journal_entry(entry)
    }
}
