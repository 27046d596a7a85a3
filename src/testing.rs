//! Scripted service double shared by the unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::events::{EventCategory, EventRecorder, EventWaitGate, INITIALIZE_IDENTIFIER};
use crate::ledger::{Account, JournalEntry, Ledger};
use crate::service::{LedgerService, ServiceError};

/// Announces creates synchronously, unless told to stay silent, and records
/// every journal entry it receives as `(debtor, creditor)`.
pub struct ScriptedService {
    recorder: Arc<EventRecorder>,
    ledgers: AtomicUsize,
    accounts: AtomicUsize,
    entry_calls: AtomicUsize,
    silent_account: Option<usize>,
    reject_ledgers: bool,
    failing_entries: HashSet<usize>,
    failure_delay: Duration,
    entry_delay: Duration,
    panic_at_entry: Option<usize>,
    submitted: Mutex<Vec<(String, String)>>,
}

impl ScriptedService {
    pub fn new() -> Self {
        let recorder = Arc::new(EventRecorder::new());
        recorder.record(EventCategory::Initialize, INITIALIZE_IDENTIFIER);
        Self {
            recorder,
            ledgers: AtomicUsize::new(0),
            accounts: AtomicUsize::new(0),
            entry_calls: AtomicUsize::new(0),
            silent_account: None,
            reject_ledgers: false,
            failing_entries: HashSet::new(),
            failure_delay: Duration::ZERO,
            entry_delay: Duration::ZERO,
            panic_at_entry: None,
            submitted: Mutex::new(Vec::new()),
        }
    }

    /// Same service, but the initialize notification never arrives.
    pub fn uninitialized() -> Self {
        let service = Self::new();
        let recorder = Arc::new(EventRecorder::new());
        Self { recorder, ..service }
    }

    pub fn silent_account(mut self, index: usize) -> Self {
        self.silent_account = Some(index);
        self
    }

    pub fn reject_ledgers(mut self) -> Self {
        self.reject_ledgers = true;
        self
    }

    /// Journal-entry calls (0-based, across all workers) that fail after `delay`.
    pub fn failing_entries(mut self, calls: impl IntoIterator<Item = usize>, delay: Duration) -> Self {
        self.failing_entries = calls.into_iter().collect();
        self.failure_delay = delay;
        self
    }

    /// Every successful journal-entry call takes at least `delay`.
    pub fn entry_delay(mut self, delay: Duration) -> Self {
        self.entry_delay = delay;
        self
    }

    pub fn panic_at_entry(mut self, call: usize) -> Self {
        self.panic_at_entry = Some(call);
        self
    }

    pub fn gate(&self) -> EventWaitGate {
        EventWaitGate::new(self.recorder.clone())
    }

    pub fn ledgers_created(&self) -> usize {
        self.ledgers.load(Ordering::SeqCst)
    }

    pub fn accounts_created(&self) -> usize {
        self.accounts.load(Ordering::SeqCst)
    }

    pub fn entry_calls(&self) -> usize {
        self.entry_calls.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> Vec<(String, String)> {
        self.submitted.lock().clone()
    }
}

impl LedgerService for ScriptedService {
    fn create_ledger(&self, ledger: &Ledger) -> Result<(), ServiceError> {
        if self.reject_ledgers {
            return Err(ServiceError::Unavailable);
        }
        self.ledgers.fetch_add(1, Ordering::SeqCst);
        self.recorder
            .record(EventCategory::PostLedger, ledger.identifier.clone());
        Ok(())
    }

    fn create_account(&self, account: &Account) -> Result<(), ServiceError> {
        let index = self.accounts.fetch_add(1, Ordering::SeqCst);
        if self.silent_account != Some(index) {
            self.recorder
                .record(EventCategory::PostAccount, account.identifier.clone());
        }
        Ok(())
    }

    fn create_journal_entry(&self, entry: &JournalEntry) -> Result<(), ServiceError> {
        let call = self.entry_calls.fetch_add(1, Ordering::SeqCst);
        self.submitted.lock().push((
            entry.debtors[0].account_number.clone(),
            entry.creditors[0].account_number.clone(),
        ));
        if self.panic_at_entry == Some(call) {
            panic!("scripted panic at journal entry {call}");
        }
        if self.failing_entries.contains(&call) {
            thread::sleep(self.failure_delay);
            return Err(ServiceError::Rejected(format!("scripted failure {call}")));
        }
        if !self.entry_delay.is_zero() {
            thread::sleep(self.entry_delay);
        }
        Ok(())
    }
}
