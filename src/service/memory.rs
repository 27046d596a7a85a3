use std::collections::{BTreeMap, HashSet};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, trace};

use super::{LedgerService, ServiceError};
use crate::events::{EventCategory, EventRecorder, INITIALIZE_IDENTIFIER};
use crate::ledger::{Account, AccountId, Amount, JournalEntry, Ledger, LedgerId};

/// Knobs for the bundled service, so a run can mimic a slow or flaky backend.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SimulationOptions {
    /// Added to every create call before it returns.
    pub write_latency: Duration,
    /// Time between accepting a ledger/account and publishing its notification.
    pub event_delay: Duration,
    /// Probability that a journal entry is rejected, in `0.0..=1.0`.
    pub failure_rate: f64,
    pub seed: Option<u64>,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            write_latency: Duration::ZERO,
            event_delay: Duration::from_millis(1),
            failure_rate: 0.0,
            seed: None,
        }
    }
}

struct AccountRecord {
    ledger: LedgerId,
    balance: i64,
}

#[derive(Default)]
struct LedgerState {
    ledgers: BTreeMap<LedgerId, Ledger>,
    accounts: BTreeMap<AccountId, AccountRecord>,
    transactions: HashSet<String>,
}

impl LedgerState {
    fn account_mut(&mut self, account: &str) -> Result<&mut AccountRecord, ServiceError> {
        self.accounts
            .get_mut(account)
            .ok_or_else(|| ServiceError::NotFound {
                kind: "account",
                identifier: account.to_string(),
            })
    }

    fn apply(&mut self, entry: &JournalEntry) -> Result<(), ServiceError> {
        if !entry.is_balanced() {
            return Err(ServiceError::Unbalanced {
                transaction: entry.transaction_identifier.clone(),
            });
        }
        if self.transactions.contains(&entry.transaction_identifier) {
            return Err(ServiceError::AlreadyExists {
                kind: "journal entry",
                identifier: entry.transaction_identifier.clone(),
            });
        }
        // Net movement per account, so a party on both sides is checked once.
        let mut deltas: BTreeMap<&str, i128> = BTreeMap::new();
        for debtor in &entry.debtors {
            *deltas.entry(debtor.account_number.as_str()).or_default() += i128::from(debtor.amount);
        }
        for creditor in &entry.creditors {
            *deltas.entry(creditor.account_number.as_str()).or_default() -= i128::from(creditor.amount);
        }

        let mut updates = Vec::with_capacity(deltas.len());
        for (account, delta) in deltas {
            let record = self.account_mut(account)?;
            let balance = i64::try_from(i128::from(record.balance) + delta).map_err(|_| {
                ServiceError::Rejected(format!("balance overflow on account {account}"))
            })?;
            updates.push((account, balance));
        }
        for (account, balance) in updates {
            self.account_mut(account)?.balance = balance;
        }
        self.transactions.insert(entry.transaction_identifier.clone());
        Ok(())
    }
}

fn signed(amount: Amount) -> Result<i64, ServiceError> {
    i64::try_from(amount)
        .map_err(|_| ServiceError::Rejected(format!("amount {amount} exceeds the balance range")))
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub ledgers: usize,
    pub accounts: usize,
    pub journal_entries: usize,
    /// Sum over all account balances; zero while every entry was balanced.
    pub net_balance: i128,
    pub balance_root: String,
}

struct Dispatch {
    due: Instant,
    category: EventCategory,
    identifier: String,
}

/// Process-local ledger service. Notifications are published from a
/// dispatcher thread, `event_delay` after the create call was accepted.
pub struct InMemoryLedgerService {
    state: RwLock<LedgerState>,
    options: SimulationOptions,
    rng: Mutex<StdRng>,
    outbox: Mutex<Option<mpsc::Sender<Dispatch>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl InMemoryLedgerService {
    pub fn start(
        recorder: Arc<EventRecorder>,
        mut options: SimulationOptions,
    ) -> std::io::Result<Self> {
        options.failure_rate = options.failure_rate.clamp(0.0, 1.0);
        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (tx, rx) = mpsc::channel::<Dispatch>();
        let dispatcher = thread::Builder::new()
            .name("ledger-events".into())
            .spawn(move || {
                for dispatch in rx {
                    let now = Instant::now();
                    if dispatch.due > now {
                        thread::sleep(dispatch.due - now);
                    }
                    trace!(category = %dispatch.category, identifier = %dispatch.identifier, "publish");
                    recorder.record(dispatch.category, dispatch.identifier);
                }
            })?;
        let service = Self {
            state: RwLock::new(LedgerState::default()),
            options,
            rng: Mutex::new(rng),
            outbox: Mutex::new(Some(tx)),
            dispatcher: Mutex::new(Some(dispatcher)),
        };
        service.publish(EventCategory::Initialize, INITIALIZE_IDENTIFIER.to_string());
        Ok(service)
    }

    fn publish(&self, category: EventCategory, identifier: String) {
        let dispatch = Dispatch {
            due: Instant::now() + self.options.event_delay,
            category,
            identifier,
        };
        if let Some(tx) = self.outbox.lock().as_ref() {
            if tx.send(dispatch).is_err() {
                debug!(%category, "event dispatcher gone, notification dropped");
            }
        }
    }

    fn simulate_latency(&self) {
        if !self.options.write_latency.is_zero() {
            thread::sleep(self.options.write_latency);
        }
    }

    /// Stops accepting notifications and waits for queued ones to be published.
    pub fn shutdown(&self) {
        self.outbox.lock().take();
        if let Some(handle) = self.dispatcher.lock().take() {
            if handle.join().is_err() {
                debug!("event dispatcher panicked");
            }
        }
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        let state = self.state.read();
        LedgerSnapshot {
            ledgers: state.ledgers.len(),
            accounts: state.accounts.len(),
            journal_entries: state.transactions.len(),
            net_balance: net_balance(&state.accounts),
            balance_root: hex::encode(balance_root(&state.accounts)),
        }
    }
}

impl Drop for InMemoryLedgerService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl LedgerService for InMemoryLedgerService {
    fn create_ledger(&self, ledger: &Ledger) -> Result<(), ServiceError> {
        self.simulate_latency();
        {
            let mut state = self.state.write();
            if state.ledgers.contains_key(&ledger.identifier) {
                return Err(ServiceError::AlreadyExists {
                    kind: "ledger",
                    identifier: ledger.identifier.clone(),
                });
            }
            state
                .ledgers
                .insert(ledger.identifier.clone(), ledger.clone());
        }
        self.publish(EventCategory::PostLedger, ledger.identifier.clone());
        Ok(())
    }

    fn create_account(&self, account: &Account) -> Result<(), ServiceError> {
        self.simulate_latency();
        {
            let mut state = self.state.write();
            if !state.ledgers.contains_key(&account.ledger) {
                return Err(ServiceError::NotFound {
                    kind: "ledger",
                    identifier: account.ledger.clone(),
                });
            }
            if state.accounts.contains_key(&account.identifier) {
                return Err(ServiceError::AlreadyExists {
                    kind: "account",
                    identifier: account.identifier.clone(),
                });
            }
            let balance = signed(account.balance)?;
            state.accounts.insert(
                account.identifier.clone(),
                AccountRecord {
                    ledger: account.ledger.clone(),
                    balance,
                },
            );
        }
        self.publish(EventCategory::PostAccount, account.identifier.clone());
        Ok(())
    }

    fn create_journal_entry(&self, entry: &JournalEntry) -> Result<(), ServiceError> {
        self.simulate_latency();
        if self.options.failure_rate > 0.0 && self.rng.lock().gen_bool(self.options.failure_rate)
        {
            return Err(ServiceError::Rejected(format!(
                "injected failure for {}",
                entry.transaction_identifier
            )));
        }
        self.state.write().apply(entry)
    }
}

fn net_balance(accounts: &BTreeMap<AccountId, AccountRecord>) -> i128 {
    accounts.values().map(|a| i128::from(a.balance)).sum()
}

/// Merkle root over `(ledger, account, balance)` leaves in account order.
/// Independent of the order in which entries were applied.
fn balance_root(accounts: &BTreeMap<AccountId, AccountRecord>) -> [u8; 32] {
    let mut level: Vec<[u8; 32]> = accounts
        .iter()
        .map(|(identifier, record)| -> [u8; 32] {
            Sha256::new()
                .chain_update(b"acct")
                .chain_update(record.ledger.as_bytes())
                .chain_update(identifier.as_bytes())
                .chain_update(record.balance.to_le_bytes())
                .finalize()
                .into()
        })
        .collect();
    if level.is_empty() {
        return Sha256::digest(b"ledger-stress-empty").into();
    }
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| -> [u8; 32] {
                let right = pair.last().unwrap_or(&pair[0]);
                Sha256::new()
                    .chain_update(b"node")
                    .chain_update(pair[0])
                    .chain_update(right)
                    .finalize()
                    .into()
            })
            .collect();
    }
    level[0]
}
