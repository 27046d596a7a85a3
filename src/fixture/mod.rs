//! Serial creation of the ledgers and accounts the load phase draws from.
//!
//! Each create is confirmed on the event channel before the next one is
//! issued, so every account in the resulting pool is safe to reference.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{FixtureEntity, FixtureFailure, StressError};
use crate::events::{EventCategory, EventWaitGate};
use crate::ledger::{random_account, random_ledger, Account, LedgerId};
use crate::service::LedgerService;

/// Confirmed accounts in creation order. Read-only once built.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccountPool {
    accounts: Vec<Account>,
}

impl AccountPool {
    pub fn from_accounts(accounts: Vec<Account>) -> Self {
        Self { accounts }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    /// SHA-256 over the ordered account identifiers, hex encoded. Two runs
    /// with the same seed against a fresh service produce the same value.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for account in &self.accounts {
            hasher.update(account.ledger.as_bytes());
            hasher.update(b"/");
            hasher.update(account.identifier.as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }
}

#[derive(Clone, Debug)]
pub struct Fixture {
    pub ledgers: Vec<LedgerId>,
    pub pool: AccountPool,
    /// Sum of the per-ledger build times, notification waits included.
    pub elapsed: Duration,
}

impl Fixture {
    pub fn mean_per_account(&self) -> Duration {
        match u32::try_from(self.pool.len()) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(n) => self.elapsed / n,
        }
    }
}

/// Upper bound on what `build` reserves up front; larger pools grow as they fill.
const RESERVE_LIMIT: usize = 1 << 16;

pub struct FixtureGenerator<'a, S: LedgerService + ?Sized> {
    service: &'a S,
    gate: &'a EventWaitGate,
    event_timeout: Duration,
    rng: StdRng,
}

impl<'a, S: LedgerService + ?Sized> FixtureGenerator<'a, S> {
    pub fn new(service: &'a S, gate: &'a EventWaitGate, event_timeout: Duration) -> Self {
        Self {
            service,
            gate,
            event_timeout,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Creates `ledger_count` ledgers with `accounts_per_ledger` accounts each.
    /// The pool is only returned once every account has been confirmed.
    pub fn build(
        &mut self,
        ledger_count: usize,
        accounts_per_ledger: usize,
    ) -> Result<Fixture, StressError> {
        let total = ledger_count.checked_mul(accounts_per_ledger).ok_or_else(|| {
            StressError::InvalidConfig(format!(
                "{ledger_count} ledgers x {accounts_per_ledger} accounts overflows the pool size"
            ))
        })?;
        let mut ledgers = Vec::with_capacity(ledger_count.min(RESERVE_LIMIT));
        let mut accounts = Vec::with_capacity(total.min(RESERVE_LIMIT));
        let mut elapsed = Duration::ZERO;

        for _ in 0..ledger_count {
            let start = Instant::now();
            let ledger = random_ledger(&mut self.rng);
            let ledger_entity = || FixtureEntity::Ledger(ledger.identifier.clone());
            self.service
                .create_ledger(&ledger)
                .map_err(|e| fixture_error(ledger_entity(), e))?;
            self.gate
                .await_notification(EventCategory::PostLedger, &ledger.identifier, self.event_timeout)
                .map_err(|e| fixture_error(ledger_entity(), e))?;

            for _ in 0..accounts_per_ledger {
                let account = random_account(&mut self.rng, &ledger.identifier);
                let account_entity = || FixtureEntity::Account {
                    ledger: ledger.identifier.clone(),
                    identifier: account.identifier.clone(),
                };
                self.service
                    .create_account(&account)
                    .map_err(|e| fixture_error(account_entity(), e))?;
                self.gate
                    .await_notification(
                        EventCategory::PostAccount,
                        &account.identifier,
                        self.event_timeout,
                    )
                    .map_err(|e| fixture_error(account_entity(), e))?;
                accounts.push(account);
            }

            let took = start.elapsed();
            debug!(ledger = %ledger.identifier, accounts = accounts_per_ledger, ?took, "ledger ready");
            elapsed += took;
            ledgers.push(ledger.identifier);
        }

        let fixture = Fixture {
            ledgers,
            pool: AccountPool::from_accounts(accounts),
            elapsed,
        };
        info!(
            ledgers = fixture.ledgers.len(),
            accounts = fixture.pool.len(),
            elapsed_s = fixture.elapsed.as_secs_f64(),
            mean_per_account_ms = fixture.mean_per_account().as_secs_f64() * 1_000.0,
            fingerprint = %fixture.pool.fingerprint(),
            "fixture created"
        );
        Ok(fixture)
    }
}

fn fixture_error(entity: FixtureEntity, cause: impl Into<FixtureFailure>) -> StressError {
    StressError::FixtureCreationFailed {
        entity,
        cause: cause.into(),
    }
}
