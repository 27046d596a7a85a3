//! The stress scenario: one fixture, then one load run per concurrency level.

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::StressError;
use crate::events::{EventCategory, EventWaitGate, INITIALIZE_IDENTIFIER};
use crate::fixture::{Fixture, FixtureGenerator};
use crate::ledger::{format_amount, Amount};
use crate::service::LedgerService;
use crate::workload::{run_load, LoadConfig, RunStatistics, RunSummary};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScenarioConfig {
    pub ledgers: usize,
    pub accounts_per_ledger: usize,
    pub entries_per_worker: usize,
    /// Run in this order; must be strictly ascending.
    pub concurrency_levels: Vec<usize>,
    pub entry_amount: Amount,
    pub event_timeout_ms: u64,
    pub seed: Option<u64>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            ledgers: 32,
            accounts_per_ledger: 512,
            entries_per_worker: 1024,
            concurrency_levels: vec![4, 8, 16, 24, 32],
            entry_amount: 5_000,
            event_timeout_ms: 30_000,
            seed: None,
        }
    }
}

impl ScenarioConfig {
    pub fn from_file(path: &Path) -> Result<Self, StressError> {
        let config_error = |source: io::Error| StressError::Config {
            path: path.to_path_buf(),
            source,
        };
        let bytes = fs::read(path).map_err(config_error)?;
        serde_json::from_slice(&bytes).map_err(|e| config_error(e.into()))
    }

    pub fn event_timeout(&self) -> Duration {
        Duration::from_millis(self.event_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), StressError> {
        if self.concurrency_levels.is_empty() {
            return Err(StressError::InvalidConfig(
                "at least one concurrency level is required".into(),
            ));
        }
        if self.concurrency_levels.contains(&0) {
            return Err(StressError::InvalidConfig(
                "concurrency levels must be at least 1".into(),
            ));
        }
        if let Some(pair) = self.concurrency_levels.windows(2).find(|w| w[0] >= w[1]) {
            return Err(StressError::InvalidConfig(format!(
                "concurrency levels must be strictly ascending ({} then {})",
                pair[0], pair[1]
            )));
        }
        if self.ledgers.checked_mul(self.accounts_per_ledger).is_none() {
            return Err(StressError::InvalidConfig(format!(
                "{} ledgers x {} accounts overflows the pool size",
                self.ledgers, self.accounts_per_ledger
            )));
        }
        if self.event_timeout_ms == 0 {
            return Err(StressError::InvalidConfig(
                "event timeout must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FixtureSummary {
    pub ledgers: usize,
    pub accounts: usize,
    pub elapsed_ms: u64,
    pub fingerprint: String,
}

impl From<&Fixture> for FixtureSummary {
    fn from(fixture: &Fixture) -> Self {
        Self {
            ledgers: fixture.ledgers.len(),
            accounts: fixture.pool.len(),
            elapsed_ms: u64::try_from(fixture.elapsed.as_millis()).unwrap_or(u64::MAX),
            fingerprint: fixture.pool.fingerprint(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ScenarioReport {
    pub config: ScenarioConfig,
    pub fixture: FixtureSummary,
    pub runs: Vec<RunSummary>,
}

impl ScenarioReport {
    pub fn write_json(&self, path: &Path) -> Result<(), StressError> {
        let json = serde_json::to_vec_pretty(self).map_err(|e| StressError::Report(e.into()))?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(StressError::Report)?;
            }
        }
        fs::write(path, json).map_err(StressError::Report)
    }
}

/// Outcome of a full scenario, with the raw per-run statistics kept around.
#[derive(Debug)]
pub struct ScenarioOutcome {
    pub fixture: Fixture,
    pub runs: Vec<RunStatistics>,
}

impl ScenarioOutcome {
    pub fn report(&self, config: &ScenarioConfig) -> ScenarioReport {
        ScenarioReport {
            config: config.clone(),
            fixture: FixtureSummary::from(&self.fixture),
            runs: self.runs.iter().map(RunStatistics::summary).collect(),
        }
    }
}

/// Waits for the service, builds the fixture, then runs every concurrency
/// level in turn. A level only starts once all workers of the previous one
/// have been joined.
pub fn run_scenario<S>(
    service: &S,
    gate: &EventWaitGate,
    config: &ScenarioConfig,
) -> Result<ScenarioOutcome, StressError>
where
    S: LedgerService + ?Sized,
{
    config.validate()?;
    gate.await_notification(
        EventCategory::Initialize,
        INITIALIZE_IDENTIFIER,
        config.event_timeout(),
    )
    .map_err(StressError::ServiceNotReady)?;

    info!(
        ledgers = config.ledgers,
        accounts_per_ledger = config.accounts_per_ledger,
        "preparing fixture"
    );
    let mut generator = FixtureGenerator::new(service, gate, config.event_timeout());
    if let Some(seed) = config.seed {
        generator = generator.with_seed(seed);
    }
    let fixture = generator.build(config.ledgers, config.accounts_per_ledger)?;

    let mut runs = Vec::with_capacity(config.concurrency_levels.len());
    for (level, &concurrency) in config.concurrency_levels.iter().enumerate() {
        info!(
            concurrency,
            entries_per_worker = config.entries_per_worker,
            amount = %format_amount(config.entry_amount),
            "starting load run"
        );
        let load = LoadConfig {
            concurrency,
            entries_per_worker: config.entries_per_worker,
            amount: config.entry_amount,
            seed: config.seed.map(|seed| seed.wrapping_add(level as u64 + 1)),
        };
        runs.push(run_load(service, &fixture.pool, &load)?);
    }

    Ok(ScenarioOutcome { fixture, runs })
}
