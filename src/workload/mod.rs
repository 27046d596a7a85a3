//! Concurrent journal-entry load against a prepared account pool.
//!
//! One run spawns exactly `concurrency` workers, each submitting
//! `entries_per_worker` entries between randomly drawn accounts. Workers time
//! their own submissions; the driver merges the totals after joining them all.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::error::StressError;
use crate::fixture::AccountPool;
use crate::ledger::{random_journal_entry, Amount, JournalEntry};
use crate::service::{LedgerService, ServiceError};

mod sampler;

pub use sampler::{IndexSampler, UniformSampler};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadConfig {
    pub concurrency: usize,
    pub entries_per_worker: usize,
    /// Amount booked on both sides of every entry.
    pub amount: Amount,
    pub seed: Option<u64>,
}

/// Timing and outcome tally of a single worker.
#[derive(Clone, Debug)]
pub struct WorkerReport {
    pub worker: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Time spent in successful submissions only.
    pub elapsed: Duration,
    pub started_at: Instant,
    pub finished_at: Instant,
}

#[derive(Clone, Debug)]
pub struct RunStatistics {
    pub concurrency: usize,
    pub entries_per_worker: usize,
    /// Nominal `concurrency × entries_per_worker`, whatever the outcomes.
    pub total_entries: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Workers that died outside a submission, e.g. in their sampler.
    pub panicked_workers: usize,
    /// Sum of every worker's [`WorkerReport::elapsed`].
    pub summed_elapsed: Duration,
    pub wall_clock: Duration,
    pub workers: Vec<WorkerReport>,
}

impl RunStatistics {
    fn merge(config: &LoadConfig, workers: Vec<WorkerReport>, panicked_workers: usize, wall_clock: Duration) -> Self {
        Self {
            concurrency: config.concurrency,
            entries_per_worker: config.entries_per_worker,
            total_entries: (config.concurrency as u64).saturating_mul(config.entries_per_worker as u64),
            succeeded: workers.iter().map(|w| w.succeeded as u64).sum(),
            failed: workers.iter().map(|w| w.failed as u64).sum(),
            panicked_workers,
            summed_elapsed: workers.iter().map(|w| w.elapsed).sum(),
            wall_clock,
            workers,
        }
    }

    /// Entries per second of summed submission time.
    pub fn throughput(&self) -> f64 {
        let secs = self.summed_elapsed.as_secs_f64();
        if secs > 0.0 {
            self.total_entries as f64 / secs
        } else {
            0.0
        }
    }

    pub fn mean_latency(&self) -> Duration {
        if self.total_entries == 0 {
            return Duration::ZERO;
        }
        let nanos = self.summed_elapsed.as_nanos() / u128::from(self.total_entries);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    pub fn first_worker_start(&self) -> Option<Instant> {
        self.workers.iter().map(|w| w.started_at).min()
    }

    pub fn last_worker_finish(&self) -> Option<Instant> {
        self.workers.iter().map(|w| w.finished_at).max()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            concurrency: self.concurrency,
            entries_per_worker: self.entries_per_worker,
            total_entries: self.total_entries,
            succeeded: self.succeeded,
            failed: self.failed,
            panicked_workers: self.panicked_workers,
            summed_elapsed_ms: self.summed_elapsed.as_secs_f64() * 1_000.0,
            wall_clock_ms: self.wall_clock.as_secs_f64() * 1_000.0,
            throughput_per_sec: self.throughput(),
            mean_latency_ms: self.mean_latency().as_secs_f64() * 1_000.0,
        }
    }
}

/// Serializable view of [`RunStatistics`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub concurrency: usize,
    pub entries_per_worker: usize,
    pub total_entries: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub panicked_workers: usize,
    pub summed_elapsed_ms: f64,
    pub wall_clock_ms: f64,
    pub throughput_per_sec: f64,
    pub mean_latency_ms: f64,
}

/// Runs one load level with uniformly sampled parties.
pub fn run_load<S>(
    service: &S,
    pool: &AccountPool,
    config: &LoadConfig,
) -> Result<RunStatistics, StressError>
where
    S: LedgerService + ?Sized,
{
    let seed = config.seed;
    run_load_with(service, pool, config, |worker| match seed {
        Some(seed) => UniformSampler::seeded(worker_seed(seed, worker)),
        None => UniformSampler::from_entropy(),
    })
}

/// Like [`run_load`], with `sampler_for(worker)` choosing each worker's parties.
pub fn run_load_with<S, I, F>(
    service: &S,
    pool: &AccountPool,
    config: &LoadConfig,
    sampler_for: F,
) -> Result<RunStatistics, StressError>
where
    S: LedgerService + ?Sized,
    I: IndexSampler + Send,
    F: Fn(usize) -> I,
{
    if pool.is_empty() {
        return Err(StressError::EmptyAccountPool);
    }
    if config.concurrency == 0 {
        return Err(StressError::InvalidConfig(
            "concurrency must be at least 1".into(),
        ));
    }

    let run_start = Instant::now();
    let joined = thread::scope(|scope| {
        let mut handles = Vec::with_capacity(config.concurrency);
        for worker in 0..config.concurrency {
            let sampler = sampler_for(worker);
            let rng = match config.seed {
                Some(seed) => StdRng::seed_from_u64(!worker_seed(seed, worker)),
                None => StdRng::from_entropy(),
            };
            let spawned = thread::Builder::new()
                .name(format!("load-worker-{worker}"))
                .spawn_scoped(scope, move || {
                    run_worker(worker, service, pool, config, sampler, rng)
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    // Drain what was started before giving up on the run.
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(StressError::Spawn(err));
                }
            }
        }
        Ok(handles
            .into_iter()
            .map(|handle| handle.join())
            .collect::<Vec<_>>())
    })?;
    let wall_clock = run_start.elapsed();

    let mut reports = Vec::with_capacity(joined.len());
    let mut panicked = 0;
    for outcome in joined {
        match outcome {
            Ok(report) => reports.push(report),
            Err(_) => {
                panicked += 1;
                error!(concurrency = config.concurrency, "load worker panicked, its timings are lost");
            }
        }
    }

    let stats = RunStatistics::merge(config, reports, panicked, wall_clock);
    info!(
        concurrency = stats.concurrency,
        entries = stats.total_entries,
        succeeded = stats.succeeded,
        failed = stats.failed,
        summed_s = stats.summed_elapsed.as_secs_f64(),
        wall_clock_s = stats.wall_clock.as_secs_f64(),
        mean_latency_ms = stats.mean_latency().as_secs_f64() * 1_000.0,
        throughput = stats.throughput(),
        "journal entries added"
    );
    Ok(stats)
}

fn worker_seed(seed: u64, worker: usize) -> u64 {
    seed.wrapping_add((worker as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

fn run_worker<S, I>(
    worker: usize,
    service: &S,
    pool: &AccountPool,
    config: &LoadConfig,
    mut sampler: I,
    mut rng: StdRng,
) -> WorkerReport
where
    S: LedgerService + ?Sized,
    I: IndexSampler,
{
    let accounts = pool.accounts();
    let bound = accounts.len();
    let started_at = Instant::now();
    let mut report = WorkerReport {
        worker,
        attempted: 0,
        succeeded: 0,
        failed: 0,
        elapsed: Duration::ZERO,
        started_at,
        finished_at: started_at,
    };

    for _ in 0..config.entries_per_worker {
        let debtor = &accounts[sampler.next_index(bound) % bound];
        let creditor = &accounts[sampler.next_index(bound) % bound];
        let entry = random_journal_entry(&mut rng, debtor, config.amount, creditor, config.amount);

        report.attempted += 1;
        match submit(service, &entry) {
            Ok(took) => {
                report.succeeded += 1;
                report.elapsed += took;
            }
            Err(err) => {
                report.failed += 1;
                warn!(
                    worker,
                    transaction = %entry.transaction_identifier,
                    error = %err,
                    "journal entry submission failed"
                );
            }
        }
    }

    report.finished_at = Instant::now();
    report
}

#[derive(Debug, Error)]
enum SubmitError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("service call panicked: {0}")]
    Panicked(String),
}

/// Times one blocking create call. A panic inside the call is turned into a
/// failed submission so the worker keeps going.
fn submit<S: LedgerService + ?Sized>(
    service: &S,
    entry: &JournalEntry,
) -> Result<Duration, SubmitError> {
    let start = Instant::now();
    panic::catch_unwind(AssertUnwindSafe(|| service.create_journal_entry(entry)))
        .map_err(|payload| SubmitError::Panicked(panic_message(&*payload)))??;
    Ok(start.elapsed())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::random_account;
    use crate::testing::ScriptedService;
    use std::collections::HashSet;

    fn pool(n: usize) -> AccountPool {
        let mut rng = StdRng::seed_from_u64(n as u64);
        AccountPool::from_accounts((0..n).map(|_| random_account(&mut rng, "ledger")).collect())
    }

    fn config(concurrency: usize, entries_per_worker: usize) -> LoadConfig {
        LoadConfig {
            concurrency,
            entries_per_worker,
            amount: 5_000,
            seed: Some(17),
        }
    }

    #[test]
    fn three_accounts_two_workers_five_entries() {
        let service = ScriptedService::new();
        let pool = pool(3);
        let stats = run_load(&service, &pool, &config(2, 5)).expect("run");

        assert_eq!(service.entry_calls(), 10);
        assert_eq!(stats.total_entries, 10);
        assert_eq!(stats.workers.len(), 2);
        assert!(stats.workers.iter().all(|w| w.attempted == 5));
        let workers: HashSet<_> = stats.workers.iter().map(|w| w.worker).collect();
        assert_eq!(workers, HashSet::from([0, 1]));

        let known: HashSet<_> = pool.accounts().iter().map(|a| a.identifier.clone()).collect();
        for (debtor, creditor) in service.submitted() {
            assert!(known.contains(&debtor));
            assert!(known.contains(&creditor));
        }
    }

    #[test]
    fn empty_pool_is_rejected_before_any_submission() {
        let service = ScriptedService::new();
        let err = run_load(&service, &AccountPool::default(), &config(4, 10)).unwrap_err();
        assert!(matches!(err, StressError::EmptyAccountPool));
        assert_eq!(service.entry_calls(), 0);
    }

    #[test]
    fn zero_concurrency_is_invalid() {
        let service = ScriptedService::new();
        let err = run_load(&service, &pool(2), &config(0, 10)).unwrap_err();
        assert!(matches!(err, StressError::InvalidConfig(_)));
    }

    #[test]
    fn failed_submission_does_not_stop_the_worker() {
        let service = ScriptedService::new().failing_entries([1], Duration::ZERO);
        let stats = run_load(&service, &pool(4), &config(1, 5)).expect("run");

        assert_eq!(service.entry_calls(), 5);
        assert_eq!(stats.succeeded, 4);
        assert_eq!(stats.failed, 1);
        // Throughput still counts the nominal number of entries.
        assert_eq!(stats.total_entries, 5);
        assert_eq!(stats.summary().total_entries, 5);
    }

    #[test]
    fn summed_time_is_the_sum_of_successful_submissions() {
        let call = Duration::from_millis(10);
        let slow_failure = Duration::from_millis(80);
        let service = ScriptedService::new()
            .entry_delay(call)
            .failing_entries([0, 2], slow_failure);
        let stats = run_load(&service, &pool(3), &config(1, 4)).expect("run");

        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.failed, 2);
        assert!(stats.summed_elapsed >= call * 2);
        // The two slow calls failed, so they never reached the total.
        assert!(stats.summed_elapsed < slow_failure);
        assert!(stats.wall_clock >= slow_failure * 2 + call * 2);
    }

    #[test]
    fn injected_sampler_picks_the_parties() {
        let service = ScriptedService::new();
        let pool = pool(3);
        let ids: Vec<_> = pool.accounts().iter().map(|a| a.identifier.clone()).collect();
        run_load_with(&service, &pool, &config(1, 3), |_| {
            let mut next = 0usize;
            move |bound: usize| {
                next += 1;
                (next - 1) % bound
            }
        })
        .expect("run");

        assert_eq!(
            service.submitted(),
            vec![
                (ids[0].clone(), ids[1].clone()),
                (ids[2].clone(), ids[0].clone()),
                (ids[1].clone(), ids[2].clone()),
            ]
        );
    }

    #[test]
    fn debtor_and_creditor_may_coincide() {
        let service = ScriptedService::new();
        let pool = pool(1);
        let stats = run_load(&service, &pool, &config(2, 3)).expect("run");
        assert_eq!(stats.succeeded, 6);
        let only = &pool.accounts()[0].identifier;
        assert!(service
            .submitted()
            .iter()
            .all(|(d, c)| d == only && c == only));
    }

    #[test]
    fn panicking_submission_counts_as_failed() {
        let service = ScriptedService::new().panic_at_entry(0);
        let stats = run_load(&service, &pool(3), &config(3, 2)).expect("run");
        assert_eq!(service.entry_calls(), 6);
        assert_eq!(stats.panicked_workers, 0);
        assert_eq!(stats.workers.len(), 3);
        assert_eq!(stats.succeeded, 5);
        assert_eq!(stats.failed, 1);
        assert!(stats.workers.iter().all(|w| w.attempted == 2));

        let service = ScriptedService::new().panic_at_entry(0);
        let stats = run_load(&service, &pool(3), &config(1, 5)).expect("run");
        assert_eq!(service.entry_calls(), 5);
        assert_eq!(stats.succeeded, 4);
    }

    #[test]
    fn panicking_worker_does_not_fail_the_run() {
        let service = ScriptedService::new();
        let stats = run_load_with(&service, &pool(3), &config(3, 2), |worker| {
            move |bound: usize| {
                if worker == 1 {
                    panic!("sampler for worker {worker} gave up");
                }
                bound - 1
            }
        })
        .expect("run");
        assert_eq!(stats.panicked_workers, 1);
        assert_eq!(stats.workers.len(), 2);
        assert_eq!(stats.total_entries, 6);
        assert_eq!(service.entry_calls(), 4);
    }

    #[test]
    fn run_returns_after_every_worker_finished() {
        let service = ScriptedService::new();
        let stats = run_load(&service, &pool(5), &config(8, 20)).expect("run");
        let returned = Instant::now();
        assert_eq!(stats.workers.len(), 8);
        assert!(stats.workers.iter().all(|w| w.finished_at <= returned));
        assert_eq!(service.entry_calls(), 160);
    }

    #[test]
    fn zero_entries_per_worker() {
        let service = ScriptedService::new();
        let stats = run_load(&service, &pool(2), &config(3, 0)).expect("run");
        assert_eq!(stats.workers.len(), 3);
        assert_eq!(stats.total_entries, 0);
        assert_eq!(stats.mean_latency(), Duration::ZERO);
        assert_eq!(stats.throughput(), 0.0);
        assert_eq!(service.entry_calls(), 0);
    }

    #[test]
    fn derived_metrics() {
        let now = Instant::now();
        let report = |worker, elapsed| WorkerReport {
            worker,
            attempted: 50,
            succeeded: 50,
            failed: 0,
            elapsed,
            started_at: now,
            finished_at: now,
        };
        let stats = RunStatistics::merge(
            &config(2, 50),
            vec![report(0, Duration::from_millis(300)), report(1, Duration::from_millis(700))],
            0,
            Duration::from_millis(700),
        );
        assert_eq!(stats.summed_elapsed, Duration::from_secs(1));
        assert_eq!(stats.total_entries, 100);
        assert_eq!(stats.mean_latency(), Duration::from_millis(10));
        assert!((stats.throughput() - 100.0).abs() < 1e-9);
        let summary = stats.summary();
        assert!((summary.mean_latency_ms - 10.0).abs() < 1e-9);
        assert_eq!(summary.succeeded, 100);
    }
}
