use std::{path::PathBuf, process, sync::Arc, time::Duration};

use clap::Parser;
use tracing::{error, info};

use ledger_stress::{
    run_scenario, EventRecorder, EventWaitGate, InMemoryLedgerService, ScenarioConfig,
    SimulationOptions, StressError,
};

//==================== CLI ====================//

/// Journal-entry stress test against a ledger service.
#[derive(Parser, Debug)]
#[command(name = "ledger-stress", version, about, long_about = None)]
struct Cli {
    /// JSON scenario file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    ledgers: Option<usize>,

    #[arg(long)]
    accounts_per_ledger: Option<usize>,

    #[arg(long)]
    entries_per_worker: Option<usize>,

    /// Comma-separated, ascending worker counts, e.g. 4,8,16
    #[arg(long, value_delimiter = ',')]
    concurrency: Option<Vec<usize>>,

    /// Amount per side of every entry, in minor units (5000 = 50.00)
    #[arg(long)]
    amount: Option<u64>,

    #[arg(long)]
    event_timeout_ms: Option<u64>,

    #[arg(long)]
    seed: Option<u64>,

    /// Simulated round trip of every create call
    #[arg(long, default_value_t = 0)]
    write_latency_us: u64,

    /// Delay before the service announces a created ledger/account
    #[arg(long, default_value_t = 1_000)]
    event_delay_us: u64,

    /// Probability that the service rejects a journal entry
    #[arg(long, default_value_t = 0.0)]
    failure_rate: f64,

    /// Write the scenario report as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

impl Cli {
    fn scenario_config(&self) -> Result<ScenarioConfig, StressError> {
        let mut config = match &self.config {
            Some(path) => ScenarioConfig::from_file(path)?,
            None => ScenarioConfig::default(),
        };
        if let Some(v) = self.ledgers {
            config.ledgers = v;
        }
        if let Some(v) = self.accounts_per_ledger {
            config.accounts_per_ledger = v;
        }
        if let Some(v) = self.entries_per_worker {
            config.entries_per_worker = v;
        }
        if let Some(v) = &self.concurrency {
            config.concurrency_levels = v.clone();
        }
        if let Some(v) = self.amount {
            config.entry_amount = v;
        }
        if let Some(v) = self.event_timeout_ms {
            config.event_timeout_ms = v;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        config.validate()?;
        Ok(config)
    }

    fn simulation_options(&self, seed: Option<u64>) -> Result<SimulationOptions, StressError> {
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(StressError::InvalidConfig(format!(
                "--failure-rate must be within 0.0..=1.0, got {}",
                self.failure_rate
            )));
        }
        Ok(SimulationOptions {
            write_latency: Duration::from_micros(self.write_latency_us),
            event_delay: Duration::from_micros(self.event_delay_us),
            failure_rate: self.failure_rate,
            seed,
        })
    }
}

//==================== main ====================//

fn run(cli: &Cli) -> Result<(), StressError> {
    let config = cli.scenario_config()?;
    let options = cli.simulation_options(config.seed)?;

    let recorder = Arc::new(EventRecorder::new());
    let service = InMemoryLedgerService::start(recorder.clone(), options)
        .map_err(StressError::Spawn)?;
    let gate = EventWaitGate::new(recorder);

    let outcome = run_scenario(&service, &gate, &config)?;
    let snapshot = service.snapshot();
    info!(
        journal_entries = snapshot.journal_entries,
        net_balance = %snapshot.net_balance,
        balance_root = %snapshot.balance_root,
        "service state after scenario"
    );

    let report = outcome.report(&config);
    for run in &report.runs {
        println!(
            "concurrency={:<3} entries={:<7} ok={:<7} failed={:<5} summed={:.3}s mean={:.3}ms throughput={:.1}/s",
            run.concurrency,
            run.total_entries,
            run.succeeded,
            run.failed,
            run.summed_elapsed_ms / 1_000.0,
            run.mean_latency_ms,
            run.throughput_per_sec,
        );
    }
    if let Some(path) = &cli.report {
        report.write_json(path)?;
        println!("report → {}", path.display());
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        error!(error = %err, "stress run aborted");
        eprintln!("error: {err}");
        process::exit(match err {
            StressError::InvalidConfig(_) | StressError::Config { .. } => 2,
            _ => 1,
        });
    }
}
