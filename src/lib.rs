//! Load generator for a double-entry ledger service.
//!
//! A run has two phases:
//!
//! * [`fixture`] creates ledgers and accounts one at a time, waiting on the
//!   service's creation notifications ([`events`]) before moving on.
//! * [`workload`] hammers the service with journal entries between randomly
//!   drawn accounts from that fixture, at increasing concurrency levels,
//!   driven by [`scenario`].
//!
//! The service itself sits behind [`service::LedgerService`]; an in-process
//! implementation is bundled so the harness can run without a backend.

pub mod error;
pub mod events;
pub mod fixture;
pub mod ledger;
pub mod scenario;
pub mod service;
pub mod workload;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{FixtureEntity, FixtureFailure, StressError};
pub use events::{EventCategory, EventRecorder, EventWaitGate, GateError};
pub use fixture::{AccountPool, Fixture, FixtureGenerator};
pub use scenario::{run_scenario, ScenarioConfig, ScenarioOutcome, ScenarioReport};
pub use service::{InMemoryLedgerService, LedgerService, ServiceError, SimulationOptions};
pub use workload::{run_load, run_load_with, IndexSampler, LoadConfig, RunStatistics, RunSummary};
