use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::events::GateError;
use crate::service::ServiceError;

/// The entity whose creation could not be confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixtureEntity {
    Ledger(String),
    Account { ledger: String, identifier: String },
}

impl fmt::Display for FixtureEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixtureEntity::Ledger(id) => write!(f, "ledger {id}"),
            FixtureEntity::Account { ledger, identifier } => {
                write!(f, "account {identifier} (ledger {ledger})")
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum FixtureFailure {
    #[error("create call failed: {0}")]
    Service(#[from] ServiceError),
    #[error(transparent)]
    Gate(#[from] GateError),
}

/// Canonical error type of the harness.
#[derive(Debug, Error)]
pub enum StressError {
    /// A ledger or account was rejected, or never confirmed on the event channel.
    #[error("fixture creation failed for {entity}: {cause}")]
    FixtureCreationFailed {
        entity: FixtureEntity,
        cause: FixtureFailure,
    },

    /// A load run was requested without any accounts to draw parties from.
    #[error("account pool is empty")]
    EmptyAccountPool,

    /// The service never announced that it finished initializing.
    #[error("ledger service not ready: {0}")]
    ServiceNotReady(GateError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unreadable or malformed scenario file; JSON errors arrive wrapped in `io::Error`.
    #[error("cannot read config {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot spawn thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("cannot write report: {0}")]
    Report(#[source] io::Error),
}
