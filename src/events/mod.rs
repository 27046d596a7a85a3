//! Creation notifications and the gate that blocks on them.
//!
//! The ledger service acknowledges a create before the entity is visible;
//! visibility is signalled separately on this channel. Callers that need the
//! entity to exist block in [`EventWaitGate::await_notification`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Identifier published by the service once it has finished initializing.
pub const INITIALIZE_IDENTIFIER: &str = "1";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Initialize,
    PostLedger,
    PostAccount,
}

impl EventCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::PostLedger => "post-ledger",
            Self::PostAccount => "post-account",
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("no {category} notification for {identifier} within {waited:?}")]
    Timeout {
        category: EventCategory,
        identifier: String,
        waited: Duration,
    },
    #[error("wait for {category} notification on {identifier} was interrupted")]
    Interrupted {
        category: EventCategory,
        identifier: String,
    },
}

#[derive(Default)]
struct RecorderState {
    // Pending counts: the same identifier can be published more than once.
    pending: HashMap<(EventCategory, String), usize>,
    closed: bool,
}

/// Sink the service publishes notifications into.
#[derive(Default)]
pub struct EventRecorder {
    state: Mutex<RecorderState>,
    arrived: Condvar,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, category: EventCategory, identifier: impl Into<String>) {
        let identifier = identifier.into();
        let mut state = self.state.lock();
        if state.closed {
            debug!(%category, %identifier, "notification after close dropped");
            return;
        }
        *state.pending.entry((category, identifier)).or_insert(0) += 1;
        drop(state);
        self.arrived.notify_all();
    }

    /// Wakes every waiter; pending and future waits fail as interrupted.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.arrived.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn pending(&self) -> usize {
        self.state.lock().pending.values().sum()
    }
}

/// Blocks callers until the notification for a given entity has arrived.
#[derive(Clone)]
pub struct EventWaitGate {
    recorder: Arc<EventRecorder>,
}

impl EventWaitGate {
    pub fn new(recorder: Arc<EventRecorder>) -> Self {
        Self { recorder }
    }

    pub fn recorder(&self) -> &Arc<EventRecorder> {
        &self.recorder
    }

    /// Succeeds once a notification matching `category` and `identifier`
    /// exactly has been observed, consuming it.
    pub fn await_notification(
        &self,
        category: EventCategory,
        identifier: &str,
        timeout: Duration,
    ) -> Result<(), GateError> {
        let started = Instant::now();
        let deadline = started + timeout;
        let key = (category, identifier.to_string());
        let mut state = self.recorder.state.lock();
        loop {
            if let Some(count) = state.pending.get_mut(&key) {
                *count -= 1;
                if *count == 0 {
                    state.pending.remove(&key);
                }
                return Ok(());
            }
            if state.closed {
                warn!(%category, identifier, "event channel closed while waiting");
                return Err(GateError::Interrupted {
                    category,
                    identifier: key.1,
                });
            }
            if self
                .recorder
                .arrived
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                // A notification may have raced the deadline.
                if state.pending.contains_key(&key) {
                    continue;
                }
                return Err(GateError::Timeout {
                    category,
                    identifier: key.1,
                    waited: started.elapsed(),
                });
            }
        }
    }
}
