use std::fmt;

use tokio::sync::watch;

use crate::error::HarnessError;

/// Endpoint lifecycle state
///
/// State machine: Unknown -> Starting -> Serving -> Closing -> Closed
///
/// A failed start moves straight from Starting to Closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Nothing started yet
    Unknown,
    /// Method table is being built and the listener bound
    Starting,
    /// Accept loop running
    Serving,
    /// Draining in-flight calls; no new connections are accepted
    Closing,
    /// Terminal
    Closed,
}

impl LifecycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Unknown => "unknown",
            LifecycleState::Starting => "starting",
            LifecycleState::Serving => "serving",
            LifecycleState::Closing => "closing",
            LifecycleState::Closed => "closed",
        }
    }

    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Unknown, Starting)
                | (Starting, Serving)
                | (Starting, Closed)
                | (Serving, Closing)
                | (Closing, Closed)
        )
    }

    /// Closing or Closed
    pub fn is_shutting_down(self) -> bool {
        matches!(self, LifecycleState::Closing | LifecycleState::Closed)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared lifecycle state, observable through [`watch`] receivers
#[derive(Debug)]
pub struct Lifecycle {
    state: watch::Sender<LifecycleState>,
}

impl Lifecycle {
    /// Creates a lifecycle in the `Unknown` state
    pub fn new() -> Self {
        let (state, _rx) = watch::channel(LifecycleState::Unknown);
        Self { state }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Move to `next`, failing with a usage error when the edge is not allowed
    pub fn transition(&self, next: LifecycleState) -> Result<(), HarnessError> {
        let mut from = next;
        let moved = self.state.send_if_modified(|current| {
            from = *current;
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                false
            }
        });
        if moved {
            Ok(())
        } else {
            Err(HarnessError::UsageError(format!(
                "endpoint is {from}, cannot move to {next}"
            )))
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
