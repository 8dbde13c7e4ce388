//! Finite State Machine for build-and-deploy operations

use serde::{Deserialize, Serialize};

use crate::errors::PluginError;

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrchestratorState {
    /// Not started
    Idle,

    /// Checking preconditions (SDK, roles, accounts)
    Validating,

    /// External build running
    Building,

    /// Writing deferred settings back into the role model
    Finalizing,

    /// Emulator or cloud deployment running
    Deploying,

    /// Finished successfully
    Done,

    /// Failed; absorbing
    Failed,
}

impl OrchestratorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrchestratorState::Done | OrchestratorState::Failed)
    }
}

/// Orchestrator event
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    /// Operation accepted
    Start,

    /// Preconditions hold
    Validated,

    /// Build finished with success
    BuildSucceeded,

    /// Deferred settings applied
    Finalized,

    /// Deployment call returned
    Deployed,

    /// Any failure
    Fail(String),
}

/// Orchestrator FSM
#[derive(Debug, Clone)]
pub struct OrchestratorFsm {
    state: OrchestratorState,
    error: Option<String>,
    history: Vec<OrchestratorState>,
}

impl OrchestratorFsm {
    /// Create a new FSM in idle state
    pub fn new() -> Self {
        Self {
            state: OrchestratorState::Idle,
            error: None,
            history: Vec::new(),
        }
    }

    /// Get current state
    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// States entered so far, in order (the initial idle state excluded)
    pub fn history(&self) -> &[OrchestratorState] {
        &self.history
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: OrchestratorEvent) -> Result<OrchestratorState, PluginError> {
        let new_state = match (self.state, &event) {
            (OrchestratorState::Idle, OrchestratorEvent::Start) => OrchestratorState::Validating,
            (OrchestratorState::Validating, OrchestratorEvent::Validated) => {
                OrchestratorState::Building
            }
            (OrchestratorState::Building, OrchestratorEvent::BuildSucceeded) => {
                OrchestratorState::Finalizing
            }
            (OrchestratorState::Finalizing, OrchestratorEvent::Finalized) => {
                OrchestratorState::Deploying
            }
            (OrchestratorState::Deploying, OrchestratorEvent::Deployed) => OrchestratorState::Done,

            // Failure from any running state
            (
                OrchestratorState::Validating
                | OrchestratorState::Building
                | OrchestratorState::Finalizing
                | OrchestratorState::Deploying,
                OrchestratorEvent::Fail(err),
            ) => {
                self.error = Some(err.clone());
                OrchestratorState::Failed
            }

            // Invalid transitions
            (state, event) => {
                return Err(PluginError::InvalidTransition(format!(
                    "{:?} -> {:?}",
                    state, event
                )));
            }
        };

        self.state = new_state;
        self.history.push(new_state);
        Ok(new_state)
    }
}

impl Default for OrchestratorFsm {
    fn default() -> Self {
        Self::new()
    }
}
