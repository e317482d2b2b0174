//! Checkout saga state machine.

use serde::{Deserialize, Serialize};

/// The state of a checkout saga.
///
/// ```text
/// NotStarted ──► Running ──┬──► Completed
///                          └──► Failed ──► Reconciled
/// ```
///
/// A failed saga that still holds deductions waits for reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaState {
    #[default]
    NotStarted,
    Running,
    Completed,
    Failed,
    Reconciled,
}

impl SagaState {
    pub fn is_running(&self) -> bool {
        matches!(self, SagaState::Running)
    }

    /// Only failed sagas are reconciled.
    pub fn can_reconcile(&self) -> bool {
        matches!(self, SagaState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::NotStarted => "NOT_STARTED",
            SagaState::Running => "RUNNING",
            SagaState::Completed => "COMPLETED",
            SagaState::Failed => "FAILED",
            SagaState::Reconciled => "RECONCILED",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
