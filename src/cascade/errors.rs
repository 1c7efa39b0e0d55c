use thiserror::Error;

use crate::executor::ExecutionError;
use crate::query_plan::PlanError;
use crate::sql_guard::GuardError;

/// Failures that move the engine to its next state. Never returned to callers.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CascadeError {
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Guard(#[from] GuardError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        operation: &'static str,
        seconds: u64,
    },
    #[error("No matching table in the dictionary")]
    NoCandidates,
    /// A fallback state had nothing it could try.
    #[error("Not applicable: {0}")]
    NotApplicable(String),
}

impl CascadeError {
    /// Stable identifier of the error kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            CascadeError::Plan(PlanError::Malformed(_)) => "plan_malformed",
            CascadeError::Plan(PlanError::Request(_)) => "plan_request_failed",
            CascadeError::Guard(GuardError::UnsafeStatement { .. }) => "unsafe_statement",
            CascadeError::Guard(GuardError::UnauthorizedTable { .. }) => "unauthorized_table",
            CascadeError::Execution(ExecutionError::Connection(_)) => "connection_failed",
            CascadeError::Execution(_) => "execution_failed",
            CascadeError::Timeout { .. } => "timeout",
            CascadeError::NoCandidates => "no_candidates",
            CascadeError::NotApplicable(_) => "not_applicable",
        }
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, CascadeError::Execution(e) if e.is_connection())
    }
}
