use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlanError {
    #[error("Query plan is malformed: {0}")]
    Malformed(String),
    #[error("Plan request failed: {0}")]
    Request(String),
}
