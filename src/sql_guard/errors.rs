use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GuardError {
    #[error("Unsafe statement: {reason}")]
    UnsafeStatement { reason: String },
    #[error("Statement references tables outside the allowlist: {}", tables.join(", "))]
    UnauthorizedTable { tables: Vec<String> },
}

impl GuardError {
    pub fn unsafe_statement(reason: impl Into<String>) -> Self {
        GuardError::UnsafeStatement {
            reason: reason.into(),
        }
    }
}
