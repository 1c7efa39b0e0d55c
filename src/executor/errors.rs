use std::io;

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecutionError {
    /// The store was never reached (refused, reset, DNS, no config).
    #[error("ClickHouse connection failed: {0}")]
    Connection(String),
    #[error("ClickHouse query failed: {0}")]
    Query(String),
    #[error("Failed to decode ClickHouse response: {0}")]
    Decode(String),
}

impl ExecutionError {
    pub fn is_connection(&self) -> bool {
        matches!(self, ExecutionError::Connection(_))
    }
}

impl From<clickhouse::error::Error> for ExecutionError {
    fn from(error: clickhouse::error::Error) -> Self {
        match error {
            clickhouse::error::Error::Network(e) => ExecutionError::Connection(e.to_string()),
            other => ExecutionError::Query(other.to_string()),
        }
    }
}

impl From<io::Error> for ExecutionError {
    /// Streaming reads surface client errors wrapped in `io::Error`.
    fn from(error: io::Error) -> Self {
        if let Some(inner) = error
            .get_ref()
            .and_then(|e| e.downcast_ref::<clickhouse::error::Error>())
        {
            return match inner {
                clickhouse::error::Error::Network(e) => ExecutionError::Connection(e.to_string()),
                other => ExecutionError::Query(other.to_string()),
            };
        }
        match error.kind() {
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::TimedOut => ExecutionError::Connection(error.to_string()),
            _ => ExecutionError::Query(error.to_string()),
        }
    }
}
