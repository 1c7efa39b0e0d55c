//! Query execution against the analytical store.

pub mod clickhouse_client;
pub mod errors;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

pub use clickhouse_client::{ClickHouseConfig, ClickHouseExecutor};
pub use errors::ExecutionError;

/// Named server-side parameters, referenced in SQL as `{name:Type}`.
pub type QueryParams = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryOutput {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, sql: &str, params: &QueryParams) -> Result<QueryOutput, ExecutionError>;
}
