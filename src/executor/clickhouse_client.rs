use std::env;

use async_trait::async_trait;
use clickhouse::Client;
use serde_json::Value;
use tokio::io::AsyncBufReadExt;

use super::errors::ExecutionError;
use super::{QueryExecutor, QueryOutput, QueryParams};

/// Names on the first line, one JSON array per row after it.
const OUTPUT_FORMAT: &str = "JSONCompactEachRowWithNames";

#[derive(Debug, Clone)]
pub struct ClickHouseConfig {
    pub url: String,
    pub user: String,
    pub password: String,
    pub database: String,
}

fn read_env_var(key: &str) -> Option<String> {
    env::var(key).ok()
}

impl ClickHouseConfig {
    /// `CLICKHOUSE_URL`, `CLICKHOUSE_USER`, `CLICKHOUSE_PASSWORD`, `CLICKHOUSE_DATABASE`.
    pub fn from_env() -> Option<Self> {
        Some(Self {
            url: read_env_var("CLICKHOUSE_URL")?,
            user: read_env_var("CLICKHOUSE_USER")?,
            password: read_env_var("CLICKHOUSE_PASSWORD")?,
            database: read_env_var("CLICKHOUSE_DATABASE")?,
        })
    }

    fn client(&self) -> Client {
        Client::default()
            .with_url(&self.url)
            .with_user(&self.user)
            .with_password(&self.password)
            .with_database(&self.database)
            .with_option("join_use_nulls", "1")
    }
}

/// Executes statements over ClickHouse HTTP.
///
/// A fresh client is built for every attempt, so a broken connection in one
/// request never leaks into another.
#[derive(Debug, Clone)]
pub struct ClickHouseExecutor {
    config: Option<ClickHouseConfig>,
}

impl ClickHouseExecutor {
    pub fn new(config: ClickHouseConfig) -> Self {
        Self {
            config: Some(config),
        }
    }

    /// Executor without connection settings; every attempt reports a
    /// connection failure.
    pub fn unconfigured() -> Self {
        Self { config: None }
    }

    pub fn from_env() -> Self {
        match ClickHouseConfig::from_env() {
            Some(config) => Self::new(config),
            None => {
                log::warn!("CLICKHOUSE_* environment variables not set; queries will not run");
                Self::unconfigured()
            }
        }
    }
}

#[async_trait]
impl QueryExecutor for ClickHouseExecutor {
    async fn execute(&self, sql: &str, params: &QueryParams) -> Result<QueryOutput, ExecutionError> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| ExecutionError::Connection("ClickHouse is not configured".to_string()))?;

        log::debug!("Executing SQL:\n{}\nparams: {:?}", sql, params);

        let mut query = config.client().query(sql);
        for (name, value) in params {
            query = query.param(name, value.as_str());
        }

        let mut lines = query
            .fetch_bytes(OUTPUT_FORMAT)
            .map_err(|e| {
                log::error!("ClickHouse query failed. SQL was:\n{}\nError: {}", sql, e);
                ExecutionError::from(e)
            })?
            .lines();

        let mut decoder = CompactRowDecoder::default();
        while let Some(line) = lines.next_line().await.map_err(|e| {
            log::error!(
                "ClickHouse response read failed. SQL was:\n{}\nError: {}",
                sql,
                e
            );
            ExecutionError::from(e)
        })? {
            decoder.push_line(&line)?;
        }
        Ok(decoder.finish())
    }
}

/// Incremental decoder for `JSONCompactEachRowWithNames` output.
#[derive(Debug, Default)]
pub struct CompactRowDecoder {
    output: QueryOutput,
    saw_header: bool,
}

impl CompactRowDecoder {
    pub fn push_line(&mut self, line: &str) -> Result<(), ExecutionError> {
        if line.trim().is_empty() {
            return Ok(());
        }
        let value: Value =
            serde_json::from_str(line).map_err(|e| ExecutionError::Decode(e.to_string()))?;
        let Value::Array(items) = value else {
            return Err(ExecutionError::Decode(format!(
                "expected a JSON array, got: {}",
                line
            )));
        };

        if !self.saw_header {
            self.saw_header = true;
            self.output.columns = items
                .into_iter()
                .map(|v| match v {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect();
            return Ok(());
        }

        if items.len() != self.output.columns.len() {
            return Err(ExecutionError::Decode(format!(
                "row has {} values for {} columns",
                items.len(),
                self.output.columns.len()
            )));
        }
        self.output.rows.push(items);
        Ok(())
    }

    pub fn finish(self) -> QueryOutput {
        self.output
    }
}
