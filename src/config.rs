use std::env;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::{Validate, ValidationError};

use crate::cascade::CascadeSettings;
use crate::query_plan::CompilerSettings;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

lazy_static! {
    static ref TABLE_NAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_]+(\.[A-Za-z0-9_]+)?$").unwrap();
}

/// Server configuration with validation
#[derive(Clone, Debug, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP server host address
    #[validate(length(min = 1, message = "HTTP host cannot be empty"))]
    pub http_host: String,

    /// HTTP server port (1-65535)
    #[validate(range(
        min = 1,
        max = 65535,
        message = "HTTP port must be between 1 and 65535"
    ))]
    pub http_port: u16,

    /// CSV export of the dictionary's "Table" sheet
    #[validate(length(min = 1, message = "Tables CSV path cannot be empty"))]
    pub tables_csv: String,

    /// CSV export of the dictionary's "Column" sheet
    #[validate(length(min = 1, message = "Columns CSV path cannot be empty"))]
    pub columns_csv: String,

    /// Hard ceiling on rows returned by any statement
    #[validate(range(min = 1, max = 10000, message = "Max rows must be between 1 and 10000"))]
    pub max_rows: u32,

    /// Candidate tables kept from schema search
    #[validate(range(min = 1, max = 50, message = "Search top-k must be between 1 and 50"))]
    pub search_top_k: usize,

    /// Fact table used when a plan names none and search has no candidates
    #[validate(custom(function = "validate_table_name"))]
    pub default_table: String,

    /// Tables sampled after the candidates when everything else failed
    #[validate(custom(function = "validate_table_names"))]
    pub fallback_tables: Vec<String>,

    #[validate(range(min = 1, max = 600, message = "LLM timeout must be between 1 and 600 seconds"))]
    pub llm_timeout_secs: u64,

    #[validate(range(min = 1, max = 600, message = "Query timeout must be between 1 and 600 seconds"))]
    pub query_timeout_secs: u64,

    /// Longest question accepted over HTTP
    #[validate(range(min = 1, max = 100000, message = "Max input chars must be between 1 and 100000"))]
    pub max_input_chars: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_host: "0.0.0.0".to_string(),
            http_port: 8080,
            tables_csv: "dictionary/tables.csv".to_string(),
            columns_csv: "dictionary/columns.csv".to_string(),
            max_rows: 200,
            search_top_k: 8,
            default_table: "DW.Cluster_Main_Sales".to_string(),
            fallback_tables: Vec::new(),
            llm_timeout_secs: 60,
            query_timeout_secs: 30,
            max_input_chars: 4000,
        }
    }
}

impl ServerConfig {
    /// Create configuration from environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            http_host: env::var("CLICKASK_HOST").unwrap_or(defaults.http_host),
            http_port: parse_env_var("CLICKASK_PORT", "8080")?,
            tables_csv: env::var("CLICKASK_TABLES_CSV").unwrap_or(defaults.tables_csv),
            columns_csv: env::var("CLICKASK_COLUMNS_CSV").unwrap_or(defaults.columns_csv),
            max_rows: parse_env_var("CLICKASK_MAX_ROWS", "200")?,
            search_top_k: parse_env_var("CLICKASK_SEARCH_TOP_K", "8")?,
            default_table: env::var("CLICKASK_DEFAULT_TABLE").unwrap_or(defaults.default_table),
            fallback_tables: env::var("CLICKASK_FALLBACK_TABLES")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            llm_timeout_secs: parse_env_var("CLICKASK_LLM_TIMEOUT_SECS", "60")?,
            query_timeout_secs: parse_env_var("CLICKASK_QUERY_TIMEOUT_SECS", "30")?,
            max_input_chars: parse_env_var("CLICKASK_MAX_INPUT_CHARS", "4000")?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from CLI arguments with validation
    pub fn from_cli(cli: CliConfig) -> Result<Self, ConfigError> {
        let config = Self {
            http_host: cli.http_host,
            http_port: cli.http_port,
            tables_csv: cli.tables_csv,
            columns_csv: cli.columns_csv,
            max_rows: cli.max_rows,
            search_top_k: cli.search_top_k,
            default_table: cli.default_table,
            fallback_tables: cli.fallback_tables,
            llm_timeout_secs: cli.llm_timeout_secs,
            query_timeout_secs: cli.query_timeout_secs,
            max_input_chars: cli.max_input_chars,
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content,
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn cascade_settings(&self) -> CascadeSettings {
        CascadeSettings {
            search_top_k: self.search_top_k,
            max_rows: self.max_rows,
            fallback_tables: self.fallback_tables.clone(),
            llm_timeout: Duration::from_secs(self.llm_timeout_secs),
            query_timeout: Duration::from_secs(self.query_timeout_secs),
            compiler: CompilerSettings {
                hard_ceiling: self.max_rows,
                default_limit: self.max_rows,
                default_table: self.default_table.clone(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// CLI configuration (parsed from command line arguments)
#[derive(Clone, Debug)]
pub struct CliConfig {
    pub http_host: String,
    pub http_port: u16,
    pub tables_csv: String,
    pub columns_csv: String,
    pub max_rows: u32,
    pub search_top_k: usize,
    pub default_table: String,
    pub fallback_tables: Vec<String>,
    pub llm_timeout_secs: u64,
    pub query_timeout_secs: u64,
    pub max_input_chars: usize,
}

/// Parse an environment variable with a default value
fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn validate_table_name(name: &str) -> Result<(), ValidationError> {
    if TABLE_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(ValidationError::new("table_name")
            .with_message("expected `table` or `db.table` with letters, digits and _".into()))
    }
}

fn validate_table_names(names: &[String]) -> Result<(), ValidationError> {
    names.iter().try_for_each(|n| validate_table_name(n))
}
