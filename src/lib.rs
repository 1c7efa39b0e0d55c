//! ClickAsk - natural-language questions answered over ClickHouse
//!
//! This crate turns a question into a bounded, read-only SQL statement through:
//! - A schema registry loaded from a CSV data dictionary
//! - Structured query plans requested from an LLM and compiled to SQL
//! - A guard that rejects mutating statements and unlisted tables
//! - A fallback cascade that always returns something useful

pub mod utils;

pub mod cascade;
pub mod config;
pub mod executor;
pub mod llm;
pub mod query_plan;
pub mod schema_catalog;
pub mod server;
pub mod sql_guard;
