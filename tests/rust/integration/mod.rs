//! Integration tests - the engine and HTTP handlers wired together
//!
//! The LLM and ClickHouse are replaced by scripted implementations of
//! `PlanRequestor` and `QueryExecutor`, so no external service is required.

mod support;

mod cascade_tests;
