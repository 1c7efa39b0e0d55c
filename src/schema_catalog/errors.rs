//! # Schema Catalog Error Types
//!
//! Errors raised while loading the schema dictionary at startup.
//!
//! ## Error Categories
//!
//! - **Catalog Errors**: the dictionary source is missing entirely
//! - **Parse Errors**: a dictionary export exists but cannot be read as CSV
//!
//! All of these are fatal at startup. Nothing in this module is raised while
//! answering a question; the registry is read-only after `load`.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum CatalogError {
    #[error("Schema dictionary not found: {path}")]
    CatalogNotFound { path: String },
    #[error("Failed to read schema dictionary '{path}': {error}")]
    ReadError { path: String, error: String },
    #[error("Failed to parse schema dictionary '{path}': {error}")]
    ParseError { path: String, error: String },
    #[error("Schema dictionary '{path}' has no '{header}' column")]
    MissingHeader { path: String, header: String },
}

impl CatalogError {
    /// Create a parse error with the row that failed
    ///
    /// # Example
    /// ```ignore
    /// CatalogError::parse_error_with_context("tables.csv", err, "row 12")
    /// ```
    pub fn parse_error_with_context(
        path: impl Into<String>,
        error: impl std::fmt::Display,
        context: impl Into<String>,
    ) -> Self {
        CatalogError::ParseError {
            path: path.into(),
            error: format!("{}\n  Context: {}", error, context.into()),
        }
    }
}
