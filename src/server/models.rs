use serde::{Deserialize, Serialize};

use crate::schema_catalog::{ColumnHighlights, TableDescriptor};

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub question: String,
}

#[derive(Debug, Deserialize)]
pub struct SchemaSearchRequest {
    pub question: String,
    /// Defaults to the configured search top-k
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct CandidateSummary {
    pub table: String,
    pub entity: String,
    pub description: String,
    pub column_count: usize,
    pub highlights: ColumnHighlights,
}

impl CandidateSummary {
    pub fn new(table: &TableDescriptor, highlights: ColumnHighlights) -> Self {
        Self {
            table: table.qualified_name(),
            entity: table.entity_label.clone(),
            description: table.description.clone(),
            column_count: table.columns.len(),
            highlights,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SchemaSearchResponse {
    pub question: String,
    pub candidates: Vec<CandidateSummary>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
