use serde::Serialize;
use serde_json::Value;

use crate::executor::QueryOutput;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultMode {
    SqlResult,
    SchemaSummary,
    Error,
}

/// Engine state that produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeState {
    NoCandidates,
    PlanAndExecute,
    EmptyResultRepair,
    RuleBasedAggregation,
    RuleBasedWindowSum,
    SampleRows,
    DictionarySummary,
    ConnectionFailure,
}

impl CascadeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CascadeState::NoCandidates => "no_candidates",
            CascadeState::PlanAndExecute => "plan_and_execute",
            CascadeState::EmptyResultRepair => "empty_result_repair",
            CascadeState::RuleBasedAggregation => "rule_based_aggregation",
            CascadeState::RuleBasedWindowSum => "rule_based_window_sum",
            CascadeState::SampleRows => "sample_rows",
            CascadeState::DictionarySummary => "dictionary_summary",
            CascadeState::ConnectionFailure => "connection_failure",
        }
    }
}

impl std::fmt::Display for CascadeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What every question gets back, whatever happened on the way.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub sql: Option<String>,
    pub notes: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub row_count: usize,
    pub mode: ResultMode,
    pub state: CascadeState,
    /// `state: kind: message` for each failure the engine stepped past.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
}

impl QueryResult {
    pub fn from_output(
        state: CascadeState,
        sql: impl Into<String>,
        notes: impl Into<String>,
        output: QueryOutput,
    ) -> Self {
        Self {
            sql: Some(sql.into()),
            notes: notes.into(),
            row_count: output.rows.len(),
            columns: output.columns,
            rows: output.rows,
            mode: ResultMode::SqlResult,
            state,
            diagnostics: Vec::new(),
        }
    }

    /// Result without SQL or data.
    pub fn message(state: CascadeState, mode: ResultMode, notes: impl Into<String>) -> Self {
        Self {
            sql: None,
            notes: notes.into(),
            columns: Vec::new(),
            rows: Vec::new(),
            row_count: 0,
            mode,
            state,
            diagnostics: Vec::new(),
        }
    }

    pub fn with_state(mut self, state: CascadeState) -> Self {
        self.state = state;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Vec<String>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Plain-text rendering: notes, SQL and a pipe-separated table.
    pub fn render_text(&self, max_rows: usize) -> String {
        let mut out = String::new();
        if !self.notes.is_empty() {
            out.push_str(&self.notes);
            out.push_str("\n\n");
        }
        if let Some(sql) = &self.sql {
            out.push_str("SQL:\n");
            out.push_str(sql);
            out.push_str("\n\n");
        }
        if self.columns.is_empty() {
            return out.trim_end().to_string();
        }

        let shown = self.rows.len().min(max_rows);
        out.push_str(&format!("DATA (top {}):\n", shown));
        if self.rows.is_empty() {
            out.push_str("(empty result)");
            return out;
        }
        out.push_str(&self.columns.join(" | "));
        for row in self.rows.iter().take(max_rows) {
            out.push('\n');
            let cells: Vec<String> = row.iter().map(render_cell).collect();
            out.push_str(&cells.join(" | "));
        }
        out
    }
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
