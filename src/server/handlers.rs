use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use super::models::{
    CandidateSummary, ErrorResponse, QueryRequest, SchemaSearchRequest, SchemaSearchResponse,
};
use super::AppState;
use crate::cascade::QueryResult;

type HandlerError = (StatusCode, Json<ErrorResponse>);

fn bad_request(message: String) -> HandlerError {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: message }))
}

/// Reject blank or over-long questions before they reach the engine.
fn checked_question(question: &str, max_chars: usize) -> Result<&str, HandlerError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(bad_request("question is empty".to_string()));
    }
    let chars = question.chars().count();
    if chars > max_chars {
        return Err(bad_request(format!(
            "question is {} characters, limit is {}",
            chars, max_chars
        )));
    }
    Ok(question)
}

pub async fn health_check(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "clickask",
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "tables": app_state.engine.registry().len(),
    }))
}

pub async fn query_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<QueryRequest>,
) -> Result<Json<QueryResult>, HandlerError> {
    let question = checked_question(&payload.question, app_state.config.max_input_chars)?;
    Ok(Json(app_state.engine.answer(question).await))
}

pub async fn schema_search_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<SchemaSearchRequest>,
) -> Result<Json<SchemaSearchResponse>, HandlerError> {
    let question = checked_question(&payload.question, app_state.config.max_input_chars)?;
    let top_k = payload
        .top_k
        .unwrap_or(app_state.config.search_top_k)
        .clamp(1, 50);

    let registry = app_state.engine.registry();
    let candidates = registry
        .search(question, top_k)
        .into_iter()
        .map(|t| CandidateSummary::new(t, registry.highlights(t)))
        .collect();
    Ok(Json(SchemaSearchResponse {
        question: question.to_string(),
        candidates,
    }))
}
