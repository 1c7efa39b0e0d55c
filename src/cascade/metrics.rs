use super::result::CascadeState;

/// Per-question timing, logged once the engine has produced a result.
#[derive(Debug, Clone, Default)]
pub struct CascadeMetrics {
    pub total_time: f64,
    pub search_time: f64,
    pub planning_time: f64,
    pub execution_time: f64,
    pub llm_calls: usize,
    pub executions: usize,
    pub result_rows: Option<usize>,
}

impl CascadeMetrics {
    pub fn log_performance(&self, request_id: &str, state: CascadeState, question: &str) {
        log::info!(
            "[{}] Cascade performance - Total: {:.3}ms, Search: {:.3}ms, Planning: {:.3}ms, Exec: {:.3}ms, LLM calls: {}, Executions: {}, State: {}, Rows: {}",
            request_id,
            self.total_time * 1000.0,
            self.search_time * 1000.0,
            self.planning_time * 1000.0,
            self.execution_time * 1000.0,
            self.llm_calls,
            self.executions,
            state,
            self.result_rows
                .map_or("N/A".to_string(), |r| r.to_string())
        );

        if log::log_enabled!(log::Level::Debug) {
            log::debug!(
                "[{}] Performance breakdown for question: {}",
                request_id,
                question.chars().take(100).collect::<String>()
            );
        }
    }
}
