//! The text-to-query engine and its fallback state machine.
//!
//! States are tried in a fixed order and each one either produces the final
//! [`QueryResult`] or hands over to the next:
//!
//! ```text
//! search ─┬─ no candidates ──────────────────────────────► NoCandidates
//!         └─ PlanAndExecute ─┬─ rows ────────────────────► done
//!                            ├─ zero rows ─► EmptyResultRepair (once) ─► done
//!                            └─ failure ─┬─ store code ─► RuleBasedAggregation ─┐
//!                                        └─ otherwise ──► RuleBasedWindowSum ───┤
//!                                                                               ▼
//!                             SampleRows ─► DictionarySummary | ConnectionFailure
//! ```
//!
//! Literal values taken from the question (store code, dates) are only ever
//! passed as server-side parameters. Identifiers come from the candidate
//! tables' own column lists.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDate};
use log::{debug, info, warn};
use tokio::time::timeout;
use uuid::Uuid;

use super::errors::CascadeError;
use super::metrics::CascadeMetrics;
use super::result::{CascadeState, QueryResult, ResultMode};
use super::rules::{RuleInputs, DATE_COLUMNS, STORE_COLUMNS};
use crate::executor::{QueryExecutor, QueryOutput, QueryParams};
use crate::llm::{PlanContext, PlanRequestor};
use crate::query_plan::{CompilerSettings, PlanCompiler, QueryPlan};
use crate::schema_catalog::{Relationships, SchemaRegistry, TableDescriptor};
use crate::sql_guard::{self, Allowlist};
use crate::utils::redact::redact_secrets;

#[derive(Debug, Clone)]
pub struct CascadeSettings {
    pub search_top_k: usize,
    /// Hard ceiling on rows returned by any statement.
    pub max_rows: u32,
    /// Candidates tried by the rule-based and sample states.
    pub rule_candidates: usize,
    pub sample_rows: u32,
    pub summary_tables: usize,
    pub summary_columns: usize,
    /// Extra tables tried by the sample state after the candidates.
    pub fallback_tables: Vec<String>,
    pub llm_timeout: Duration,
    pub query_timeout: Duration,
    pub compiler: CompilerSettings,
    /// Pins "today" for the rule-based date window; local date when unset.
    pub today: Option<NaiveDate>,
}

impl Default for CascadeSettings {
    fn default() -> Self {
        Self {
            search_top_k: 8,
            max_rows: 200,
            rule_candidates: 5,
            sample_rows: 20,
            summary_tables: 3,
            summary_columns: 20,
            fallback_tables: Vec::new(),
            llm_timeout: Duration::from_secs(60),
            query_timeout: Duration::from_secs(30),
            compiler: CompilerSettings::default(),
            today: None,
        }
    }
}

/// Result of running one state.
#[derive(Debug)]
pub enum StepOutcome {
    Done(QueryResult),
    Empty(QueryResult),
    Failed(CascadeError),
}

/// Everything scoped to one question.
struct Request<'a> {
    id: String,
    question: &'a str,
    candidates: Vec<&'a TableDescriptor>,
    allowlist: Allowlist,
    context: PlanContext,
    metrics: CascadeMetrics,
    diagnostics: Vec<String>,
    fallback_executions: usize,
    fallback_connection_errors: Vec<CascadeError>,
}

impl Request<'_> {
    fn record(&mut self, state: CascadeState, error: &CascadeError) {
        let line = format!(
            "{}: {}: {}",
            state,
            error.kind(),
            redact_secrets(&error.to_string())
        );
        warn!("[{}] {}", self.id, line);
        self.diagnostics.push(line);
    }
}

pub struct TextToQuery {
    registry: Arc<SchemaRegistry>,
    relationships: Arc<Relationships>,
    requestor: Arc<dyn PlanRequestor>,
    executor: Arc<dyn QueryExecutor>,
    compiler: PlanCompiler,
    settings: CascadeSettings,
}

impl TextToQuery {
    pub fn new(
        registry: Arc<SchemaRegistry>,
        relationships: Arc<Relationships>,
        requestor: Arc<dyn PlanRequestor>,
        executor: Arc<dyn QueryExecutor>,
        settings: CascadeSettings,
    ) -> Self {
        let mut compiler_settings = settings.compiler.clone();
        compiler_settings.hard_ceiling = compiler_settings.hard_ceiling.min(settings.max_rows);
        Self {
            registry,
            relationships,
            requestor,
            executor,
            compiler: PlanCompiler::new(compiler_settings),
            settings,
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &CascadeSettings {
        &self.settings
    }

    /// Answer a question. Never fails: the worst case is a summary or a
    /// diagnostic result.
    pub async fn answer(&self, question: &str) -> QueryResult {
        let started = Instant::now();
        let question = question.trim();
        let id = Uuid::new_v4().to_string();
        info!("[{}] Question received ({} chars)", id, question.chars().count());

        let search_started = Instant::now();
        let candidates = self.registry.search(question, self.settings.search_top_k);
        let search_time = search_started.elapsed().as_secs_f64();

        if candidates.is_empty() {
            info!("[{}] No candidate tables", id);
            let result = QueryResult::message(
                CascadeState::NoCandidates,
                ResultMode::SchemaSummary,
                format!(
                    "{}. Mention a table or column name (StoreID, SalesDate, NetSale, ...) and ask again.",
                    CascadeError::NoCandidates
                ),
            );
            let metrics = CascadeMetrics {
                total_time: started.elapsed().as_secs_f64(),
                search_time,
                result_rows: Some(0),
                ..Default::default()
            };
            metrics.log_performance(&id, result.state, question);
            return result;
        }

        debug!(
            "[{}] Candidates: {}",
            id,
            candidates
                .iter()
                .map(|t| t.qualified_name())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let mut request = Request {
            allowlist: Allowlist::from_candidates(&candidates),
            context: PlanContext::build(question, &self.registry, &candidates, &self.relationships),
            id,
            question,
            candidates,
            metrics: CascadeMetrics {
                search_time,
                ..Default::default()
            },
            diagnostics: Vec::new(),
            fallback_executions: 0,
            fallback_connection_errors: Vec::new(),
        };

        let result = self.run(&mut request).await;
        let result = result.with_diagnostics(std::mem::take(&mut request.diagnostics));

        request.metrics.total_time = started.elapsed().as_secs_f64();
        request.metrics.result_rows = Some(result.row_count);
        request
            .metrics
            .log_performance(&request.id, result.state, question);
        result
    }

    async fn run(&self, req: &mut Request<'_>) -> QueryResult {
        let (outcome, plan) = self.plan_and_execute(req).await;
        let plan_error = match outcome {
            StepOutcome::Done(result) => return result,
            StepOutcome::Empty(empty) => {
                info!("[{}] Plan returned no rows; requesting one repair", req.id);
                let prior = plan.unwrap_or_default();
                return match self.repair(req, &prior).await {
                    StepOutcome::Done(result) => result,
                    StepOutcome::Empty(_) => {
                        info!("[{}] Repaired plan also returned no rows", req.id);
                        empty.with_state(CascadeState::EmptyResultRepair)
                    }
                    StepOutcome::Failed(e) => {
                        req.record(CascadeState::EmptyResultRepair, &e);
                        empty.with_state(CascadeState::EmptyResultRepair)
                    }
                };
            }
            StepOutcome::Failed(e) => {
                req.record(CascadeState::PlanAndExecute, &e);
                e
            }
        };

        let inputs = RuleInputs::extract(req.question, self.today());
        // Failed attempts were recorded one by one inside the fallback states.
        if let Some(store) = &inputs.store {
            match self.rule_aggregation(req, &inputs, store, &plan_error).await {
                StepOutcome::Done(result) => return result,
                StepOutcome::Empty(_) => debug!("[{}] rule_based_aggregation found no rows", req.id),
                StepOutcome::Failed(e) => debug!("[{}] rule_based_aggregation gave up: {}", req.id, e),
            }
        }

        match self.rule_window_sum(req, &inputs, &plan_error).await {
            StepOutcome::Done(result) => return result,
            StepOutcome::Empty(_) => debug!("[{}] rule_based_window_sum found no rows", req.id),
            StepOutcome::Failed(e) => debug!("[{}] rule_based_window_sum gave up: {}", req.id, e),
        }

        match self.sample_rows(req, &plan_error).await {
            StepOutcome::Done(result) => return result,
            StepOutcome::Empty(_) => debug!("[{}] sample_rows found no rows", req.id),
            StepOutcome::Failed(e) => debug!("[{}] sample_rows gave up: {}", req.id, e),
        }

        let unreachable = req.fallback_executions > 0
            && req.fallback_connection_errors.len() == req.fallback_executions;
        if unreachable {
            self.connection_failure(req, &plan_error)
        } else {
            self.dictionary_summary(req)
        }
    }

    fn today(&self) -> NaiveDate {
        self.settings
            .today
            .unwrap_or_else(|| Local::now().date_naive())
    }

    // ── state 2 / 3 ──

    async fn plan_and_execute(&self, req: &mut Request<'_>) -> (StepOutcome, Option<QueryPlan>) {
        req.metrics.llm_calls += 1;
        let started = Instant::now();
        let requested = timeout(self.settings.llm_timeout, self.requestor.plan(&req.context)).await;
        req.metrics.planning_time += started.elapsed().as_secs_f64();

        let plan = match self.flatten_llm(requested) {
            Ok(plan) => plan,
            Err(e) => return (StepOutcome::Failed(e), None),
        };
        let outcome = self
            .execute_plan(req, &plan, CascadeState::PlanAndExecute)
            .await;
        (outcome, Some(plan))
    }

    async fn repair(&self, req: &mut Request<'_>, prior: &QueryPlan) -> StepOutcome {
        req.metrics.llm_calls += 1;
        let started = Instant::now();
        let requested = timeout(
            self.settings.llm_timeout,
            self.requestor.repair(&req.context, prior, "empty_result"),
        )
        .await;
        req.metrics.planning_time += started.elapsed().as_secs_f64();

        match self.flatten_llm(requested) {
            Ok(plan) => {
                self.execute_plan(req, &plan, CascadeState::EmptyResultRepair)
                    .await
            }
            Err(e) => StepOutcome::Failed(e),
        }
    }

    fn flatten_llm<T>(
        &self,
        requested: Result<Result<T, crate::query_plan::PlanError>, tokio::time::error::Elapsed>,
    ) -> Result<T, CascadeError> {
        match requested {
            Ok(inner) => inner.map_err(CascadeError::from),
            Err(_) => Err(CascadeError::Timeout {
                operation: "plan request",
                seconds: self.settings.llm_timeout.as_secs(),
            }),
        }
    }

    async fn execute_plan(
        &self,
        req: &mut Request<'_>,
        plan: &QueryPlan,
        state: CascadeState,
    ) -> StepOutcome {
        let compiled = self
            .compiler
            .compile(plan, &req.allowlist, &req.candidates, req.question);
        let sql = match sql_guard::validate(&compiled.sql, &req.allowlist, self.settings.max_rows) {
            Ok(sql) => sql,
            Err(e) => return StepOutcome::Failed(e.into()),
        };
        debug!("[{}] {} SQL:\n{}", req.id, state, sql);

        match self.execute(req, &sql, &QueryParams::new()).await {
            Ok(output) => {
                let result = QueryResult::from_output(state, sql, compiled.notes, output);
                if result.row_count == 0 {
                    StepOutcome::Empty(result)
                } else {
                    info!("[{}] {} returned {} rows", req.id, state, result.row_count);
                    StepOutcome::Done(result)
                }
            }
            Err(e) => StepOutcome::Failed(e),
        }
    }

    async fn execute(
        &self,
        req: &mut Request<'_>,
        sql: &str,
        params: &QueryParams,
    ) -> Result<QueryOutput, CascadeError> {
        req.metrics.executions += 1;
        let started = Instant::now();
        let executed = timeout(self.settings.query_timeout, self.executor.execute(sql, params)).await;
        req.metrics.execution_time += started.elapsed().as_secs_f64();
        match executed {
            Ok(output) => output.map_err(CascadeError::from),
            Err(_) => Err(CascadeError::Timeout {
                operation: "query",
                seconds: self.settings.query_timeout.as_secs(),
            }),
        }
    }

    /// Validate and run a statement for one of the fallback states, keeping
    /// count of attempts that never reached the store.
    async fn execute_fallback(
        &self,
        req: &mut Request<'_>,
        allowlist: &Allowlist,
        sql: &str,
        params: &QueryParams,
    ) -> Result<(String, QueryOutput), CascadeError> {
        let sql = sql_guard::validate(sql, allowlist, self.settings.max_rows)?;
        req.fallback_executions += 1;
        match self.execute(req, &sql, params).await {
            Ok(output) => Ok((sql, output)),
            Err(e) => {
                if e.is_connection() {
                    req.fallback_connection_errors.push(e.clone());
                }
                Err(e)
            }
        }
    }

    // ── states 4 / 5 / 6 ──

    async fn rule_aggregation(
        &self,
        req: &mut Request<'_>,
        inputs: &RuleInputs,
        store: &str,
        plan_error: &CascadeError,
    ) -> StepOutcome {
        let state = CascadeState::RuleBasedAggregation;
        let metric_columns = inputs.metric_columns();
        let tables: Vec<&TableDescriptor> = req
            .candidates
            .iter()
            .take(self.settings.rule_candidates)
            .copied()
            .collect();

        let mut params = QueryParams::new();
        params.insert("store".to_string(), store.to_string());
        params.insert("start".to_string(), inputs.start.to_string());
        params.insert("end".to_string(), inputs.end.to_string());

        let allowlist = req.allowlist.clone();
        let mut last = None;
        for table in tables {
            let (Some(date_col), Some(store_col), Some(metric_col)) = (
                table.pick_first_existing(DATE_COLUMNS.iter().copied()),
                table.pick_first_existing(STORE_COLUMNS.iter().copied()),
                table.pick_first_existing(metric_columns.iter().copied()),
            ) else {
                continue;
            };
            let sql = format!(
                "SELECT\n    {date} AS day,\n    sum({metric}) AS value\nFROM {table}\n\
                 WHERE {store_col} = {{store:String}}\n  AND {date} >= {{start:Date}}\n  AND {date} <= {{end:Date}}\n\
                 GROUP BY day\nORDER BY day DESC\nLIMIT {limit}",
                date = date_col,
                metric = metric_col,
                table = table.qualified_name(),
                store_col = store_col,
                limit = self.settings.max_rows,
            );
            match self.execute_fallback(req, &allowlist, &sql, &params).await {
                Ok((sql, output)) if !output.is_empty() => {
                    let notes = format!(
                        "Fallback ({}) after {}: sum of {} per day for store {}, {} to {}",
                        state,
                        plan_error.kind(),
                        metric_col,
                        store,
                        inputs.start,
                        inputs.end
                    );
                    return StepOutcome::Done(QueryResult::from_output(state, sql, notes, output));
                }
                Ok((sql, output)) => {
                    last = Some(StepOutcome::Empty(QueryResult::from_output(
                        state,
                        sql,
                        String::new(),
                        output,
                    )))
                }
                Err(e) => {
                    req.record(state, &e);
                    last = Some(StepOutcome::Failed(e));
                }
            }
        }
        last.unwrap_or_else(|| not_applicable("no candidate has date, store and metric columns"))
    }

    async fn rule_window_sum(
        &self,
        req: &mut Request<'_>,
        inputs: &RuleInputs,
        plan_error: &CascadeError,
    ) -> StepOutcome {
        let state = CascadeState::RuleBasedWindowSum;
        let metric_columns = inputs.metric_columns();
        let tables: Vec<&TableDescriptor> = req
            .candidates
            .iter()
            .take(self.settings.rule_candidates)
            .copied()
            .collect();

        let mut params = QueryParams::new();
        params.insert("start".to_string(), inputs.start.to_string());
        params.insert("end".to_string(), inputs.end.to_string());

        let allowlist = req.allowlist.clone();
        let mut last = None;
        for table in tables {
            let (Some(date_col), Some(metric_col)) = (
                table.pick_first_existing(DATE_COLUMNS.iter().copied()),
                table.pick_first_existing(metric_columns.iter().copied()),
            ) else {
                continue;
            };
            let sql = format!(
                "SELECT\n    sum({metric}) AS value\nFROM {table}\n\
                 WHERE {date} >= {{start:Date}}\n  AND {date} <= {{end:Date}}\nLIMIT 1",
                date = date_col,
                metric = metric_col,
                table = table.qualified_name(),
            );
            match self.execute_fallback(req, &allowlist, &sql, &params).await {
                Ok((sql, output)) if !output.is_empty() => {
                    let notes = format!(
                        "Fallback ({}) after {}: total {} from {} to {}",
                        state,
                        plan_error.kind(),
                        metric_col,
                        inputs.start,
                        inputs.end
                    );
                    return StepOutcome::Done(QueryResult::from_output(state, sql, notes, output));
                }
                Ok((sql, output)) => {
                    last = Some(StepOutcome::Empty(QueryResult::from_output(
                        state,
                        sql,
                        String::new(),
                        output,
                    )))
                }
                Err(e) => {
                    req.record(state, &e);
                    last = Some(StepOutcome::Failed(e));
                }
            }
        }
        last.unwrap_or_else(|| not_applicable("no candidate has date and metric columns"))
    }

    async fn sample_rows(&self, req: &mut Request<'_>, plan_error: &CascadeError) -> StepOutcome {
        let state = CascadeState::SampleRows;
        let mut allowlist = req.allowlist.clone();
        let mut tables: Vec<String> = req
            .candidates
            .iter()
            .take(self.settings.rule_candidates)
            .map(|t| t.qualified_name())
            .collect();
        for name in &self.settings.fallback_tables {
            allowlist.insert_name(name);
            let name = name.trim();
            if !name.is_empty() && !tables.iter().any(|t| t.eq_ignore_ascii_case(name)) {
                tables.push(name.to_string());
            }
        }

        let mut last = None;
        for table in tables {
            let sql = format!("SELECT * FROM {} LIMIT {}", table, self.settings.sample_rows);
            match self
                .execute_fallback(req, &allowlist, &sql, &QueryParams::new())
                .await
            {
                Ok((sql, output)) if !output.is_empty() => {
                    let notes = format!(
                        "Fallback ({}) after {}: sample rows from {}",
                        state,
                        plan_error.kind(),
                        table
                    );
                    return StepOutcome::Done(QueryResult::from_output(state, sql, notes, output));
                }
                Ok((sql, output)) => {
                    last = Some(StepOutcome::Empty(QueryResult::from_output(
                        state,
                        sql,
                        String::new(),
                        output,
                    )))
                }
                Err(e) => {
                    req.record(state, &e);
                    last = Some(StepOutcome::Failed(e));
                }
            }
        }
        last.unwrap_or_else(|| not_applicable("no table to sample"))
    }

    // ── states 7 / 8 ──

    fn dictionary_summary(&self, req: &Request<'_>) -> QueryResult {
        info!("[{}] Answering with a dictionary summary", req.id);
        let rows: Vec<Vec<serde_json::Value>> = req
            .candidates
            .iter()
            .take(self.settings.summary_tables)
            .map(|t| {
                let columns: Vec<&str> = t
                    .columns
                    .iter()
                    .take(self.settings.summary_columns)
                    .map(|c| c.name.as_str())
                    .collect();
                vec![
                    t.qualified_name().into(),
                    t.description.clone().into(),
                    columns.join(", ").into(),
                ]
            })
            .collect();
        QueryResult {
            sql: None,
            notes: "Could not run a query or no rows were found. Closest tables in the dictionary:"
                .to_string(),
            columns: vec![
                "table".to_string(),
                "description".to_string(),
                "columns".to_string(),
            ],
            row_count: rows.len(),
            rows,
            mode: ResultMode::SchemaSummary,
            state: CascadeState::DictionarySummary,
            diagnostics: Vec::new(),
        }
    }

    fn connection_failure(&self, req: &Request<'_>, plan_error: &CascadeError) -> QueryResult {
        let connection_error = req
            .fallback_connection_errors
            .last()
            .map(|e| e.to_string())
            .unwrap_or_default();
        let tables: Vec<String> = req
            .candidates
            .iter()
            .take(self.settings.summary_tables)
            .map(|t| t.qualified_name())
            .collect();
        let notes = redact_secrets(&format!(
            "ClickHouse is unreachable.\nPlanning error: {}\nConnection error: {}\nTop matches: {}",
            plan_error,
            connection_error,
            tables.join(", ")
        ));
        log::error!("[{}] {}", req.id, notes);
        QueryResult::message(CascadeState::ConnectionFailure, ResultMode::Error, notes)
    }
}

fn not_applicable(reason: &str) -> StepOutcome {
    StepOutcome::Failed(CascadeError::NotApplicable(reason.to_string()))
}
