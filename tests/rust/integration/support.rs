//! Scripted stand-ins for the LLM and ClickHouse used by the cascade tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};

use clickask::cascade::{CascadeSettings, TextToQuery};
use clickask::executor::{ExecutionError, QueryExecutor, QueryOutput, QueryParams};
use clickask::llm::{PlanContext, PlanRequestor};
use clickask::query_plan::{PlanError, QueryPlan};
use clickask::schema_catalog::{
    build_relationships, ColumnDescriptor, SchemaRegistry, TableDescriptor,
};

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
}

pub fn sales_catalog() -> Vec<TableDescriptor> {
    vec![
        TableDescriptor::new("DW", "Cluster_Main_Sales")
            .with_entity("Sales in BGF")
            .with_description("Daily sales detail per store and product")
            .with_column(ColumnDescriptor::new("SalesDate", "Date", "Historic date"))
            .with_column(ColumnDescriptor::new("StoreID", "String", "Store number"))
            .with_column(ColumnDescriptor::new("GDS_CD", "String", "Product Code (Item code)"))
            .with_column(ColumnDescriptor::new("SoldQty", "Int32", "Sold quantity"))
            .with_column(ColumnDescriptor::new("NetSale", "Decimal(18,2)", "Net sale"))
            .with_column(ColumnDescriptor::new("GrossSale", "Decimal(18,2)", "Gross sale")),
        TableDescriptor::new("DW", "Item_Master")
            .with_entity("Product")
            .with_description("Product list")
            .with_column(ColumnDescriptor::new("GDS_CD", "String", "Product Code (Item code)"))
            .with_column(ColumnDescriptor::new("GDS_NM", "String", "Product name")),
        TableDescriptor::new("HR", "Employee")
            .with_description("Staff directory")
            .with_column(ColumnDescriptor::new("EMP_ID", "String", "Employee id")),
    ]
}

/// Hands out queued plans and repairs in order, counting calls.
#[derive(Default)]
pub struct ScriptedRequestor {
    plans: Mutex<VecDeque<Result<QueryPlan, PlanError>>>,
    repairs: Mutex<VecDeque<Result<QueryPlan, PlanError>>>,
    pub plan_calls: Mutex<usize>,
    pub repair_calls: Mutex<Vec<String>>,
}

impl ScriptedRequestor {
    pub fn with_plan(self, plan: Result<QueryPlan, PlanError>) -> Self {
        self.plans.lock().unwrap().push_back(plan);
        self
    }

    pub fn with_repair(self, plan: Result<QueryPlan, PlanError>) -> Self {
        self.repairs.lock().unwrap().push_back(plan);
        self
    }

    pub fn failing() -> Self {
        Self::default().with_plan(Err(PlanError::Request("connection refused".to_string())))
    }
}

#[async_trait]
impl PlanRequestor for ScriptedRequestor {
    async fn plan(&self, _context: &PlanContext) -> Result<QueryPlan, PlanError> {
        *self.plan_calls.lock().unwrap() += 1;
        self.plans
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(PlanError::Request("no scripted plan".to_string())))
    }

    async fn repair(
        &self,
        _context: &PlanContext,
        _prior_plan: &QueryPlan,
        reason: &str,
    ) -> Result<QueryPlan, PlanError> {
        self.repair_calls.lock().unwrap().push(reason.to_string());
        self.repairs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(PlanError::Request("no scripted repair".to_string())))
    }
}

/// Replays queued responses and records every statement it receives.
/// Once the queue is drained every call gets `otherwise`.
pub struct RecordingExecutor {
    responses: Mutex<VecDeque<Result<QueryOutput, ExecutionError>>>,
    otherwise: Result<QueryOutput, ExecutionError>,
    pub calls: Mutex<Vec<(String, QueryParams)>>,
}

impl RecordingExecutor {
    pub fn new(otherwise: Result<QueryOutput, ExecutionError>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            otherwise,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn then(self, response: Result<QueryOutput, ExecutionError>) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    pub fn statements(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(sql, _)| sql.clone())
            .collect()
    }
}

#[async_trait]
impl QueryExecutor for RecordingExecutor {
    async fn execute(&self, sql: &str, params: &QueryParams) -> Result<QueryOutput, ExecutionError> {
        self.calls
            .lock()
            .unwrap()
            .push((sql.to_string(), params.clone()));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.otherwise.clone())
    }
}

/// Executor that never answers.
pub struct StalledExecutor;

#[async_trait]
impl QueryExecutor for StalledExecutor {
    async fn execute(&self, _sql: &str, _params: &QueryParams) -> Result<QueryOutput, ExecutionError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(QueryOutput::default())
    }
}

pub fn rows(columns: &[&str], rows: Vec<Vec<Value>>) -> QueryOutput {
    QueryOutput {
        columns: columns.iter().map(|c| c.to_string()).collect(),
        rows,
    }
}

pub fn one_row() -> QueryOutput {
    rows(&["value"], vec![vec![json!(1)]])
}

pub fn empty() -> QueryOutput {
    rows(&["value"], Vec::new())
}

pub fn settings() -> CascadeSettings {
    CascadeSettings {
        today: Some(today()),
        ..Default::default()
    }
}

pub fn engine(
    requestor: Arc<dyn PlanRequestor>,
    executor: Arc<dyn QueryExecutor>,
    settings: CascadeSettings,
) -> TextToQuery {
    engine_over(sales_catalog(), requestor, executor, settings)
}

pub fn engine_over(
    tables: Vec<TableDescriptor>,
    requestor: Arc<dyn PlanRequestor>,
    executor: Arc<dyn QueryExecutor>,
    settings: CascadeSettings,
) -> TextToQuery {
    let relationships = build_relationships(&tables);
    TextToQuery::new(
        Arc::new(SchemaRegistry::from_tables(tables)),
        Arc::new(relationships),
        requestor,
        executor,
        settings,
    )
}
