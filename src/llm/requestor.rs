use async_trait::async_trait;
use reqwest::Client;

use super::client::{call_llm, LlmConfig};
use super::prompt::{PlanContext, PLAN_SYSTEM_PROMPT, REPAIR_SYSTEM_PROMPT};
use crate::query_plan::{PlanError, QueryPlan};

/// Source of structured query plans.
///
/// The engine only depends on this trait, so tests can script plans without
/// a model behind them.
#[async_trait]
pub trait PlanRequestor: Send + Sync {
    async fn plan(&self, context: &PlanContext) -> Result<QueryPlan, PlanError>;

    /// Revise `prior_plan` after it failed for `reason` (e.g. `"empty_result"`).
    async fn repair(
        &self,
        context: &PlanContext,
        prior_plan: &QueryPlan,
        reason: &str,
    ) -> Result<QueryPlan, PlanError>;
}

pub struct LlmPlanRequestor {
    client: Client,
    config: LlmConfig,
}

impl LlmPlanRequestor {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn with_client(client: Client, config: LlmConfig) -> Self {
        Self { client, config }
    }

    async fn ask(&self, system_prompt: &str, user_prompt: &str) -> Result<QueryPlan, PlanError> {
        let text = call_llm(&self.client, &self.config, system_prompt, user_prompt).await?;
        log::debug!("LLM plan response: {}", text);
        QueryPlan::from_llm_text(&text)
    }
}

#[async_trait]
impl PlanRequestor for LlmPlanRequestor {
    async fn plan(&self, context: &PlanContext) -> Result<QueryPlan, PlanError> {
        self.ask(PLAN_SYSTEM_PROMPT, &context.plan_prompt()).await
    }

    async fn repair(
        &self,
        context: &PlanContext,
        prior_plan: &QueryPlan,
        reason: &str,
    ) -> Result<QueryPlan, PlanError> {
        self.ask(REPAIR_SYSTEM_PROMPT, &context.repair_prompt(prior_plan, reason))
            .await
    }
}

/// Requestor used when no LLM is configured; every request fails so the
/// engine goes straight to its rule-based states.
pub struct DisabledPlanRequestor;

#[async_trait]
impl PlanRequestor for DisabledPlanRequestor {
    async fn plan(&self, _context: &PlanContext) -> Result<QueryPlan, PlanError> {
        Err(PlanError::Request("no LLM configured".to_string()))
    }

    async fn repair(
        &self,
        _context: &PlanContext,
        _prior_plan: &QueryPlan,
        _reason: &str,
    ) -> Result<QueryPlan, PlanError> {
        Err(PlanError::Request("no LLM configured".to_string()))
    }
}
