pub mod client;
pub mod prompt;
pub mod requestor;

pub use client::{call_llm, LlmConfig, LlmProvider};
pub use prompt::PlanContext;
pub use requestor::{DisabledPlanRequestor, LlmPlanRequestor, PlanRequestor};
