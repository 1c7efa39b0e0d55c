pub mod compiler;
pub mod errors;
pub mod metric;
pub mod plan;

pub use compiler::{CompiledQuery, CompilerSettings, PlanCompiler};
pub use errors::PlanError;
pub use metric::Metric;
pub use plan::{Direction, JoinType, OrderItem, PlanJoin, QueryPlan, SelectItem};
