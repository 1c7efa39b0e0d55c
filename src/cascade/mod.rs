pub mod engine;
pub mod errors;
pub mod metrics;
pub mod result;
pub mod rules;

pub use engine::{CascadeSettings, StepOutcome, TextToQuery};
pub use errors::CascadeError;
pub use result::{CascadeState, QueryResult, ResultMode};
