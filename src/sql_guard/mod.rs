pub mod allowlist;
pub mod errors;
pub mod validator;

pub use allowlist::{Allowlist, ALLOWLIST_CANDIDATES};
pub use errors::GuardError;
pub use validator::{check_allowlist, enforce_limit, extract_referenced_tables, is_safe, validate};
