pub mod errors;
pub mod join_hints;
pub mod loader;
pub mod registry;
pub mod relationships;
pub mod types;

// Re-export commonly used types
pub use errors::CatalogError;
pub use join_hints::{build_join_hints, JoinHint};
pub use registry::{ColumnHighlights, SchemaRegistry};
pub use relationships::{build_relationships, ColumnRef, RelationshipEdge, Relationships};
pub use types::{ColumnDescriptor, TableDescriptor, TableKey};
