//! Tool registry, per-provider filters and schema validation

mod filter;
mod registry;
pub mod schema;

pub use filter::ToolFilter;
pub use registry::{RegistryError, RegistryResult, ToolRegistry};
pub use schema::SchemaViolation;
