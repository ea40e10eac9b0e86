//! Gateway tool implementations.
//!
//! Safety layer:
//! - `classifier`: statement kind from the leading keyword
//! - `guard`: keyword blocklist and the combined safety policy
//! - `rate_limit`: per-caller call budget
//! - `confirmation`: two-phase gate for mutating statements
//!
//! Tool handlers (`query`, `schema`, `write`) render through `format`, and
//! `facade` ties them together.

pub mod classifier;
pub mod confirmation;
pub mod facade;
pub mod format;
pub mod guard;
pub mod query;
pub mod rate_limit;
pub mod schema;
pub mod write;

pub use classifier::QueryClassifier;
pub use confirmation::{ConfirmationGate, ConfirmationRequest};
pub use facade::{GatewayTools, TOOL_CATALOG, ToolDescriptor};
pub use format::ResultFormatter;
pub use guard::{KeywordFilter, SafetyPolicy};
pub use query::{SampleDataInput, SelectQueryInput};
pub use rate_limit::RateLimiter;
pub use schema::{DescribeTableInput, ListSchemasInput, ListTablesInput};
pub use write::WriteQueryInput;
