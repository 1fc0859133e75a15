//! Backend search and cross-backend aggregation.

pub mod aggregator;
pub mod invoker;
pub mod result;
pub mod selector;

pub use aggregator::{AggregateSearch, SearchAggregator};
pub use invoker::{BackendInvoker, RESOURCE_FALLBACK_LIMIT};
pub use result::{SearchResult, deduplicate, sort_results};
pub use selector::{CapabilitySelector, ExactSelector, KeywordSelector};
