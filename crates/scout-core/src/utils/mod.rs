pub mod fanout;
pub mod paths;
pub mod tracing;

pub use fanout::{BranchFailure, join_settled};
