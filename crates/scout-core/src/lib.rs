// Core scout functionality without CLI dependencies

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod mcp;
pub mod search;
pub mod service;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod utils;

pub use error::{Error, Result};
pub use service::{ScoutService, ServiceStatus};
