use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ServiceId;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum McpError {
    #[error("{service} is not authenticated")]
    NotAuthenticated { service: ServiceId },

    #[error("Credential lookup for {service} failed: {message}")]
    Credential { service: ServiceId, message: String },

    #[error("Cannot connect to {service}: {message}")]
    ConnectionFailed { service: ServiceId, message: String },

    #[error("Timeout connecting to {service}")]
    ConnectTimeout { service: ServiceId },

    #[error("Connection attempt for {service} was abandoned: {message}")]
    AttemptAbandoned { service: ServiceId, message: String },

    #[error("Service {service} is not configured")]
    UnknownService { service: ServiceId },

    #[error("Failed to list capabilities: {message}")]
    ListCapabilitiesFailed { message: String },

    #[error("Timeout listing capabilities from {service}")]
    ListCapabilitiesTimeout { service: ServiceId },

    #[error("Capability '{name}' failed: {message}")]
    InvocationFailed { name: String, message: String },

    #[error("Capability '{name}' timed out")]
    InvocationTimeout { service: ServiceId, name: String },

    #[error("Failed to list resources: {message}")]
    ListResourcesFailed { message: String },

    #[error("Failed to close session: {message}")]
    CloseFailed { message: String },

    #[error("Session is closed")]
    Closed,
}
