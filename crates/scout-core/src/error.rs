use thiserror::Error;

use crate::api::ApiError;
use crate::app::conversation::ConversationId;
use crate::config::ServiceId;
use crate::mcp::McpError;
use crate::utils::BranchFailure;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{service} is not authenticated")]
    NotAuthenticated { service: ServiceId },

    #[error("Cannot connect to {service}: {message}")]
    Connection { service: ServiceId, message: String },

    #[error("{service} capability invocation failed: {message}")]
    CapabilityInvocation { service: ServiceId, message: String },

    #[error("Conversation not found: {0}")]
    ConversationNotFound(ConversationId),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Aggregate search unavailable: {0}")]
    AggregateUnavailable(String),

    #[error(transparent)]
    Api(ApiError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Cancelled")]
    Cancelled,
}

impl Error {
    /// Tag a protocol-level failure with the service it came from.
    pub fn backend(service: ServiceId, err: McpError) -> Self {
        match err {
            McpError::NotAuthenticated { .. } => Error::NotAuthenticated { service },
            McpError::Credential { message, .. }
            | McpError::ConnectionFailed { message, .. }
            | McpError::AttemptAbandoned { message, .. } => {
                Error::Connection { service, message }
            }
            McpError::ConnectTimeout { .. } => Error::Connection {
                service,
                message: "connection timed out".to_string(),
            },
            McpError::UnknownService { .. } => Error::Connection {
                service,
                message: "service is not configured".to_string(),
            },
            McpError::ListCapabilitiesFailed { .. }
            | McpError::ListCapabilitiesTimeout { .. }
            | McpError::InvocationFailed { .. }
            | McpError::InvocationTimeout { .. }
            | McpError::ListResourcesFailed { .. }
            | McpError::CloseFailed { .. }
            | McpError::Closed => Error::CapabilityInvocation {
                service,
                message: err.to_string(),
            },
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    /// The service an error originated from, when there is one.
    pub fn service(&self) -> Option<ServiceId> {
        match self {
            Error::NotAuthenticated { service }
            | Error::Connection { service, .. }
            | Error::CapabilityInvocation { service, .. } => Some(*service),
            _ => None,
        }
    }
}

impl From<ApiError> for Error {
    fn from(err: ApiError) -> Self {
        if err.is_cancelled() {
            Error::Cancelled
        } else {
            Error::Api(err)
        }
    }
}

impl From<BranchFailure> for Error {
    fn from(failure: BranchFailure) -> Self {
        match failure {
            BranchFailure::Cancelled => Error::Cancelled,
            BranchFailure::Panicked(message) => Error::Internal(message),
        }
    }
}
