use thiserror::Error;

use crate::config::ServiceId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Invalid token for {service}: {message}")]
    InvalidToken { service: ServiceId, message: String },
}

pub type Result<T> = std::result::Result<T, AuthError>;
