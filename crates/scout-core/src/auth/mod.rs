//! Credential lookup for backend services.
//!
//! Token acquisition (OAuth code exchange) and durable storage live outside
//! this crate; the connection manager only needs a current bearer
//! credential per service.

pub mod env;
pub mod error;
pub mod memory;

pub use env::EnvCredentialProvider;
pub use error::{AuthError, Result};
pub use memory::InMemoryCredentialProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ServiceId;

fn default_token_type() -> String {
    "Bearer".to_string()
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

impl AccessToken {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: default_token_type(),
        }
    }

    /// Value for the `Authorization` header.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .finish()
    }
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Current credential for the service, or `None` when the user has not
    /// authorized it.
    async fn get_token(&self, service: ServiceId) -> Result<Option<AccessToken>>;

    async fn is_authenticated(&self, service: ServiceId) -> bool {
        matches!(self.get_token(service).await, Ok(Some(_)))
    }
}
