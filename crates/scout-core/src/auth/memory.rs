use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{AccessToken, CredentialProvider, Result};
use crate::config::ServiceId;

/// Credentials held in memory, for embedders that manage tokens themselves
/// and for tests.
#[derive(Debug, Default)]
pub struct InMemoryCredentialProvider {
    tokens: RwLock<HashMap<ServiceId, AccessToken>>,
}

impl InMemoryCredentialProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, service: ServiceId, token: AccessToken) -> Self {
        self.tokens.get_mut().insert(service, token);
        self
    }

    pub async fn set_token(&self, service: ServiceId, token: AccessToken) {
        self.tokens.write().await.insert(service, token);
    }

    pub async fn remove_token(&self, service: ServiceId) -> Option<AccessToken> {
        self.tokens.write().await.remove(&service)
    }
}

#[async_trait]
impl CredentialProvider for InMemoryCredentialProvider {
    async fn get_token(&self, service: ServiceId) -> Result<Option<AccessToken>> {
        Ok(self.tokens.read().await.get(&service).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_and_remove_tokens() {
        let provider = InMemoryCredentialProvider::new()
            .with_token(ServiceId::Notion, AccessToken::bearer("n"));

        assert!(provider.is_authenticated(ServiceId::Notion).await);
        assert!(!provider.is_authenticated(ServiceId::Atlassian).await);

        provider
            .set_token(ServiceId::Atlassian, AccessToken::bearer("a"))
            .await;
        assert!(provider.is_authenticated(ServiceId::Atlassian).await);

        provider.remove_token(ServiceId::Notion).await;
        assert!(provider.get_token(ServiceId::Notion).await.unwrap().is_none());
    }
}
