use async_trait::async_trait;
use std::collections::HashMap;
use std::env::VarError;

use super::{AccessToken, AuthError, CredentialProvider, Result};
use crate::config::{ServiceConfig, ServiceId};

/// Reads bearer tokens from environment variables, one per service.
#[derive(Debug, Clone)]
pub struct EnvCredentialProvider {
    variables: HashMap<ServiceId, String>,
}

impl EnvCredentialProvider {
    pub fn from_services(services: &[ServiceConfig]) -> Self {
        Self {
            variables: services.iter().map(|s| (s.id, s.token_env())).collect(),
        }
    }

    pub fn variable(&self, service: ServiceId) -> Option<&str> {
        self.variables.get(&service).map(String::as_str)
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn get_token(&self, service: ServiceId) -> Result<Option<AccessToken>> {
        let Some(variable) = self.variables.get(&service) else {
            return Ok(None);
        };

        match std::env::var(variable) {
            Ok(value) => parse_token(service, &value),
            Err(VarError::NotPresent) => Ok(None),
            Err(VarError::NotUnicode(_)) => Err(AuthError::InvalidToken {
                service,
                message: format!("{variable} is not valid unicode"),
            }),
        }
    }
}

/// A blank value means unauthenticated. Anything that cannot travel in an
/// `Authorization` header is rejected up front.
fn parse_token(service: ServiceId, value: &str) -> Result<Option<AccessToken>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    if let Some(bad) = value.chars().find(|c| !(' '..='~').contains(c)) {
        return Err(AuthError::InvalidToken {
            service,
            message: format!("token contains unsupported character {bad:?}"),
        });
    }
    Ok(Some(AccessToken::bearer(value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_or_blank_variable_means_unauthenticated() {
        let mut config = ServiceId::Notion.default_config();
        config.token_env = Some("SCOUT_TEST_TOKEN_THAT_IS_NEVER_SET".to_string());
        let provider = EnvCredentialProvider::from_services(&[config]);

        assert_eq!(
            provider.variable(ServiceId::Notion),
            Some("SCOUT_TEST_TOKEN_THAT_IS_NEVER_SET")
        );
        assert!(provider.get_token(ServiceId::Notion).await.unwrap().is_none());
        assert!(!provider.is_authenticated(ServiceId::Atlassian).await);
    }

    #[test]
    fn token_values_are_trimmed() {
        let token = parse_token(ServiceId::Notion, "  secret-token\n").unwrap();
        assert_eq!(token, Some(AccessToken::bearer("secret-token")));
        assert_eq!(parse_token(ServiceId::Notion, "   ").unwrap(), None);
    }

    #[test]
    fn header_unsafe_token_is_rejected() {
        let err = parse_token(ServiceId::Atlassian, "abc\ndef").unwrap_err();
        assert!(matches!(
            err,
            AuthError::InvalidToken { service: ServiceId::Atlassian, .. }
        ));
    }
}
