use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator};
use strum_macros::{Display, EnumString};

/// Identifier for one configured backend knowledge service.
///
/// Every per-service structure (sessions, tool names, credentials, result
/// sources) is keyed by this value.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ServiceId {
    Notion,
    Atlassian,
}

impl ServiceId {
    /// Every known service, in declaration order.
    pub fn all() -> Vec<ServiceId> {
        ServiceId::iter().collect()
    }

    /// Human readable name, also used to build tool names.
    pub fn display_name(self) -> &'static str {
        match self {
            ServiceId::Notion => "Notion",
            ServiceId::Atlassian => "Atlassian",
        }
    }

    /// Environment variable holding the bearer token when no override is configured.
    pub fn default_token_env(self) -> String {
        format!("SCOUT_{}_TOKEN", self.to_string().to_uppercase())
    }

    pub fn default_config(self) -> ServiceConfig {
        match self {
            ServiceId::Notion => ServiceConfig {
                id: self,
                endpoint: "https://mcp.notion.com/mcp".to_string(),
                client_name: "Scout".to_string(),
                scope: "read".to_string(),
                token_env: None,
            },
            ServiceId::Atlassian => ServiceConfig {
                id: self,
                endpoint: "https://mcp.atlassian.com/v1/mcp".to_string(),
                client_name: "Scout".to_string(),
                scope: "read:confluence-content.all read:jira-work".to_string(),
                token_env: None,
            },
        }
    }
}

/// Static connection settings for one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub id: ServiceId,
    /// MCP endpoint URI.
    pub endpoint: String,
    /// Client display name presented to the backend.
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// Authorization scope requested when the token was issued.
    #[serde(default)]
    pub scope: String,
    /// Overrides the environment variable the bearer token is read from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
}

fn default_client_name() -> String {
    "Scout".to_string()
}

impl ServiceConfig {
    pub fn token_env(&self) -> String {
        self.token_env
            .clone()
            .unwrap_or_else(|| self.id.default_token_env())
    }
}
