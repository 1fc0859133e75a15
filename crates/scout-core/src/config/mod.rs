pub mod service;

pub use service::{ServiceConfig, ServiceId};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::utils::paths::AppPaths;

/// Process-wide configuration, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoutConfig {
    /// Backends to query. Order defines source precedence when ranking results.
    #[serde(default = "default_services")]
    pub services: Vec<ServiceConfig>,

    #[serde(default)]
    pub model: ModelConfig,

    /// Overrides the built-in system prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Environment variable holding the model provider API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_connect_secs")]
    pub connect_secs: u64,
    #[serde(default = "default_list_secs")]
    pub list_secs: u64,
    #[serde(default = "default_call_secs")]
    pub call_secs: u64,
}

fn default_services() -> Vec<ServiceConfig> {
    ServiceId::all()
        .into_iter()
        .map(ServiceId::default_config)
        .collect()
}

fn default_model() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_connect_secs() -> u64 {
    30
}

fn default_list_secs() -> u64 {
    10
}

fn default_call_secs() -> u64 {
    30
}

impl Default for ScoutConfig {
    fn default() -> Self {
        Self {
            services: default_services(),
            model: ModelConfig::default(),
            system_prompt: None,
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_secs(),
            list_secs: default_list_secs(),
            call_secs: default_call_secs(),
        }
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn list(&self) -> Duration {
        Duration::from_secs(self.list_secs)
    }

    pub fn call(&self) -> Duration {
        Duration::from_secs(self.call_secs)
    }
}

impl ScoutConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist and parse. Otherwise the first discovered
    /// file wins; a discovered file that fails to parse is reported and the
    /// defaults are used instead.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            let contents = std::fs::read_to_string(path)?;
            return Self::from_toml_str(&contents);
        }

        for path in AppPaths::discover_configs() {
            if !path.exists() {
                continue;
            }
            debug!(target: "config", path = %path.display(), "Loading configuration");
            let contents = std::fs::read_to_string(&path)?;
            match Self::from_toml_str(&contents) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    warn!(
                        target: "config",
                        "Failed to parse config file at {:?}: {}. Using defaults.",
                        path, e
                    );
                    return Ok(Self::default());
                }
            }
        }

        Ok(Self::default())
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| Error::Configuration(format!("Invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.services.is_empty() {
            return Err(Error::Configuration(
                "At least one service must be configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for service in &self.services {
            if !seen.insert(service.id) {
                return Err(Error::Configuration(format!(
                    "Service '{}' is configured more than once",
                    service.id
                )));
            }
            url::Url::parse(&service.endpoint).map_err(|e| {
                Error::Configuration(format!(
                    "Invalid endpoint for '{}': {} ({e})",
                    service.id, service.endpoint
                ))
            })?;
        }

        Ok(())
    }

    /// Configured services in precedence order.
    pub fn service_order(&self) -> Vec<ServiceId> {
        self.services.iter().map(|s| s.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_cover_every_service_in_declaration_order() {
        let config = ScoutConfig::default();
        assert_eq!(config.service_order(), ServiceId::all());
        assert_eq!(config.timeouts.call(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_service_order_and_overrides() {
        let config = ScoutConfig::from_toml_str(
            r#"
            system_prompt = "Be brief."

            [[services]]
            id = "atlassian"
            endpoint = "https://example.atlassian.net/mcp"

            [[services]]
            id = "notion"
            endpoint = "https://notion.example/mcp"
            token_env = "NOTION_TOKEN"

            [timeouts]
            connect_secs = 5
            call_secs = 45
            "#,
        )
        .unwrap();

        assert_eq!(
            config.service_order(),
            vec![ServiceId::Atlassian, ServiceId::Notion]
        );
        assert_eq!(config.services[1].token_env(), "NOTION_TOKEN");
        assert_eq!(config.services[0].client_name, "Scout");
        assert_eq!(config.system_prompt.as_deref(), Some("Be brief."));
        assert_eq!(config.timeouts.connect(), Duration::from_secs(5));
        assert_eq!(config.timeouts.list(), Duration::from_secs(10));
        assert_eq!(config.timeouts.call(), Duration::from_secs(45));
        assert_eq!(config.model, ModelConfig::default());
    }

    #[test]
    fn rejects_duplicate_services() {
        let err = ScoutConfig::from_toml_str(
            r#"
            [[services]]
            id = "notion"
            endpoint = "https://a.example/mcp"

            [[services]]
            id = "notion"
            endpoint = "https://b.example/mcp"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(msg) if msg.contains("more than once")));
    }

    #[test]
    fn rejects_invalid_endpoint() {
        let err = ScoutConfig::from_toml_str(
            r#"
            [[services]]
            id = "notion"
            endpoint = "not a url"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn explicit_path_must_parse() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "services = 12").unwrap();
        assert!(ScoutConfig::load(Some(file.path())).is_err());
    }
}
