//! Client configuration.

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

const DEFAULT_AGENT_ENDPOINT: &str = "fetch-sync-agent";
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Options passed to `SyncClient::init`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    /// Timeout for requests executed directly when no agent is available
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl ClientConfig {
    pub fn from_json(json: &str) -> Result<Self, SyncError> {
        serde_json::from_str(json).map_err(|e| SyncError::Config(e.to_string()))
    }

    pub fn with_agent(mut self, agent: AgentConfig) -> Self {
        self.agent = agent;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
        }
    }
}

/// Where the background agent lives; interpreted by the `Connector`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    #[serde(default = "default_agent_endpoint")]
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint: default_agent_endpoint(),
            scope: None,
        }
    }
}

fn default_agent_endpoint() -> String {
    DEFAULT_AGENT_ENDPOINT.to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.agent.endpoint, "fetch-sync-agent");
        assert_eq!(config.agent.scope, None);
        assert_eq!(config.fetch_timeout_secs, 30);
    }

    #[test]
    fn test_from_json_partial() {
        let config =
            ClientConfig::from_json(r#"{"agent":{"scope":"/app/"},"fetchTimeoutSecs":5}"#)
                .unwrap();
        assert_eq!(config.agent.endpoint, "fetch-sync-agent");
        assert_eq!(config.agent.scope.as_deref(), Some("/app/"));
        assert_eq!(config.fetch_timeout_secs, 5);

        assert_eq!(ClientConfig::from_json("{}").unwrap(), ClientConfig::default());
    }

    #[test]
    fn test_from_json_invalid() {
        let err = ClientConfig::from_json(r#"{"fetchTimeoutSecs":"soon"}"#).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
        assert!(err.is_usage_error());
    }
}
