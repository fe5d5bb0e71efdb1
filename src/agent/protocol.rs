//! Messages exchanged with the background agent

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A sync as the agent stores and reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSync {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub created_on: i64,
    #[serde(default)]
    pub synced_on: Option<i64>,
    /// Serialized request
    #[serde(default)]
    pub request: Value,
    /// Serialized response, present once the agent completed the sync
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default)]
    pub cancelled: bool,
}

/// Client to agent commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    RegisterSync(WireSync),
    CancelSync(String),
    CancelAllSyncs,
    /// Answered with the agent's `Vec<WireSync>` snapshot.
    GetSyncs,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RegisterSync(_) => "REGISTER_SYNC",
            Self::CancelSync(_) => "CANCEL_SYNC",
            Self::CancelAllSyncs => "CANCEL_ALL_SYNCS",
            Self::GetSyncs => "GET_SYNCS",
        }
    }
}

/// Agent to client notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Push {
    SyncResult(SyncResultEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResultEvent {
    pub id: String,
    pub synced_on: i64,
    pub response: Value,
}
