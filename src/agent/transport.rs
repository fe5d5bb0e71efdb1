//! Connection seam to the background agent.
//!
//! Framing, delivery, and session setup belong to the implementor. The client
//! only relies on commands being delivered in send order and pushes arriving
//! at most once, in the order the agent sent them.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use super::protocol::{Command, Push};
use crate::config::AgentConfig;

#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Agent rejected {command}: {reason}")]
    Rejected {
        command: &'static str,
        reason: String,
    },

    #[error("channel closed")]
    Closed,
}

/// Request/response side of an established channel.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `command` and wait for the agent's reply.
    async fn send(&self, command: Command) -> Result<Value, TransportError>;
}

/// A live channel: the command side plus the stream of agent pushes.
pub struct Connection {
    pub transport: Box<dyn Transport>,
    pub pushes: mpsc::UnboundedReceiver<Push>,
}

/// Establishes the channel to the agent.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &AgentConfig) -> Result<Connection, TransportError>;
}

/// Reports whether the environment can run a persistent background agent.
pub trait CapabilityProbe: Send + Sync {
    fn supports_background_sync(&self) -> bool;
}

/// Probe with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct StaticProbe(pub bool);

impl Default for StaticProbe {
    fn default() -> Self {
        Self(true)
    }
}

impl CapabilityProbe for StaticProbe {
    fn supports_background_sync(&self) -> bool {
        self.0
    }
}
