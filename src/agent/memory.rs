//! In-process agent.
//!
//! Keeps registered syncs across client sessions, answers snapshot requests,
//! honours cancels, and lets its owner complete syncs, pushing the result to
//! whichever client is attached.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

use super::protocol::{Command, Push, SyncResultEvent, WireSync};
use super::transport::{Connection, Connector, Transport, TransportError};
use crate::codec::JsonCodec;
use crate::config::AgentConfig;
use crate::sync::SyncResponse;

#[derive(Clone, Default)]
pub struct MemoryAgent {
    inner: Arc<AgentInner>,
}

#[derive(Default)]
struct AgentInner {
    state: Mutex<AgentState>,
    changed: Notify,
    release_snapshot: Notify,
}

#[derive(Default)]
struct AgentState {
    syncs: Vec<WireSync>,
    commands: Vec<Command>,
    pushes: Option<mpsc::UnboundedSender<Push>>,
    connect_error: Option<String>,
    rejected: Vec<&'static str>,
    hold_snapshot: bool,
    connections: usize,
}

impl MemoryAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with syncs left over from an earlier session.
    pub fn with_snapshot(self, syncs: Vec<WireSync>) -> Self {
        self.inner.state.lock().syncs = syncs;
        self
    }

    /// Refuse every connection attempt.
    pub fn failing_connect(self, reason: &str) -> Self {
        self.inner.state.lock().connect_error = Some(reason.to_string());
        self
    }

    /// Reject commands with the given wire name, e.g. `"CANCEL_SYNC"`.
    pub fn rejecting(self, command: &'static str) -> Self {
        self.inner.state.lock().rejected.push(command);
        self
    }

    /// Hold `GET_SYNCS` replies until [`MemoryAgent::release_snapshot`].
    pub fn holding_snapshot(self) -> Self {
        self.inner.state.lock().hold_snapshot = true;
        self
    }

    pub fn release_snapshot(&self) {
        self.inner.release_snapshot.notify_one();
    }

    /// Every command received, in arrival order.
    pub fn commands(&self) -> Vec<Command> {
        self.inner.state.lock().commands.clone()
    }

    /// Number of received commands with the given wire name.
    pub fn count(&self, command: &str) -> usize {
        self.inner
            .state
            .lock()
            .commands
            .iter()
            .filter(|c| c.name() == command)
            .count()
    }

    /// Syncs the agent currently holds.
    pub fn syncs(&self) -> Vec<WireSync> {
        self.inner.state.lock().syncs.clone()
    }

    pub fn connections(&self) -> usize {
        self.inner.state.lock().connections
    }

    /// Record `response` as the outcome of sync `id` and notify the attached
    /// client, if any.
    pub fn complete(&self, id: &str, response: &SyncResponse) -> Result<(), TransportError> {
        let payload = JsonCodec
            .serialize_response(response)
            .map_err(|e| TransportError::Send(e.to_string()))?;
        let synced_on = Utc::now().timestamp_millis();

        let pushes = {
            let mut state = self.inner.state.lock();
            let sync = state
                .syncs
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or_else(|| TransportError::Rejected {
                    command: "SYNC_RESULT",
                    reason: format!("unknown sync '{}'", id),
                })?;
            sync.response = Some(payload.clone());
            sync.synced_on = Some(synced_on);
            state.pushes.clone()
        };

        tracing::debug!(id = %id, "Agent completed sync");
        if let Some(pushes) = pushes {
            let _ = pushes.send(Push::SyncResult(SyncResultEvent {
                id: id.to_string(),
                synced_on,
                response: payload,
            }));
        }
        Ok(())
    }

    /// Send an arbitrary push to the attached client.
    pub fn push(&self, push: Push) -> Result<(), TransportError> {
        let pushes = self.inner.state.lock().pushes.clone();
        pushes
            .ok_or(TransportError::Closed)?
            .send(push)
            .map_err(|_| TransportError::Closed)
    }

    /// Forget the attached client, ending its push stream.
    pub fn disconnect(&self) {
        self.inner.state.lock().pushes = None;
    }

    /// Wait until the received commands satisfy `predicate`.
    pub async fn wait_for(&self, predicate: impl Fn(&[Command]) -> bool) {
        loop {
            let notified = self.inner.changed.notified();
            if predicate(&self.inner.state.lock().commands) {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl Connector for MemoryAgent {
    async fn connect(&self, config: &AgentConfig) -> Result<Connection, TransportError> {
        let mut state = self.inner.state.lock();
        if let Some(reason) = &state.connect_error {
            return Err(TransportError::Connect(reason.clone()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.pushes = Some(tx);
        state.connections += 1;
        tracing::debug!(endpoint = %config.endpoint, "Client attached to memory agent");

        Ok(Connection {
            transport: Box::new(MemoryTransport {
                inner: self.inner.clone(),
            }),
            pushes: rx,
        })
    }
}

struct MemoryTransport {
    inner: Arc<AgentInner>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, command: Command) -> Result<Value, TransportError> {
        let hold = {
            let mut state = self.inner.state.lock();
            state.commands.push(command.clone());
            state.hold_snapshot && command == Command::GetSyncs
        };
        self.inner.changed.notify_waiters();

        if hold {
            self.inner.release_snapshot.notified().await;
        }

        let mut state = self.inner.state.lock();
        if state.rejected.contains(&command.name()) {
            return Err(TransportError::Rejected {
                command: command.name(),
                reason: "rejected by agent".to_string(),
            });
        }

        match command {
            Command::RegisterSync(sync) => {
                state.syncs.retain(|s| s.id != sync.id);
                state.syncs.push(sync);
                Ok(Value::Null)
            }
            Command::CancelSync(id) => {
                state.syncs.retain(|s| s.id != id || s.response.is_some());
                Ok(Value::Null)
            }
            Command::CancelAllSyncs => {
                state.syncs.retain(|s| s.response.is_some());
                Ok(Value::Null)
            }
            Command::GetSyncs => serde_json::to_value(&state.syncs)
                .map_err(|e| TransportError::Send(e.to_string())),
        }
    }
}
