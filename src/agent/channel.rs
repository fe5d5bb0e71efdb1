//! Command queue to the agent and demultiplexing of its pushes.
//!
//! Every command after startup goes through one FIFO drained by a single
//! task, so the agent sees commands in the order their calls were accepted.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::protocol::{Command, Push, SyncResultEvent};
use super::transport::{Transport, TransportError};
use crate::codec::Codec;
use crate::error::SyncError;
use crate::sync::SyncRegistry;

type Reply = oneshot::Sender<Result<(), SyncError>>;

pub(crate) enum Outbound {
    Register { serial: u64 },
    Cancel { id: String, reply: Reply },
    CancelAll { reply: Reply },
}

/// Receiving end of the command queue, drained by [`run_outbound`].
pub(crate) struct OutboundQueue(mpsc::UnboundedReceiver<Outbound>);

/// Sending side of the channel to the agent.
pub struct CommsChannel {
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl CommsChannel {
    pub(crate) fn new() -> (Self, OutboundQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { outbound: tx }, OutboundQueue(rx))
    }

    /// Queue a `REGISTER_SYNC` for the record with `serial`. The request is
    /// serialized when the command reaches the front of the queue.
    pub(crate) fn register(&self, serial: u64) -> Result<(), SyncError> {
        self.outbound
            .send(Outbound::Register { serial })
            .map_err(|_| SyncError::Transport(TransportError::Closed))
    }

    /// Send `CANCEL_SYNC` and wait for the agent to acknowledge it.
    pub async fn cancel(&self, id: String) -> Result<(), SyncError> {
        self.request(|reply| Outbound::Cancel { id, reply }).await
    }

    /// Send `CANCEL_ALL_SYNCS` and wait for the agent to acknowledge it.
    pub async fn cancel_all(&self) -> Result<(), SyncError> {
        self.request(|reply| Outbound::CancelAll { reply }).await
    }

    async fn request(&self, make: impl FnOnce(Reply) -> Outbound) -> Result<(), SyncError> {
        let (tx, rx) = oneshot::channel();
        self.outbound
            .send(make(tx))
            .map_err(|_| SyncError::Transport(TransportError::Closed))?;
        rx.await
            .map_err(|_| SyncError::Transport(TransportError::Closed))?
    }
}

/// Drain the command queue until every sender is gone.
pub(crate) async fn run_outbound(
    mut queue: OutboundQueue,
    transport: Arc<dyn Transport>,
    registry: Arc<Mutex<SyncRegistry>>,
    codec: Arc<dyn Codec>,
) {
    while let Some(message) = queue.0.recv().await {
        match message {
            Outbound::Register { serial } => {
                dispatch_register(serial, transport.as_ref(), &registry, codec.as_ref()).await;
            }
            Outbound::Cancel { id, reply } => {
                let result = acknowledge(transport.as_ref(), Command::CancelSync(id.clone())).await;
                match &result {
                    Ok(()) => tracing::info!(id = %id, "Sync cancelled"),
                    Err(e) => tracing::warn!(id = %id, "Cancel not delivered: {}", e),
                }
                let _ = reply.send(result);
            }
            Outbound::CancelAll { reply } => {
                let result = acknowledge(transport.as_ref(), Command::CancelAllSyncs).await;
                if let Err(e) = &result {
                    tracing::warn!("Cancel-all not delivered: {}", e);
                }
                let _ = reply.send(result);
            }
        }
    }

    tracing::debug!("Outbound queue closed");
}

async fn acknowledge(transport: &dyn Transport, command: Command) -> Result<(), SyncError> {
    transport.send(command).await?;
    Ok(())
}

async fn dispatch_register(
    serial: u64,
    transport: &dyn Transport,
    registry: &Mutex<SyncRegistry>,
    codec: &dyn Codec,
) {
    let wire = {
        let mut registry = registry.lock();
        let Some(record) = registry.find_by_serial_mut(serial) else {
            tracing::debug!(serial, "Sync dropped before dispatch, skipping");
            return;
        };

        if let Err(e) = record.serialize_request(codec) {
            tracing::error!(id = %record.id, "Failed to serialize request: {}", e);
            if let Some(record) = registry.remove(serial) {
                let _ = record.reject(SyncError::Codec(e));
            }
            return;
        }

        record.to_wire()
    };

    let id = wire.id.clone();
    match transport.send(Command::RegisterSync(wire)).await {
        Ok(_) => tracing::info!(id = %id, "Sync registered with agent"),
        Err(e) => {
            tracing::error!(id = %id, "Failed to register sync: {}", e);
            if let Some(record) = registry.lock().remove(serial) {
                let _ = record.reject(SyncError::Transport(e));
            }
        }
    }
}

/// Apply agent pushes in arrival order.
pub(crate) fn spawn_push_listener(
    mut pushes: mpsc::UnboundedReceiver<Push>,
    registry: Arc<Mutex<SyncRegistry>>,
    codec: Arc<dyn Codec>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(push) = pushes.recv().await {
            handle_push(push, &registry, codec.as_ref());
        }
        tracing::debug!("Agent push stream ended");
    })
}

pub(crate) fn handle_push(push: Push, registry: &Mutex<SyncRegistry>, codec: &dyn Codec) {
    match push {
        Push::SyncResult(event) => apply_sync_result(event, registry, codec),
    }
}

fn apply_sync_result(event: SyncResultEvent, registry: &Mutex<SyncRegistry>, codec: &dyn Codec) {
    let SyncResultEvent {
        id,
        synced_on,
        response,
    } = event;

    let mut registry = registry.lock();
    let Some(record) = registry.find_by_id_mut(&id) else {
        tracing::debug!(id = %id, "Dropping result for unknown sync");
        return;
    };

    if record.is_settled() {
        tracing::warn!(id = %id, state = ?record.state(), "Ignoring result for settled sync");
        return;
    }

    match codec.deserialize_response(response) {
        Ok(response) => {
            let status = response.status;
            if record.resolve(response, synced_on).is_ok() {
                tracing::info!(id = %id, status, cancelled = record.cancelled, "Sync completed");
            }
        }
        Err(e) => {
            tracing::error!(id = %id, "Could not decode sync result: {}", e);
            let _ = record.reject(SyncError::Codec(e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::sync::{NewSync, SyncState};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<Command>>,
        fail: bool,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, command: Command) -> Result<Value, TransportError> {
            if self.fail {
                return Err(TransportError::Send("agent unreachable".into()));
            }
            self.sent.lock().push(command);
            Ok(Value::Null)
        }
    }

    fn result_push(id: &str, status: u16) -> Push {
        Push::SyncResult(SyncResultEvent {
            id: id.to_string(),
            synced_on: 99,
            response: json!({ "status": status }),
        })
    }

    #[test]
    fn test_result_for_unknown_id_is_noop() {
        let registry = Mutex::new(SyncRegistry::new());
        handle_push(result_push("ghost", 200), &registry, &JsonCodec);
        assert!(registry.lock().is_empty());
    }

    #[tokio::test]
    async fn test_result_resolves_named_record() {
        let registry = Mutex::new(SyncRegistry::new());
        let promise = registry
            .lock()
            .register(NewSync::named("upload-1", "/x"))
            .unwrap()
            .promise();

        handle_push(result_push("upload-1", 201), &registry, &JsonCodec);

        assert_eq!(promise.wait().await.unwrap().unwrap().status, 201);
        let registry = registry.lock();
        let record = registry.find_by_name("upload-1").unwrap();
        assert_eq!(record.synced_on, Some(99));
        assert_eq!(record.response.as_ref().map(|r| r.status), Some(201));
    }

    #[test]
    fn test_second_result_is_ignored() {
        let registry = Mutex::new(SyncRegistry::new());
        registry
            .lock()
            .register(NewSync::named("upload-1", "/x"))
            .unwrap();

        handle_push(result_push("upload-1", 200), &registry, &JsonCodec);
        handle_push(result_push("upload-1", 500), &registry, &JsonCodec);

        let registry = registry.lock();
        let record = registry.find_by_name("upload-1").unwrap();
        assert_eq!(record.response.as_ref().map(|r| r.status), Some(200));
    }

    #[test]
    fn test_result_after_cancel_still_settles() {
        let registry = Mutex::new(SyncRegistry::new());
        {
            let mut registry = registry.lock();
            registry.register(NewSync::named("upload-1", "/x")).unwrap();
            registry.find_by_id_mut("upload-1").unwrap().cancelled = true;
            assert_eq!(
                registry.find_by_name("upload-1").unwrap().state(),
                SyncState::Cancelled
            );
        }

        handle_push(result_push("upload-1", 200), &registry, &JsonCodec);

        let registry = registry.lock();
        let record = registry.find_by_name("upload-1").unwrap();
        assert_eq!(record.response.as_ref().map(|r| r.status), Some(200));
        assert_eq!(record.state(), SyncState::Resolved);
        assert!(record.cancelled);
    }

    #[test]
    fn test_undecodable_result_fails_record() {
        let registry = Mutex::new(SyncRegistry::new());
        registry.lock().register(NewSync::named("bad", "/x")).unwrap();

        handle_push(
            Push::SyncResult(SyncResultEvent {
                id: "bad".into(),
                synced_on: 1,
                response: json!(17),
            }),
            &registry,
            &JsonCodec,
        );

        assert_eq!(registry.lock().find_by_name("bad").unwrap().state(), SyncState::Failed);
    }

    #[tokio::test]
    async fn test_outbound_serializes_and_preserves_order() {
        let registry = Arc::new(Mutex::new(SyncRegistry::new()));
        let transport = Arc::new(RecordingTransport::default());
        let (channel, queue) = CommsChannel::new();

        let serial = registry
            .lock()
            .register(NewSync::named("upload-1", "/api/upload"))
            .unwrap()
            .serial;
        channel.register(serial).unwrap();

        let worker = tokio::spawn(run_outbound(
            queue,
            transport.clone(),
            registry.clone(),
            Arc::new(JsonCodec),
        ));

        channel.cancel("upload-1".into()).await.unwrap();
        channel.cancel_all().await.unwrap();
        drop(channel);
        worker.await.unwrap();

        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 3);
        match &sent[0] {
            Command::RegisterSync(wire) => {
                assert_eq!(wire.id, "upload-1");
                assert_eq!(wire.request["url"], "/api/upload");
            }
            other => panic!("Expected REGISTER_SYNC, got {:?}", other),
        }
        assert_eq!(sent[1], Command::CancelSync("upload-1".into()));
        assert_eq!(sent[2], Command::CancelAllSyncs);

        let registry = registry.lock();
        assert!(matches!(
            registry.find_by_name("upload-1").unwrap().request,
            crate::sync::RequestPayload::Serialized(_)
        ));
    }

    #[tokio::test]
    async fn test_register_for_removed_record_is_skipped() {
        let registry = Arc::new(Mutex::new(SyncRegistry::new()));
        let transport = Arc::new(RecordingTransport::default());
        let (channel, queue) = CommsChannel::new();

        let serial = registry
            .lock()
            .register(NewSync::anonymous("/x"))
            .unwrap()
            .serial;
        channel.register(serial).unwrap();
        registry.lock().clear();
        drop(channel);

        run_outbound(queue, transport.clone(), registry, Arc::new(JsonCodec)).await;
        assert!(transport.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failed_register_rejects_and_removes() {
        let registry = Arc::new(Mutex::new(SyncRegistry::new()));
        let transport = Arc::new(RecordingTransport {
            fail: true,
            ..Default::default()
        });
        let (channel, queue) = CommsChannel::new();

        let (serial, promise) = {
            let mut registry = registry.lock();
            let record = registry.register(NewSync::named("upload-1", "/x")).unwrap();
            (record.serial, record.promise())
        };
        channel.register(serial).unwrap();
        drop(channel);

        run_outbound(queue, transport, registry.clone(), Arc::new(JsonCodec)).await;

        assert!(matches!(
            promise.wait().await,
            Some(Err(SyncError::Transport(_)))
        ));
        assert!(registry.lock().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_reports_transport_failure() {
        let registry = Arc::new(Mutex::new(SyncRegistry::new()));
        let transport = Arc::new(RecordingTransport {
            fail: true,
            ..Default::default()
        });
        let (channel, queue) = CommsChannel::new();
        tokio::spawn(run_outbound(queue, transport, registry, Arc::new(JsonCodec)));

        let err = channel.cancel("x".into()).await.unwrap_err();
        assert!(matches!(err, SyncError::Transport(TransportError::Send(_))));
    }
}
