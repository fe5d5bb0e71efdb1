//! The public entry point: a service object owning the registry, the
//! readiness gate, and the channel to the background agent.

use chrono::Utc;
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use tokio::task::JoinHandle;

use crate::agent::channel::{self, OutboundQueue};
use crate::agent::{CapabilityProbe, Command, CommsChannel, Connector, StaticProbe, Transport, WireSync};
use crate::codec::{Codec, JsonCodec};
use crate::config::ClientConfig;
use crate::deferred::Deferred;
use crate::error::SyncError;
use crate::fetch;
use crate::sync::{FetchRequest, NewSync, ReadinessGate, SyncHandle, SyncRecord, SyncRegistry};

/// Client for registering syncs with a background agent.
///
/// Cheap to clone; clones share one registry and one agent channel.
#[derive(Clone)]
pub struct SyncClient {
    core: Arc<Core>,
}

pub(crate) struct Core {
    connector: Arc<dyn Connector>,
    probe: Arc<dyn CapabilityProbe>,
    codec: Arc<dyn Codec>,
    started: AtomicBool,
    session: OnceLock<Session>,
    registry: Arc<Mutex<SyncRegistry>>,
    gate: ReadinessGate,
}

enum Session {
    Background(CommsChannel),
    /// No background support: requests run directly
    Direct(reqwest::Client),
}

pub struct SyncClientBuilder {
    connector: Arc<dyn Connector>,
    probe: Arc<dyn CapabilityProbe>,
    codec: Arc<dyn Codec>,
}

impl SyncClientBuilder {
    pub fn with_probe(mut self, probe: impl CapabilityProbe + 'static) -> Self {
        self.probe = Arc::new(probe);
        self
    }

    pub fn with_codec(mut self, codec: impl Codec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    pub fn build(self) -> SyncClient {
        SyncClient {
            core: Arc::new(Core {
                connector: self.connector,
                probe: self.probe,
                codec: self.codec,
                started: AtomicBool::new(false),
                session: OnceLock::new(),
                registry: Arc::new(Mutex::new(SyncRegistry::new())),
                gate: ReadinessGate::new(),
            }),
        }
    }
}

impl SyncClient {
    /// A client with the default probe (background sync supported) and
    /// [`JsonCodec`].
    pub fn new(connector: impl Connector + 'static) -> Self {
        Self::builder(connector).build()
    }

    pub fn builder(connector: impl Connector + 'static) -> SyncClientBuilder {
        SyncClientBuilder {
            connector: Arc::new(connector),
            probe: Arc::new(StaticProbe::default()),
            codec: Arc::new(JsonCodec),
        }
    }

    /// Start the client. Must be called once, inside a tokio runtime, before
    /// any other operation.
    ///
    /// Startup continues in the background whether or not the returned
    /// future is awaited; operations issued meanwhile wait for it. Resolves
    /// to `EnvironmentUnsupported` when background sync is unavailable, after
    /// which `create` runs requests directly.
    pub fn init(&self, config: ClientConfig) -> Result<Initializing, SyncError> {
        if self.core.started.swap(true, Ordering::SeqCst) {
            return Err(SyncError::AlreadyInitialized);
        }

        if !self.core.probe.supports_background_sync() {
            tracing::warn!("Background sync not supported, requests will run directly");
            let http = match fetch::build_client(config.fetch_timeout_secs) {
                Ok(http) => http,
                Err(e) => {
                    self.core.gate.fail(SyncError::InitFailed(e.to_string()));
                    return Ok(Initializing::ready(Err(e)));
                }
            };
            let _ = self.core.session.set(Session::Direct(http));
            self.core.gate.open();
            return Ok(Initializing::ready(Err(SyncError::EnvironmentUnsupported)));
        }

        let (channel, queue) = CommsChannel::new();
        let _ = self.core.session.set(Session::Background(channel));

        tracing::info!(endpoint = %config.agent.endpoint, "Starting sync client");
        let core = self.core.clone();
        let task = tokio::spawn(async move { core.bootstrap(config, queue).await });
        Ok(Initializing::spawned(task))
    }

    /// Register a sync. Returns immediately; the request reaches the agent
    /// once the client is ready.
    pub fn create(&self, sync: NewSync) -> Result<SyncHandle, SyncError> {
        if let Some(e) = self.core.gate.error() {
            return Err(e);
        }
        let session = self.core.session.get().ok_or(SyncError::NotInitialized)?;

        match session {
            Session::Direct(http) => Ok(self.execute_direct(http.clone(), sync)),
            Session::Background(channel) => {
                let (handle, serial) = {
                    let mut registry = self.core.registry.lock();
                    let record = registry.register(sync)?;
                    tracing::debug!(id = %record.id, name = ?record.name, "Sync created");
                    (
                        SyncHandle::from_record(record, self.core.clone()),
                        record.serial,
                    )
                };
                channel.register(serial)?;
                Ok(handle)
            }
        }
    }

    /// The sync registered under `name`.
    pub async fn get(&self, name: &str) -> Result<SyncHandle, SyncError> {
        self.ready().await?;

        let registry = self.core.registry.lock();
        registry
            .find_by_name(name)
            .map(|record| SyncHandle::from_record(record, self.core.clone()))
            .ok_or_else(|| SyncError::NotFound(name.to_string()))
    }

    /// Every known sync, in registration order.
    pub async fn get_all(&self) -> Result<Vec<SyncHandle>, SyncError> {
        self.ready().await?;

        let registry = self.core.registry.lock();
        Ok(registry
            .iter()
            .map(|record| SyncHandle::from_record(record, self.core.clone()))
            .collect())
    }

    /// Cancel the sync registered under `name`.
    pub async fn cancel(&self, name: &str) -> Result<(), SyncError> {
        self.ready().await?;

        let serial = self
            .core
            .registry
            .lock()
            .find_by_name(name)
            .map(|record| record.serial)
            .ok_or_else(|| SyncError::NotFound(name.to_string()))?;

        self.core.cancel_serial(serial).await
    }

    /// Tell the agent to drop every pending sync, then forget all syncs
    /// locally.
    pub async fn cancel_all(&self) -> Result<(), SyncError> {
        self.ready().await?;

        let channel = match self.core.session.get() {
            Some(Session::Background(channel)) => channel,
            Some(Session::Direct(_)) => return Ok(()),
            None => return Err(SyncError::NotInitialized),
        };
        channel.cancel_all().await?;

        // Dropped records close their outcomes; waiting handles see `Cancelled`.
        let cleared = self.core.registry.lock().clear();
        tracing::info!("Cancelled all syncs, {} dropped", cleared.len());
        Ok(())
    }

    /// True once startup has completed.
    pub fn is_ready(&self) -> bool {
        self.core.gate.is_ready()
    }

    /// `None` before `init`.
    pub fn supports_background_sync(&self) -> Option<bool> {
        self.core
            .session
            .get()
            .map(|session| matches!(session, Session::Background(_)))
    }

    async fn ready(&self) -> Result<(), SyncError> {
        if !self.core.started.load(Ordering::SeqCst) {
            return Err(SyncError::NotInitialized);
        }
        self.core.gate.wait().await
    }

    fn execute_direct(&self, http: reqwest::Client, sync: NewSync) -> SyncHandle {
        let request = FetchRequest::from_parts(&sync.request, sync.options.as_ref());
        let deferred = Deferred::new();
        let handle = SyncHandle::direct(
            uuid::Uuid::new_v4().to_string(),
            Utc::now().timestamp_millis(),
            deferred.promise(),
        );

        tokio::spawn(async move {
            let result = fetch::execute(&http, &request).await;
            if let Err(e) = &result {
                tracing::error!("Direct request to {} failed: {}", request.url, e);
            }
            let _ = deferred.settle(result);
        });

        handle
    }
}

impl Core {
    /// Connect, merge the agent's snapshot, open the gate, then start
    /// draining the command queue.
    async fn bootstrap(self: Arc<Self>, config: ClientConfig, queue: OutboundQueue) -> Result<(), SyncError> {
        let connection = match self.connector.connect(&config.agent).await {
            Ok(connection) => connection,
            Err(e) => {
                self.gate.fail(SyncError::InitFailed(e.to_string()));
                return Err(e.into());
            }
        };

        let transport: Arc<dyn Transport> = Arc::from(connection.transport);
        channel::spawn_push_listener(connection.pushes, self.registry.clone(), self.codec.clone());

        let snapshot = match self.fetch_snapshot(transport.as_ref()).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.gate.fail(SyncError::InitFailed(e.to_string()));
                return Err(e);
            }
        };

        let records: Vec<SyncRecord> = snapshot
            .into_iter()
            .map(|wire| SyncRecord::hydrate(wire, self.codec.as_ref()))
            .collect();
        let hydrated = records.len();

        let displaced = self.registry.lock().replace_all(records);
        for record in displaced {
            let _ = record.reject(SyncError::DuplicateName(record.id.clone()));
        }

        tracing::info!("Hydrated {} syncs from agent", hydrated);
        self.gate.open();

        tokio::spawn(channel::run_outbound(
            queue,
            transport,
            self.registry.clone(),
            self.codec.clone(),
        ));
        Ok(())
    }

    async fn fetch_snapshot(&self, transport: &dyn Transport) -> Result<Vec<WireSync>, SyncError> {
        let reply = transport.send(Command::GetSyncs).await?;
        if reply.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(reply)
            .map_err(|e| SyncError::InitFailed(format!("invalid snapshot: {}", e)))
    }

    /// Cancel the record projected into a handle. Accepted only while the
    /// record is unsettled and not already cancelled; a cancel the agent
    /// refuses leaves the record cancellable again.
    pub(crate) async fn cancel_serial(&self, serial: u64) -> Result<(), SyncError> {
        self.gate.wait().await?;

        let channel = match self.session.get() {
            Some(Session::Background(channel)) => channel,
            Some(Session::Direct(_)) => return Err(SyncError::CancelUnavailable),
            None => return Err(SyncError::NotInitialized),
        };

        let id = {
            let mut registry = self.registry.lock();
            let record = registry
                .find_by_serial_mut(serial)
                .ok_or_else(|| SyncError::NotFound(format!("sync #{}", serial)))?;
            if record.cancelled || record.is_settled() {
                return Err(SyncError::AlreadySettled);
            }
            record.cancelled = true;
            record.id.clone()
        };

        // The outcome stays open until the agent reports a result.
        let result = channel.cancel(id).await;
        if result.is_err() {
            if let Some(record) = self.registry.lock().find_by_serial_mut(serial) {
                record.cancelled = false;
            }
        }
        result
    }
}

/// Startup in progress; resolves when the client is ready or startup failed.
pub struct Initializing {
    state: InitState,
}

enum InitState {
    Spawned(JoinHandle<Result<(), SyncError>>),
    Ready(Option<Result<(), SyncError>>),
}

impl Initializing {
    fn spawned(task: JoinHandle<Result<(), SyncError>>) -> Self {
        Self {
            state: InitState::Spawned(task),
        }
    }

    fn ready(result: Result<(), SyncError>) -> Self {
        Self {
            state: InitState::Ready(Some(result)),
        }
    }
}

impl Future for Initializing {
    type Output = Result<(), SyncError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            InitState::Spawned(task) => Pin::new(task).poll(cx).map(|joined| {
                joined.unwrap_or_else(|e| Err(SyncError::InitFailed(e.to_string())))
            }),
            InitState::Ready(result) => Poll::Ready(result.take().unwrap_or(Ok(()))),
        }
    }
}
