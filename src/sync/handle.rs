//! Caller-facing view of a sync.

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;

use super::record::{Outcome, SyncRecord, SyncState};
use crate::client::Core;
use crate::deferred::Promise;
use crate::error::SyncError;

/// A sync as seen by the caller: awaitable for the response, plus the
/// metadata captured when the handle was produced.
///
/// ```ignore
/// let handle = client.create(NewSync::named("upload-1", "/api/upload"))?;
/// let response = handle.await?;
/// ```
#[derive(Clone)]
pub struct SyncHandle {
    id: String,
    name: Option<String>,
    created_on: i64,
    synced_on: Option<i64>,
    cancelled: bool,
    promise: Promise<Outcome>,
    origin: Origin,
}

#[derive(Clone)]
enum Origin {
    Registered { serial: u64, core: Arc<Core> },
    Direct,
}

impl SyncHandle {
    pub(crate) fn from_record(record: &SyncRecord, core: Arc<Core>) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            created_on: record.created_on,
            synced_on: record.synced_on,
            cancelled: record.cancelled,
            promise: record.promise(),
            origin: Origin::Registered {
                serial: record.serial,
                core,
            },
        }
    }

    /// A handle for a request executed directly, never registered.
    pub(crate) fn direct(id: String, created_on: i64, promise: Promise<Outcome>) -> Self {
        Self {
            id,
            name: None,
            created_on,
            synced_on: None,
            cancelled: false,
            promise,
            origin: Origin::Direct,
        }
    }

    /// Record id; equals the name for named syncs.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Name the sync was registered under, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Creation time in milliseconds since the epoch.
    pub fn created_on(&self) -> i64 {
        self.created_on
    }

    /// When the agent completed the sync, if it had by the time this handle
    /// was produced.
    pub fn synced_on(&self) -> Option<i64> {
        self.synced_on
    }

    /// Whether a cancel had been accepted when this handle was produced.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// True for handles that bypassed the agent.
    pub fn is_direct(&self) -> bool {
        matches!(self.origin, Origin::Direct)
    }

    /// A settled outcome wins over the cancel flag.
    pub fn state(&self) -> SyncState {
        match self.promise.try_get() {
            None if self.cancelled => SyncState::Cancelled,
            None => SyncState::Pending,
            Some(Ok(_)) => SyncState::Resolved,
            Some(Err(SyncError::Cancelled)) => SyncState::Cancelled,
            Some(Err(_)) => SyncState::Failed,
        }
    }

    /// The outcome, if already settled.
    pub fn try_response(&self) -> Option<Outcome> {
        self.promise.try_get()
    }

    /// Wait for the agent's response.
    pub async fn response(&self) -> Outcome {
        self.promise
            .clone()
            .wait()
            .await
            .unwrap_or(Err(SyncError::Cancelled))
    }

    /// Ask the agent to drop this sync. Fails if it is already cancelled or
    /// complete. The outcome settles only if the agent still reports a
    /// result.
    pub async fn cancel(&self) -> Result<(), SyncError> {
        match &self.origin {
            Origin::Registered { serial, core } => core.cancel_serial(*serial).await,
            Origin::Direct => Err(SyncError::CancelUnavailable),
        }
    }
}

impl std::fmt::Debug for SyncHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("created_on", &self.created_on)
            .field("synced_on", &self.synced_on)
            .field("state", &self.state())
            .finish()
    }
}

impl IntoFuture for SyncHandle {
    type Output = Outcome;
    type IntoFuture = Pin<Box<dyn Future<Output = Outcome> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.response().await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::Deferred;
    use crate::sync::SyncResponse;

    #[tokio::test]
    async fn test_direct_handle_resolves_and_refuses_cancel() {
        let deferred = Deferred::new();
        let handle = SyncHandle::direct("direct-1".into(), 42, deferred.promise());

        assert!(handle.is_direct());
        assert_eq!(handle.state(), SyncState::Pending);
        assert!(matches!(
            handle.cancel().await,
            Err(SyncError::CancelUnavailable)
        ));

        deferred.settle(Ok(SyncResponse::new(200))).unwrap();
        assert_eq!(handle.state(), SyncState::Resolved);
        assert_eq!(handle.clone().await.unwrap().status, 200);
        assert_eq!(handle.created_on(), 42);
        assert_eq!(handle.name(), None);
    }

    #[tokio::test]
    async fn test_dropped_outcome_reads_as_cancelled() {
        let deferred: Deferred<Outcome> = Deferred::new();
        let handle = SyncHandle::direct("direct-2".into(), 0, deferred.promise());
        drop(deferred);
        assert!(matches!(handle.await, Err(SyncError::Cancelled)));
    }
}
