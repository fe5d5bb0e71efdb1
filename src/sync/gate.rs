//! One-shot barrier holding public operations until the agent channel is up
//! and the initial snapshot has been merged.

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::SyncError;

type Waiter = oneshot::Sender<Result<(), SyncError>>;

enum GateState {
    Pending(Vec<Waiter>),
    Ready,
    Failed(SyncError),
}

pub struct ReadinessGate {
    state: Mutex<GateState>,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState::Pending(Vec::new())),
        }
    }

    /// Resolve once the gate is open. Fails if startup failed.
    pub async fn wait(&self) -> Result<(), SyncError> {
        let rx = {
            let mut state = self.state.lock();
            match &mut *state {
                GateState::Ready => return Ok(()),
                GateState::Failed(e) => return Err(e.clone()),
                GateState::Pending(waiters) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    tracing::debug!("Operation queued until ready, {} waiting", waiters.len());
                    rx
                }
            }
        };

        rx.await
            .unwrap_or_else(|_| Err(SyncError::InitFailed("readiness gate dropped".to_string())))
    }

    /// Pending -> Ready. Returns false if the gate had already left Pending.
    pub fn open(&self) -> bool {
        let waiters = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, GateState::Ready) {
                GateState::Pending(waiters) => waiters,
                previous => {
                    *state = previous;
                    return false;
                }
            }
        };

        tracing::info!("Sync client ready, releasing {} queued operations", waiters.len());
        for waiter in waiters {
            let _ = waiter.send(Ok(()));
        }
        true
    }

    /// Pending -> Failed. Queued and later operations fail with `error`.
    pub fn fail(&self, error: SyncError) -> bool {
        let waiters = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, GateState::Failed(error.clone())) {
                GateState::Pending(waiters) => waiters,
                previous => {
                    *state = previous;
                    return false;
                }
            }
        };

        tracing::error!("Sync client failed to start: {}", error);
        for waiter in waiters {
            let _ = waiter.send(Err(error.clone()));
        }
        true
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.state.lock(), GateState::Ready)
    }

    /// The startup error, once the gate has failed.
    pub fn error(&self) -> Option<SyncError> {
        match &*self.state.lock() {
            GateState::Failed(e) => Some(e.clone()),
            _ => None,
        }
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_waiters_released_on_open() {
        let gate = Arc::new(ReadinessGate::new());

        let mut tasks = Vec::new();
        for _ in 0..3 {
            let gate = gate.clone();
            tasks.push(tokio::spawn(async move { gate.wait().await }));
        }
        tokio::task::yield_now().await;
        assert!(!gate.is_ready());

        assert!(gate.open());
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }
        assert!(gate.is_ready());
    }

    #[tokio::test]
    async fn test_wait_blocks_while_pending() {
        let gate = ReadinessGate::new();
        let result = tokio::time::timeout(Duration::from_millis(50), gate.wait()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_open_only_once() {
        let gate = ReadinessGate::new();
        assert!(gate.open());
        assert!(!gate.open());
        assert!(!gate.fail(SyncError::Cancelled));
        assert!(gate.wait().await.is_ok());
    }

    #[tokio::test]
    async fn test_fail_rejects_waiters_and_later_calls() {
        let gate = Arc::new(ReadinessGate::new());
        let queued = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait().await })
        };
        tokio::task::yield_now().await;

        assert!(gate.fail(SyncError::InitFailed("no agent".into())));
        assert!(matches!(queued.await.unwrap(), Err(SyncError::InitFailed(_))));
        assert!(matches!(gate.wait().await, Err(SyncError::InitFailed(_))));
        assert!(matches!(gate.error(), Some(SyncError::InitFailed(_))));
        assert!(!gate.open());
    }
}
