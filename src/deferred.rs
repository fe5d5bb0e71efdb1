//! Single-settlement values with an external settle capability.
//!
//! A [`Deferred`] is held by whoever decides the outcome; any number of
//! [`Promise`]s can wait on it. The value is written at most once.

use thiserror::Error;
use tokio::sync::watch;

/// Returned when settling a deferred that already holds a value.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("deferred already settled")]
pub struct AlreadySettled;

#[derive(Debug)]
pub struct Deferred<T> {
    tx: watch::Sender<Option<T>>,
}

impl<T: Clone> Deferred<T> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Settle with `value`, waking every waiting promise.
    pub fn settle(&self, value: T) -> Result<(), AlreadySettled> {
        let mut value = Some(value);
        let settled = self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = value.take();
            true
        });

        if settled {
            Ok(())
        } else {
            Err(AlreadySettled)
        }
    }

    pub fn is_settled(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// The settled value, if any.
    pub fn peek(&self) -> Option<T> {
        self.tx.borrow().clone()
    }

    pub fn promise(&self) -> Promise<T> {
        Promise {
            rx: self.tx.subscribe(),
        }
    }
}

impl<T: Clone> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Read side of a [`Deferred`].
#[derive(Debug, Clone)]
pub struct Promise<T> {
    rx: watch::Receiver<Option<T>>,
}

impl<T: Clone> Promise<T> {
    /// Wait for the value. `None` means the deferred was dropped unsettled.
    pub async fn wait(mut self) -> Option<T> {
        match self.rx.wait_for(|slot| slot.is_some()).await {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        }
    }

    pub fn try_get(&self) -> Option<T> {
        self.rx.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_settle_wakes_waiters() {
        let deferred = Deferred::new();
        let first = deferred.promise();
        let second = deferred.promise();

        let waiter = tokio::spawn(first.wait());
        deferred.settle(7).unwrap();

        assert_eq!(waiter.await.unwrap(), Some(7));
        assert_eq!(second.wait().await, Some(7));
    }

    #[test]
    fn test_settle_twice_is_rejected() {
        let deferred = Deferred::new();
        assert!(deferred.settle("first").is_ok());
        assert_eq!(deferred.settle("second"), Err(AlreadySettled));
        assert_eq!(deferred.peek(), Some("first"));
    }

    #[tokio::test]
    async fn test_promise_created_after_settle_sees_value() {
        let deferred = Deferred::new();
        deferred.settle(1u8).unwrap();
        let promise = deferred.promise();
        assert_eq!(promise.try_get(), Some(1));
        assert_eq!(promise.wait().await, Some(1));
    }

    #[tokio::test]
    async fn test_dropped_unsettled_yields_none() {
        let deferred: Deferred<u8> = Deferred::new();
        let promise = deferred.promise();
        drop(deferred);

        let result = tokio::time::timeout(Duration::from_secs(1), promise.wait())
            .await
            .unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_value_survives_drop_after_settle() {
        let deferred = Deferred::new();
        let promise = deferred.promise();
        deferred.settle(3).unwrap();
        drop(deferred);
        assert_eq!(promise.wait().await, Some(3));
    }

    #[test]
    fn test_is_settled() {
        let deferred = Deferred::new();
        assert!(!deferred.is_settled());
        deferred.settle(()).unwrap();
        assert!(deferred.is_settled());
    }
}
