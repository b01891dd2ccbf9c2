//! One-shot completion events carried by every record.

use std::sync::OnceLock;

use tokio::sync::watch;

use crate::error::{TxnLogError, TxnLogResult};
use crate::types::Status;

/// Settable once, awaitable by any number of waiters. Late waiters observe the stored
/// status without suspending.
///
/// The channel is created lazily so that records nobody waits on stay small.
#[derive(Debug, Default)]
pub struct CompletionSignal {
    sender: OnceLock<watch::Sender<Option<Status>>>,
    armed: bool,
}

impl CompletionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self) -> &watch::Sender<Option<Status>> {
        self.sender.get_or_init(|| watch::channel(None).0)
    }

    /// Declares that someone will complete this signal. Dropping an armed signal that
    /// was never completed is a lost wakeup and panics.
    pub fn arm(&mut self) {
        self.armed = true;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn status(&self) -> Option<Status> {
        self.sender.get().and_then(|sender| *sender.borrow())
    }

    pub fn is_completed(&self) -> bool {
        self.status().is_some()
    }

    pub fn complete(&self, status: Status) -> TxnLogResult<()> {
        let mut previous = None;
        let modified = self.sender().send_if_modified(|slot| match slot {
            Some(existing) => {
                previous = Some(*existing);
                false
            }
            None => {
                *slot = Some(status);
                true
            }
        });
        if modified {
            return Ok(());
        }
        Err(TxnLogError::InvalidState(format!(
            "completion already signalled with {}, cannot signal {}",
            previous.map(|s| s.to_string()).unwrap_or_default(),
            status
        )))
    }

    pub fn waiter(&self) -> CompletionWaiter {
        CompletionWaiter {
            receiver: self.sender().subscribe(),
        }
    }

    pub async fn wait(&self) -> TxnLogResult<Status> {
        self.waiter().wait().await
    }
}

impl Drop for CompletionSignal {
    fn drop(&mut self) {
        if self.armed && !std::thread::panicking() {
            assert!(
                self.is_completed(),
                "armed completion signal dropped without being completed"
            );
        }
    }
}

/// Owned handle for awaiting a [`CompletionSignal`] without borrowing its record.
#[derive(Debug)]
pub struct CompletionWaiter {
    receiver: watch::Receiver<Option<Status>>,
}

impl CompletionWaiter {
    pub async fn wait(mut self) -> TxnLogResult<Status> {
        let status = self
            .receiver
            .wait_for(Option::is_some)
            .await
            .map_err(|_| {
                TxnLogError::InvalidState(
                    "completion signal dropped before it was completed".to_string(),
                )
            })?;
        let value = *status;
        value.ok_or_else(|| TxnLogError::Internal("completion woke without a status".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;

    #[tokio::test]
    async fn all_waiters_observe_the_same_status() {
        let signal = CompletionSignal::new();
        assert_eq!(signal.status(), None);

        let waiters: Vec<_> = (0..8).map(|_| tokio::spawn(signal.waiter().wait())).collect();
        signal.complete(Status::IO_FAILURE).unwrap();

        for result in join_all(waiters).await {
            assert_eq!(result.unwrap().unwrap(), Status::IO_FAILURE);
        }
        // late waiter
        assert_eq!(signal.wait().await.unwrap(), Status::IO_FAILURE);
    }

    #[test]
    fn second_completion_is_rejected() {
        let signal = CompletionSignal::new();
        signal.complete(Status::SUCCESS).unwrap();
        let err = signal.complete(Status::CANCELLED).unwrap_err();
        assert!(matches!(err, TxnLogError::InvalidState(_)));
        assert_eq!(signal.status(), Some(Status::SUCCESS));
    }

    #[tokio::test]
    async fn dropped_signal_fails_pending_waiters() {
        let signal = CompletionSignal::new();
        let waiter = signal.waiter();
        drop(signal);
        assert!(matches!(
            waiter.wait().await,
            Err(TxnLogError::InvalidState(_))
        ));
    }

    #[test]
    #[should_panic(expected = "armed completion signal dropped")]
    fn armed_signal_must_complete_before_drop() {
        let mut signal = CompletionSignal::new();
        signal.arm();
        drop(signal);
    }

    #[test]
    fn armed_and_completed_signal_drops_quietly() {
        let mut signal = CompletionSignal::new();
        signal.arm();
        signal.complete(Status::SUCCESS).unwrap();
        assert!(signal.is_armed());
    }
}
