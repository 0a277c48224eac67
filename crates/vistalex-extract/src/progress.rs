// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Progress reporting and cooperative cancellation for one extraction call.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use vistalex_core::types::ProgressEvent;

/// Where progress events go. Emission never blocks and never fails: a full
/// or closed channel simply drops the event.
#[derive(Clone, Default)]
pub enum ProgressSink {
    #[default]
    Silent,
    Channel(mpsc::Sender<ProgressEvent>),
    Callback(Arc<dyn Fn(ProgressEvent) + Send + Sync>),
}

impl ProgressSink {
    /// A bounded channel sink and its receiving end.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::Channel(tx), rx)
    }

    pub fn callback(f: impl Fn(ProgressEvent) + Send + Sync + 'static) -> Self {
        Self::Callback(Arc::new(f))
    }

    pub fn emit(&self, event: ProgressEvent) {
        match self {
            Self::Silent => {}
            Self::Channel(tx) => {
                let _ = tx.try_send(event);
            }
            Self::Callback(f) => f(event),
        }
    }
}

impl std::fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::Silent => "Silent",
            Self::Channel(_) => "Channel",
            Self::Callback(_) => "Callback",
        };
        write!(f, "ProgressSink::{}", kind)
    }
}

/// Returned instead of a result when the caller cancelled the extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("extraction cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// Clonable cancellation flag. Once cancelled, stays cancelled.
#[derive(Clone, Debug)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // Cannot fail: the sender outlives this borrow.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// `Err(Cancelled)` if cancellation has been requested.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use vistalex_core::types::Stage;

    #[tokio::test]
    async fn full_channel_drops_events() {
        let (sink, mut rx) = ProgressSink::channel(1);
        sink.emit(ProgressEvent::entered(Stage::Dispatch));
        sink.emit(ProgressEvent::entered(Stage::Done));

        assert_eq!(rx.recv().await.unwrap().stage, Stage::Dispatch);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn closed_channel_is_ignored() {
        let (sink, rx) = ProgressSink::channel(4);
        drop(rx);
        sink.emit(ProgressEvent::entered(Stage::Ocr));
    }

    #[test]
    fn callback_receives_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let sink = ProgressSink::callback(move |event| seen_clone.lock().unwrap().push(event.percent));

        sink.emit(ProgressEvent::new(Stage::Ocr, 55));
        assert_eq!(*seen.lock().unwrap(), vec![55]);
    }

    #[tokio::test]
    async fn cancel_wakes_waiters() {
        let token = CancelToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };

        assert!(token.check().is_ok());
        token.cancel();
        waiter.await.unwrap();
        assert!(token.is_cancelled());
        assert_eq!(token.check(), Err(Cancelled));
    }

    #[tokio::test]
    async fn already_cancelled_resolves_immediately() {
        let token = CancelToken::new();
        token.cancel();
        token.cancelled().await;
    }
}
