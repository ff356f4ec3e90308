use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;

use super::listener::SessionListener;
use super::sink::OutboundSink;
use crate::error::{Error, SessionError};

/// A listener that records events for a [`SessionWaiter`].
pub fn waiting_listener() -> (WaitingListener, SessionWaiter) {
    let (open_tx, open_rx) = oneshot::channel();
    let (done_tx, done_rx) = oneshot::channel();
    (
        WaitingListener {
            open: Some(open_tx),
            done: Some(done_tx),
            messages: Vec::new(),
        },
        SessionWaiter {
            open: Pending::Waiting(open_rx),
            done: Pending::Waiting(done_rx),
        },
    )
}

#[derive(Debug)]
pub struct WaitingListener {
    open: Option<oneshot::Sender<Result<OutboundSink, Error>>>,
    done: Option<oneshot::Sender<Result<Vec<Bytes>, Error>>>,
    messages: Vec<Bytes>,
}

impl SessionListener for WaitingListener {
    fn on_open(&mut self, sink: OutboundSink) {
        if let Some(open) = self.open.take() {
            let _ = open.send(Ok(sink));
        }
    }

    fn on_message(&mut self, message: Bytes) {
        self.messages.push(message);
    }

    fn on_error(&mut self, error: Error) {
        if let Some(open) = self.open.take() {
            let _ = open.send(Err(error.clone()));
        }
        if let Some(done) = self.done.take() {
            let _ = done.send(Err(error));
        }
    }

    fn on_completed(&mut self) {
        if let Some(open) = self.open.take() {
            let _ = open.send(Err(SessionError::CompletedBeforeOpen.into()));
        }
        if let Some(done) = self.done.take() {
            let _ = done.send(Ok(std::mem::take(&mut self.messages)));
        }
    }
}

#[derive(Debug)]
enum Pending<T> {
    Waiting(oneshot::Receiver<Result<T, Error>>),
    Resolved(Result<T, Error>),
}

impl<T: Clone> Pending<T> {
    async fn wait(&mut self, timeout: Duration, waiting_for: &'static str) -> Result<T, Error> {
        if let Pending::Waiting(rx) = self {
            let outcome = match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(outcome)) => outcome,
                // The listener was dropped without a terminal callback.
                Ok(Err(_)) => Err(SessionError::Closed.into()),
                Err(_) => return Err(SessionError::Timeout { waiting_for }.into()),
            };
            *self = Pending::Resolved(outcome);
        }
        match self {
            Pending::Resolved(outcome) => outcome.clone(),
            Pending::Waiting(_) => Err(SessionError::Closed.into()),
        }
    }
}

/// Await the milestones of a session started with a [`WaitingListener`].
///
/// A timeout only ends the wait; the session keeps running and a later call
/// may still succeed.
#[derive(Debug)]
pub struct SessionWaiter {
    open: Pending<OutboundSink>,
    done: Pending<Vec<Bytes>>,
}

impl SessionWaiter {
    /// Wait until the session opens.
    pub async fn await_open(&mut self, timeout: Duration) -> Result<OutboundSink, Error> {
        self.open.wait(timeout, "open").await
    }

    /// Wait until the session ends; returns every plaintext received.
    pub async fn await_completed(&mut self, timeout: Duration) -> Result<Vec<Bytes>, Error> {
        self.done.wait(timeout, "completion").await
    }
}
