use bytes::Bytes;
use tokio::sync::mpsc;

use super::sink::OutboundSink;
use crate::error::Error;

/// Caller-supplied receiver of session events.
///
/// The driver calls `on_open` at most once, then `on_message` for every
/// decrypted plaintext in arrival order, then exactly one of `on_error` or
/// `on_completed`. A session that never opened only ever sees `on_error`.
///
/// Callbacks run on the driver task and must not block.
pub trait SessionListener: Send + 'static {
    /// The handshake completed; `sink` sends plaintext to the peer.
    fn on_open(&mut self, sink: OutboundSink);

    fn on_message(&mut self, message: Bytes);

    /// The session ended with a failure.
    fn on_error(&mut self, error: Error);

    /// The peer finished the stream after the session opened.
    fn on_completed(&mut self);
}

/// Listener callbacks as values.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Open(OutboundSink),
    Message(Bytes),
    Error(Error),
    Completed,
}

impl SessionListener for mpsc::UnboundedSender<SessionEvent> {
    fn on_open(&mut self, sink: OutboundSink) {
        let _ = self.send(SessionEvent::Open(sink));
    }

    fn on_message(&mut self, message: Bytes) {
        let _ = self.send(SessionEvent::Message(message));
    }

    fn on_error(&mut self, error: Error) {
        let _ = self.send(SessionEvent::Error(error));
    }

    fn on_completed(&mut self) {
        let _ = self.send(SessionEvent::Completed);
    }
}
