//! Bidirectional frame transports.
//!
//! A transport delivers peer frames to a session through an [`InboundHandle`]
//! and accepts outgoing frames through a [`FrameSink`]. Frames are opaque here;
//! only sessions interpret them.

pub mod framed;
pub mod memory;

/// TCP transport helpers (connect, listen, accept).
#[cfg(feature = "tcp")]
pub mod tcp;

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{Error, Status};
use crate::frame::Frame;

/// One inbound occurrence on a transport.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A frame from the peer.
    Frame(Frame),
    /// The stream failed. Terminal.
    Error(Error),
    /// The peer finished sending. Terminal.
    Completed,
}

/// Inbound callback interface of a session.
///
/// Cloneable and non-blocking, so transports may call it from any task or
/// thread. Events posted after the receiving side has terminated are dropped.
#[derive(Debug, Clone)]
pub struct InboundHandle {
    tx: mpsc::UnboundedSender<TransportEvent>,
}

impl InboundHandle {
    /// Create a handle together with the receiving end the session drains.
    pub fn channel() -> (InboundHandle, TransportEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        (InboundHandle { tx }, TransportEvents { rx })
    }

    pub fn on_frame(&self, frame: Frame) {
        self.post(TransportEvent::Frame(frame));
    }

    pub fn on_error(&self, error: impl Into<Error>) {
        self.post(TransportEvent::Error(error.into()));
    }

    pub fn on_completed(&self) {
        self.post(TransportEvent::Completed);
    }

    /// Whether the receiving side is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the receiving side is gone.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    fn post(&self, event: TransportEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("inbound event after session terminated; dropped");
        }
    }
}

/// Receiving end of an [`InboundHandle`].
///
/// Yields `None` once every handle is dropped.
#[derive(Debug)]
pub struct TransportEvents {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl TransportEvents {
    pub async fn next(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }

    /// Stop accepting events. Already queued events can still be drained.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

impl futures::Stream for TransportEvents {
    type Item = TransportEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Outgoing half of a transport.
#[async_trait]
pub trait FrameSink: Send + 'static {
    /// Hand one frame to the transport.
    async fn send(&mut self, frame: Frame) -> Result<(), Error>;

    /// Half-close: no more frames will be sent.
    async fn complete(&mut self) -> Result<(), Error>;

    /// End the stream towards the peer with a failure status.
    async fn fail(&mut self, status: Status) -> Result<(), Error> {
        tracing::debug!(%status, "transport cannot carry a status; half-closing");
        self.complete().await
    }
}

#[async_trait]
impl FrameSink for Box<dyn FrameSink> {
    async fn send(&mut self, frame: Frame) -> Result<(), Error> {
        (**self).send(frame).await
    }

    async fn complete(&mut self) -> Result<(), Error> {
        (**self).complete().await
    }

    async fn fail(&mut self, status: Status) -> Result<(), Error> {
        (**self).fail(status).await
    }
}
