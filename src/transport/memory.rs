//! In-process transport.
//!
//! A [`MemoryConnector`] opens streams towards a [`MemoryAcceptor`]; each
//! stream is a pair of frame queues, one per direction. Useful for tests and
//! for co-located client and server.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{FrameSink, InboundHandle, TransportEvents};
use crate::error::{Error, SessionError, Status};
use crate::frame::Frame;

/// Create a connected connector/acceptor pair.
pub fn channel() -> (MemoryConnector, MemoryAcceptor) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MemoryConnector { tx }, MemoryAcceptor { rx })
}

/// Client side: opens new streams.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    tx: mpsc::UnboundedSender<MemoryStream>,
}

impl MemoryConnector {
    /// Open a stream whose inbound events go to `inbound`.
    ///
    /// If the acceptor is gone the stream fails immediately with
    /// `UNAVAILABLE` and the returned sink rejects every frame.
    pub fn bind(&self, inbound: InboundHandle) -> Result<MemorySink, Error> {
        let (server_inbound, server_events) = InboundHandle::channel();
        let stream = MemoryStream {
            events: server_events,
            sink: MemorySink::new(inbound.clone()),
        };
        if self.tx.send(stream).is_err() {
            tracing::debug!("memory acceptor closed; stream unavailable");
            inbound.on_error(Status::unavailable("memory acceptor closed"));
        }
        Ok(MemorySink::new(server_inbound))
    }

    /// A binder closure for a single stream.
    pub fn binder(&self) -> impl FnOnce(InboundHandle) -> Result<MemorySink, Error> + Send + 'static {
        let connector = self.clone();
        move |inbound| connector.bind(inbound)
    }
}

/// Server side: yields one [`MemoryStream`] per connection.
#[derive(Debug)]
pub struct MemoryAcceptor {
    rx: mpsc::UnboundedReceiver<MemoryStream>,
}

impl MemoryAcceptor {
    /// Wait for the next stream. `None` once every connector is dropped.
    pub async fn accept(&mut self) -> Option<MemoryStream> {
        self.rx.recv().await
    }
}

/// The accepting end of one in-process stream.
#[derive(Debug)]
pub struct MemoryStream {
    pub events: TransportEvents,
    pub sink: MemorySink,
}

impl MemoryStream {
    pub fn into_parts(self) -> (TransportEvents, MemorySink) {
        (self.events, self.sink)
    }
}

/// Frame sink towards the other end of an in-process stream.
#[derive(Debug)]
pub struct MemorySink {
    peer: Option<InboundHandle>,
}

impl MemorySink {
    fn new(peer: InboundHandle) -> Self {
        Self { peer: Some(peer) }
    }

    fn peer(&self) -> Result<&InboundHandle, Error> {
        match &self.peer {
            Some(peer) if !peer.is_closed() => Ok(peer),
            Some(_) => Err(Status::unavailable("peer stream closed").into()),
            None => Err(SessionError::SinkClosed.into()),
        }
    }
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&mut self, frame: Frame) -> Result<(), Error> {
        self.peer()?.on_frame(frame);
        Ok(())
    }

    async fn complete(&mut self) -> Result<(), Error> {
        if let Some(peer) = self.peer.take() {
            peer.on_completed();
        }
        Ok(())
    }

    async fn fail(&mut self, status: Status) -> Result<(), Error> {
        if let Some(peer) = self.peer.take() {
            peer.on_error(status);
        }
        Ok(())
    }
}
