//! Frame transport over any ordered byte stream.
//!
//! Frames are carried with [`FrameCodec`]. A failure status travels in-band as
//! an `Error` frame; end of stream means the peer completed.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite};

use super::{FrameSink, InboundHandle, TransportEvents};
use crate::error::{Error, SessionError, Status};
use crate::frame::codec::FrameCodec;
use crate::frame::{Frame, FrameType};
use crate::session::SessionConfig;

/// Outgoing half of a framed byte stream.
pub struct FramedSink<W> {
    writer: Option<FramedWrite<W, FrameCodec>>,
}

impl<W> std::fmt::Debug for FramedSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramedSink")
            .field("closed", &self.writer.is_none())
            .finish()
    }
}

impl<W: AsyncWrite + Send + Unpin + 'static> FramedSink<W> {
    fn writer(&mut self) -> Result<&mut FramedWrite<W, FrameCodec>, Error> {
        self.writer
            .as_mut()
            .ok_or_else(|| SessionError::SinkClosed.into())
    }
}

#[async_trait]
impl<W: AsyncWrite + Send + Unpin + 'static> FrameSink for FramedSink<W> {
    async fn send(&mut self, frame: Frame) -> Result<(), Error> {
        self.writer()?.send(frame).await?;
        Ok(())
    }

    async fn complete(&mut self) -> Result<(), Error> {
        if let Some(mut writer) = self.writer.take() {
            // Flushes pending frames, then shuts down the write half.
            writer.close().await?;
        }
        Ok(())
    }

    async fn fail(&mut self, status: Status) -> Result<(), Error> {
        if let Some(mut writer) = self.writer.take() {
            writer.send(Frame::error(&status)).await?;
            writer.close().await?;
        }
        Ok(())
    }
}

/// Spawn the read loop for `reader`, forwarding events to `inbound`.
fn spawn_reader<R>(reader: R, max_payload_size: u32, inbound: InboundHandle)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let mut frames = FramedRead::new(reader, FrameCodec::with_max_payload_size(max_payload_size));
    tokio::spawn(async move {
        loop {
            let next = tokio::select! {
                next = frames.next() => next,
                _ = inbound.closed() => {
                    tracing::trace!("session gone; stopping framed reader");
                    return;
                }
            };
            match next {
                Some(Ok(frame)) if frame.header.msg_type == FrameType::Error => {
                    match frame.status() {
                        Ok(status) => inbound.on_error(status),
                        Err(e) => inbound.on_error(e),
                    }
                    return;
                }
                Some(Ok(frame)) => inbound.on_frame(frame),
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "framed read failed");
                    inbound.on_error(e);
                    return;
                }
                None => {
                    inbound.on_completed();
                    return;
                }
            }
        }
    });
}

fn split<T>(io: T, config: &SessionConfig, inbound: InboundHandle) -> FramedSink<WriteHalf<T>>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer): (ReadHalf<T>, WriteHalf<T>) = tokio::io::split(io);
    spawn_reader(reader, config.max_payload_size, inbound);
    FramedSink {
        writer: Some(FramedWrite::new(
            writer,
            FrameCodec::with_max_payload_size(config.max_payload_size),
        )),
    }
}

/// A binder for the connecting side of `io`.
///
/// Binding spawns the read loop, so it must run inside a tokio runtime.
pub fn bind<T>(
    io: T,
    config: &SessionConfig,
) -> impl FnOnce(InboundHandle) -> Result<FramedSink<WriteHalf<T>>, Error> + Send + 'static
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    let config = config.clone();
    move |inbound| Ok(split(io, &config, inbound))
}

/// The accepting side of `io`: its inbound events and its outgoing sink.
pub fn accept<T>(io: T, config: &SessionConfig) -> (TransportEvents, FramedSink<WriteHalf<T>>)
where
    T: AsyncRead + AsyncWrite + Send + 'static,
{
    let (inbound, events) = InboundHandle::channel();
    (events, split(io, config, inbound))
}
