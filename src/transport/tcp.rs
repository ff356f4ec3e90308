use std::net::SocketAddr;

use tokio::io::WriteHalf;
use tokio::net::{TcpListener, TcpStream};

use super::framed::{self, FramedSink};
use super::{InboundHandle, TransportEvents};
use crate::error::Error;
use crate::session::SessionConfig;

/// Connect to a TCP endpoint and return a framed binder for it.
pub async fn connect(
    addr: SocketAddr,
    config: &SessionConfig,
) -> Result<impl FnOnce(InboundHandle) -> Result<FramedSink<WriteHalf<TcpStream>>, Error> + Send + 'static, Error>
{
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true)?;
    tracing::debug!(%addr, "tcp connected");
    Ok(framed::bind(stream, config))
}

/// Listens for framed TCP connections.
#[derive(Debug)]
pub struct TcpAcceptor {
    listener: TcpListener,
    config: SessionConfig,
}

impl TcpAcceptor {
    /// Bind a TCP listener.
    pub async fn listen(addr: SocketAddr, config: &SessionConfig) -> Result<Self, Error> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            config: config.clone(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept a single connection.
    pub async fn accept(
        &self,
    ) -> Result<(TransportEvents, FramedSink<WriteHalf<TcpStream>>, SocketAddr), Error> {
        let (stream, addr) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        tracing::debug!(%addr, "tcp accepted");
        let (events, sink) = framed::accept(stream, &self.config);
        Ok((events, sink, addr))
    }
}
