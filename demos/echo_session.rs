use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tracing_subscriber::EnvFilter;

use confidential_session_stream::transport::tcp::{self, TcpAcceptor};
use confidential_session_stream::{
    ClientSession, MockProvider, MockVerifier, ServerSession, SessionConfig, StreamSessionClient,
    StreamSessionServer,
};

/// Attested echo stream over TCP with mock attestation.
///
/// Run with: `RUST_LOG=debug cargo run --example echo_session --features mock,tcp`
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = SessionConfig::builder().build()?;
    let addr: SocketAddr = "127.0.0.1:0".parse()?;
    let acceptor = TcpAcceptor::listen(addr, &config).await?;
    let addr = acceptor.local_addr()?;
    tracing::info!(%addr, "echo server listening");

    let server = tokio::spawn(async move {
        let server = StreamSessionServer::new(|| {
            Ok(ServerSession::attested(
                Arc::new(MockProvider::new()),
                &SessionConfig::default(),
            ))
        });
        let (events, sink, peer) = acceptor.accept().await?;
        tracing::info!(%peer, "accepted stream");
        server
            .serve(events, sink, |request| {
                tracing::info!(request = %String::from_utf8_lossy(&request), "echoing");
                Ok(request)
            })
            .await
    });

    let client_config = config.clone();
    let client = StreamSessionClient::new(
        move || {
            Ok(ClientSession::attested(
                Arc::new(MockVerifier::new()),
                &client_config,
            ))
        },
        config.clone(),
    );
    let connected = client.connect(|| tcp::connect(addr, &config)).await?;
    tracing::info!("session open");

    for i in 0..3 {
        connected
            .sink
            .send(Bytes::from(format!("echo request #{i}")))
            .await?;
    }
    connected.sink.complete().await?;

    let mut waiter = connected.waiter;
    for reply in waiter.await_completed(config.completion_timeout).await? {
        tracing::info!(reply = %String::from_utf8_lossy(&reply), "received");
    }

    server.await??;
    tracing::info!("done");
    Ok(())
}
