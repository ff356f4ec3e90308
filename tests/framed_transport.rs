#![cfg(feature = "mock")]

//! Sessions over byte-stream transports.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;

use confidential_session_stream::frame::codec::FrameCodec;
use confidential_session_stream::transport::framed;
use confidential_session_stream::{
    waiting_listener, ClientSession, Code, Error, Frame, FrameSink, MockProvider, MockVerifier,
    ServerSession, SessionConfig, Status, StreamSessionClient, StreamSessionServer,
    TransportEvent,
};

const WAIT: Duration = Duration::from_secs(5);

fn client() -> StreamSessionClient<impl Fn() -> Result<ClientSession, Error>> {
    StreamSessionClient::new(
        || {
            Ok(ClientSession::attested(
                Arc::new(MockVerifier::new()),
                &SessionConfig::default(),
            ))
        },
        SessionConfig::default(),
    )
}

fn echo_upper(request: Bytes) -> Result<Bytes, Status> {
    Ok(Bytes::from(request.to_ascii_uppercase()))
}

#[tokio::test]
async fn request_reply_over_duplex() {
    let (client_io, server_io) = tokio::io::duplex(16 * 1024);
    let config = SessionConfig::default();

    let server = tokio::spawn(async move {
        let server = StreamSessionServer::new(|| {
            Ok(ServerSession::attested(
                Arc::new(MockProvider::new()),
                &SessionConfig::default(),
            ))
        });
        let (events, sink) = framed::accept(server_io, &SessionConfig::default());
        server.serve(events, sink, echo_upper).await
    });

    let (listener, mut waiter) = waiting_listener();
    let _handle = client().start_session(listener, framed::bind(client_io, &config));

    let sink = waiter.await_open(WAIT).await.unwrap();
    sink.send("first").await.unwrap();
    sink.send("second").await.unwrap();
    sink.complete().await.unwrap();

    let replies = waiter.await_completed(WAIT).await.unwrap();
    assert_eq!(
        replies,
        vec![Bytes::from_static(b"FIRST"), Bytes::from_static(b"SECOND")]
    );
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn application_failure_travels_as_error_frame() {
    let (client_io, server_io) = tokio::io::duplex(16 * 1024);
    let config = SessionConfig::default();

    let server = tokio::spawn(async move {
        let server = StreamSessionServer::new(|| {
            Ok(ServerSession::attested(
                Arc::new(MockProvider::new()),
                &SessionConfig::default(),
            ))
        });
        let (events, sink) = framed::accept(server_io, &SessionConfig::default());
        server
            .serve(events, sink, |_| Err(Status::unknown("oops")))
            .await
    });

    let (listener, mut waiter) = waiting_listener();
    let _handle = client().start_session(listener, framed::bind(client_io, &config));

    let sink = waiter.await_open(WAIT).await.unwrap();
    sink.send("anything").await.unwrap();

    let err = waiter.await_completed(WAIT).await.unwrap_err();
    assert_eq!(err.status_code(), Some(Code::Unknown));
    assert!(err.to_string().contains("oops"));
    assert!(server.await.unwrap().is_err());
}

#[tokio::test]
async fn peer_hang_up_before_open_fails_open() {
    let (client_io, server_io) = tokio::io::duplex(1024);
    drop(server_io);

    let (listener, mut waiter) = waiting_listener();
    let _handle = client().start_session(listener, framed::bind(client_io, &SessionConfig::default()));
    assert!(waiter.await_open(WAIT).await.is_err());
}

#[tokio::test]
async fn framed_events_map_eof_and_error_frames() {
    let (left, right) = tokio::io::duplex(1024);
    let (mut events, _sink) = framed::accept(left, &SessionConfig::default());

    let mut writer = tokio_util::codec::FramedWrite::new(right, FrameCodec::new());
    writer
        .send(Frame::hello(0, Bytes::from_static(b"x")))
        .await
        .unwrap();
    assert!(matches!(events.next().await, Some(TransportEvent::Frame(_))));

    writer.send(Frame::error(&Status::internal("bad"))).await.unwrap();
    match events.next().await {
        Some(TransportEvent::Error(e)) => assert_eq!(e.status_code(), Some(Code::Internal)),
        other => panic!("unexpected {other:?}"),
    }

    let (left, mut right) = tokio::io::duplex(1024);
    let (mut events, _sink) = framed::accept(left, &SessionConfig::default());
    right.shutdown().await.unwrap();
    assert!(matches!(events.next().await, Some(TransportEvent::Completed)));
}

#[tokio::test]
async fn framed_sink_refuses_frames_after_complete() {
    let (left, _right) = tokio::io::duplex(1024);
    let (_events, mut sink) = framed::accept(left, &SessionConfig::default());
    sink.complete().await.unwrap();
    assert!(sink
        .send(Frame::hello(0, Bytes::from_static(b"late")))
        .await
        .is_err());
}

#[cfg(feature = "tcp")]
#[tokio::test]
async fn request_reply_over_tcp() {
    use confidential_session_stream::transport::tcp::{self, TcpAcceptor};

    let config = SessionConfig::default();
    let acceptor = TcpAcceptor::listen("127.0.0.1:0".parse().unwrap(), &config)
        .await
        .unwrap();
    let addr = acceptor.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let server = StreamSessionServer::new(|| {
            Ok(ServerSession::attested(
                Arc::new(MockProvider::new()),
                &SessionConfig::default(),
            ))
        });
        let (events, sink, _peer) = acceptor.accept().await.unwrap();
        server.serve(events, sink, echo_upper).await
    });

    let connected = client()
        .connect(|| tcp::connect(addr, &config))
        .await
        .unwrap();
    connected.sink.send("over tcp").await.unwrap();
    connected.sink.complete().await.unwrap();
    let mut waiter = connected.waiter;
    assert_eq!(
        waiter.await_completed(WAIT).await.unwrap(),
        vec![Bytes::from_static(b"OVER TCP")]
    );
    server.await.unwrap().unwrap();
}
