#![cfg(feature = "mock")]

//! End-to-end request/response streams over the in-memory transport.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use confidential_session_stream::transport::memory::{self, MemoryAcceptor};
use confidential_session_stream::{
    waiting_listener, ClientSession, Code, Error, MockProvider, MockVerifier, ServerSession,
    Session, SessionConfig, SessionError, SessionEvent, SessionState, Status, StreamSessionClient,
    StreamSessionServer,
};

const WAIT: Duration = Duration::from_secs(5);

fn pong(request: Bytes) -> Result<Bytes, Status> {
    let text = String::from_utf8_lossy(&request);
    Ok(Bytes::from(format!("PONG: {text}")))
}

fn spawn_server<A>(mut acceptor: MemoryAcceptor, application: A) -> JoinHandle<Result<(), Error>>
where
    A: FnMut(Bytes) -> Result<Bytes, Status> + Send + 'static,
{
    tokio::spawn(async move {
        let server = StreamSessionServer::new(|| {
            Ok(ServerSession::attested(
                Arc::new(MockProvider::new()),
                &SessionConfig::default(),
            ))
        });
        let stream = acceptor
            .accept()
            .await
            .ok_or_else(|| Error::from(Status::unavailable("no stream")))?;
        let (events, sink) = stream.into_parts();
        server.serve(events, sink, application).await
    })
}

fn attested_client() -> StreamSessionClient<impl Fn() -> Result<ClientSession, Error>> {
    let config = SessionConfig::default();
    StreamSessionClient::new(
        || {
            Ok(ClientSession::attested(
                Arc::new(MockVerifier::new()),
                &SessionConfig::default(),
            ))
        },
        config,
    )
}

#[tokio::test]
async fn single_request_gets_one_reply_then_completes() {
    let (connector, acceptor) = memory::channel();
    let server = spawn_server(acceptor, pong);

    let client = attested_client();
    let (listener, mut waiter) = waiting_listener();
    let _handle = client.start_session(listener, connector.binder());

    let sink = waiter.await_open(WAIT).await.unwrap();
    sink.send("Hello World").await.unwrap();
    sink.complete().await.unwrap();

    let replies = waiter.await_completed(WAIT).await.unwrap();
    assert_eq!(replies, vec![Bytes::from_static(b"PONG: Hello World")]);
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn replies_preserve_request_order() {
    let (connector, acceptor) = memory::channel();
    let server = spawn_server(acceptor, pong);

    let client = attested_client();
    let (listener, mut waiter) = waiting_listener();
    let _handle = client.start_session(listener, connector.binder());

    let sink = waiter.await_open(WAIT).await.unwrap();
    for msg in ["Hello World", "Hello World 2", "Hello World 3"] {
        sink.send(msg).await.unwrap();
    }
    sink.complete().await.unwrap();

    let replies = waiter.await_completed(WAIT).await.unwrap();
    assert_eq!(
        replies,
        vec![
            Bytes::from_static(b"PONG: Hello World"),
            Bytes::from_static(b"PONG: Hello World 2"),
            Bytes::from_static(b"PONG: Hello World 3"),
        ]
    );
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn unavailable_transport_fails_open() {
    let (connector, acceptor) = memory::channel();
    drop(acceptor);

    let client = attested_client();
    let (events, mut rx) = mpsc::unbounded_channel();
    let handle = client.start_session(events, connector.binder());
    handle.join().await;

    match rx.recv().await {
        Some(SessionEvent::Error(e)) => assert_eq!(e.status_code(), Some(Code::Unavailable)),
        other => panic!("expected unavailable error, got {other:?}"),
    }
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn unavailable_transport_fails_await_open() {
    let (connector, acceptor) = memory::channel();
    drop(acceptor);

    let client = attested_client();
    let (listener, mut waiter) = waiting_listener();
    let _handle = client.start_session(listener, connector.binder());

    let err = waiter.await_open(WAIT).await.unwrap_err();
    assert_eq!(err.status_code(), Some(Code::Unavailable));
}

#[tokio::test]
async fn peer_fault_fails_completion_and_stops_delivery() {
    let (connector, acceptor) = memory::channel();
    let server = spawn_server(acceptor, |request: Bytes| {
        if &request[..] == b"boom" {
            return Err(Status::unknown("oops"));
        }
        pong(request)
    });

    let client = attested_client();
    let (events, mut rx) = mpsc::unbounded_channel();
    let _handle = client.start_session(events, connector.binder());

    let sink = match rx.recv().await {
        Some(SessionEvent::Open(sink)) => sink,
        other => panic!("expected open, got {other:?}"),
    };
    sink.send("Hello World").await.unwrap();
    sink.send("boom").await.unwrap();

    match rx.recv().await {
        Some(SessionEvent::Message(m)) => assert_eq!(&m[..], b"PONG: Hello World"),
        other => panic!("expected first reply, got {other:?}"),
    }
    match rx.recv().await {
        Some(SessionEvent::Error(e)) => {
            assert_eq!(e.status_code(), Some(Code::Unknown));
            assert!(e.to_string().contains("oops"));
        }
        other => panic!("expected stream failure, got {other:?}"),
    }
    assert!(rx.recv().await.is_none());

    let err = sink.send("after").await.unwrap_err();
    assert!(matches!(err, Error::Session(SessionError::SinkClosed)));

    let served = server.await.unwrap();
    assert_eq!(served.unwrap_err().status_code(), Some(Code::Unknown));
}

#[tokio::test]
async fn peer_fault_fails_await_completed() {
    let (connector, acceptor) = memory::channel();
    let server = spawn_server(acceptor, |_| Err(Status::unknown("oops")));

    let client = attested_client();
    let (listener, mut waiter) = waiting_listener();
    let _handle = client.start_session(listener, connector.binder());

    let sink = waiter.await_open(WAIT).await.unwrap();
    sink.send("Hello World").await.unwrap();
    let _ = sink.complete().await;

    let err = waiter.await_completed(WAIT).await.unwrap_err();
    assert_eq!(err.status_code(), Some(Code::Unknown));
    assert!(server.await.unwrap().is_err());
}

#[tokio::test]
async fn unattested_pair_exchanges_messages() {
    let (connector, mut acceptor) = memory::channel();
    let server = tokio::spawn(async move {
        let server = StreamSessionServer::new(|| Ok(ServerSession::unattested(&SessionConfig::default())));
        let (events, sink) = acceptor.accept().await.unwrap().into_parts();
        server.serve(events, sink, pong).await
    });

    let client = StreamSessionClient::new(
        || Ok(ClientSession::unattested(&SessionConfig::default())),
        SessionConfig::default(),
    );
    let connected = client
        .connect(|| {
            let binder = connector.binder();
            async move { Ok(binder) }
        })
        .await
        .unwrap();

    connected.sink.send("plain").await.unwrap();
    connected.sink.complete().await.unwrap();
    let mut waiter = connected.waiter;
    let replies = waiter.await_completed(WAIT).await.unwrap();
    assert_eq!(replies, vec![Bytes::from_static(b"PONG: plain")]);
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn both_peers_derive_the_same_binding_token() {
    let (connector, mut acceptor) = memory::channel();
    let server = tokio::spawn(async move {
        let server = StreamSessionServer::new(|| {
            Ok(ServerSession::attested(
                Arc::new(MockProvider::new()),
                &SessionConfig::default(),
            ))
        });
        let (events, sink) = acceptor.accept().await.unwrap().into_parts();
        server
            .serve_with_session(events, sink, |session: &ServerSession, info: Bytes| {
                session
                    .session_binding_token(&info)
                    .map(|token| Bytes::copy_from_slice(&token))
                    .map_err(|e| Status::internal(e.to_string()))
            })
            .await
    });

    let client = attested_client();
    let (listener, mut waiter) = waiting_listener();
    let _handle = client.start_session(listener, connector.binder());
    let sink = waiter.await_open(WAIT).await.unwrap();

    let info = sink.session_info().await.unwrap();
    assert_eq!(info.state, SessionState::Open);
    assert!(info.session_id.is_some());
    assert!(info.peer_attestation.unwrap().public_key.is_some());
    assert!(sink.is_open().await);

    let ours = sink.binding_token("request-42").await.unwrap();
    assert_ne!(ours, sink.binding_token("request-43").await.unwrap());
    sink.send("request-42").await.unwrap();
    sink.complete().await.unwrap();

    let replies = waiter.await_completed(WAIT).await.unwrap();
    assert_eq!(replies, vec![Bytes::copy_from_slice(&ours)]);
    server.await.unwrap().unwrap();

    assert!(!sink.is_open().await);
    assert!(matches!(
        sink.binding_token("request-42").await,
        Err(Error::Session(SessionError::Closed))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cloned_sinks_on_many_threads_keep_per_sender_order() {
    let (connector, acceptor) = memory::channel();
    let server = spawn_server(acceptor, Ok);

    let client = attested_client();
    let (listener, mut waiter) = waiting_listener();
    let _handle = client.start_session(listener, connector.binder());
    let sink = waiter.await_open(WAIT).await.unwrap();

    let senders: Vec<_> = (0u8..8)
        .map(|t| {
            let sink = sink.clone();
            tokio::spawn(async move {
                for i in 0u8..100 {
                    sink.send(Bytes::from(vec![t, i])).await.unwrap();
                }
            })
        })
        .collect();
    for sender in senders {
        sender.await.unwrap();
    }
    sink.complete().await.unwrap();

    let replies = waiter.await_completed(WAIT).await.unwrap();
    assert_eq!(replies.len(), 800);
    for t in 0u8..8 {
        let from_sender: Vec<u8> = replies
            .iter()
            .filter(|r| r[0] == t)
            .map(|r| r[1])
            .collect();
        assert_eq!(from_sender, (0u8..100).collect::<Vec<_>>(), "sender {t}");
    }
    server.await.unwrap().unwrap();

    assert!(matches!(
        sink.send("late").await,
        Err(Error::Session(SessionError::SinkClosed))
    ));
}
