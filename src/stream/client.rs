use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tracing::Instrument;

use super::driver::Driver;
use super::listener::SessionListener;
use super::sink::{OutboundSink, SessionHandle};
use super::waiter::{waiting_listener, SessionWaiter};
use crate::error::Error;
use crate::session::retry::{with_retry, RetryPolicy};
use crate::session::{Session, SessionConfig};
use crate::transport::{FrameSink, InboundHandle};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Starts sessions over caller-supplied transports.
///
/// `factory` builds one fresh [`Session`] per stream; sessions are never
/// reused or shared.
pub struct StreamSessionClient<F> {
    factory: F,
    config: SessionConfig,
}

/// A session that completed its handshake through
/// [`StreamSessionClient::connect`].
#[derive(Debug)]
pub struct Connected {
    pub sink: OutboundSink,
    pub waiter: SessionWaiter,
    pub handle: SessionHandle,
}

impl<F, S> StreamSessionClient<F>
where
    F: Fn() -> Result<S, Error>,
    S: Session,
{
    pub fn new(factory: F, config: SessionConfig) -> Self {
        Self { factory, config }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Start one session.
    ///
    /// `binder` receives the driver's inbound handle and returns the
    /// transport's outgoing sink. Failures to create the session or bind the
    /// transport are reported through `listener.on_error`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start_session<L, B, K>(&self, mut listener: L, binder: B) -> SessionHandle
    where
        L: SessionListener,
        B: FnOnce(InboundHandle) -> Result<K, Error>,
        K: FrameSink,
    {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        let (command_tx, commands) = mpsc::unbounded_channel();

        let session = match (self.factory)() {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(session = id, error = %e, "session factory failed");
                listener.on_error(e);
                return SessionHandle::new(id, command_tx, None);
            }
        };

        let (inbound, events) = InboundHandle::channel();
        let transport = match binder(inbound) {
            Ok(transport) => transport,
            Err(e) => {
                tracing::warn!(session = id, error = %e, "transport bind failed");
                listener.on_error(e);
                return SessionHandle::new(id, command_tx, None);
            }
        };

        let driver = Driver::new(
            id,
            session,
            transport,
            listener,
            events,
            commands,
            command_tx.clone(),
        );
        let span = tracing::debug_span!("session", id);
        let task = tokio::spawn(driver.run().instrument(span));
        SessionHandle::new(id, command_tx, Some(task))
    }

    /// Start a session and wait for it to open within the handshake timeout.
    ///
    /// `transport` is called once per attempt to produce a fresh binder.
    /// Failed attempts are retried according to the configured retry policy,
    /// each with a new session.
    pub async fn connect<M, Fut, B, K>(&self, mut transport: M) -> Result<Connected, Error>
    where
        M: FnMut() -> Fut,
        Fut: Future<Output = Result<B, Error>>,
        B: FnOnce(InboundHandle) -> Result<K, Error>,
        K: FrameSink,
    {
        let policy = self
            .config
            .retry_policy
            .clone()
            .unwrap_or_else(RetryPolicy::none);

        with_retry(&policy, || {
            let binder = transport();
            async move {
                let binder = binder.await?;
                let (listener, mut waiter) = waiting_listener();
                let handle = self.start_session(listener, binder);
                match waiter.await_open(self.config.handshake_timeout).await {
                    Ok(sink) => Ok(Connected {
                        sink,
                        waiter,
                        handle,
                    }),
                    Err(e) => {
                        handle.abort();
                        Err(e)
                    }
                }
            }
        })
        .await
    }
}
