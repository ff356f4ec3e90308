use bytes::Bytes;

use crate::error::{Error, Status};
use crate::session::Session;
use crate::transport::{FrameSink, TransportEvent, TransportEvents};

/// Serves request/response exchanges over one fresh session per stream.
///
/// Every decrypted request is passed to the application; its reply is
/// encrypted and sent back. An application failure ends the stream with the
/// returned status.
pub struct StreamSessionServer<F> {
    factory: F,
}

impl<F, S> StreamSessionServer<F>
where
    F: Fn() -> Result<S, Error>,
    S: Session,
{
    pub fn new(factory: F) -> Self {
        Self { factory }
    }

    /// Drive one stream until the client completes it or it fails.
    ///
    /// Returns `Ok(())` when the client completed the stream and the
    /// responses were completed in turn.
    pub async fn serve<K, A>(
        &self,
        events: TransportEvents,
        responses: K,
        mut application: A,
    ) -> Result<(), Error>
    where
        K: FrameSink,
        A: FnMut(Bytes) -> Result<Bytes, Status>,
    {
        self.serve_with_session(events, responses, |_, request| application(request))
            .await
    }

    /// Like [`serve`](Self::serve), but the application also sees the open
    /// session, e.g. to derive
    /// [`session_binding_token`](Session::session_binding_token)s.
    pub async fn serve_with_session<K, A>(
        &self,
        mut events: TransportEvents,
        mut responses: K,
        mut application: A,
    ) -> Result<(), Error>
    where
        K: FrameSink,
        A: FnMut(&S, Bytes) -> Result<Bytes, Status>,
    {
        let mut session = match (self.factory)() {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "session factory failed");
                let _ = responses.fail(Status::internal(e.to_string())).await;
                return Err(e);
            }
        };

        loop {
            let frame = match events.next().await {
                Some(TransportEvent::Frame(frame)) => frame,
                Some(TransportEvent::Error(e)) => {
                    tracing::debug!(error = %e, "request stream failed");
                    return Err(e);
                }
                Some(TransportEvent::Completed) => {
                    tracing::debug!("request stream completed");
                    flush(&mut session, &mut responses).await?;
                    return responses.complete().await;
                }
                None => return Err(Status::unavailable("request stream dropped").into()),
            };

            if let Err(e) = session.put_incoming_message(frame) {
                tracing::warn!(error = %e, "session rejected request frame");
                let _ = responses.fail(e.to_status()).await;
                return Err(e);
            }

            if session.is_open() {
                while let Some(request) = session.read() {
                    let reply = match application(&session, request) {
                        Ok(reply) => reply,
                        Err(status) => {
                            tracing::debug!(%status, "application failed the stream");
                            flush(&mut session, &mut responses).await?;
                            let _ = responses.fail(status.clone()).await;
                            return Err(status.into());
                        }
                    };
                    if let Err(e) = session.write(reply) {
                        tracing::warn!(error = %e, "session write failed");
                        let _ = responses.fail(e.to_status()).await;
                        return Err(e);
                    }
                }
            }

            flush(&mut session, &mut responses).await?;
        }
    }
}

async fn flush<S: Session, K: FrameSink>(session: &mut S, responses: &mut K) -> Result<(), Error> {
    while let Some(frame) = session.outgoing_message() {
        responses.send(frame).await?;
    }
    Ok(())
}
