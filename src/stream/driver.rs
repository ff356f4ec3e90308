//! The per-session state machine between a frame transport and a listener.
//!
//! One driver task owns one [`Session`]. Transport events and caller commands
//! arrive on separate channels and are processed one at a time, so session
//! calls never interleave. Transport events are polled first.

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use super::listener::SessionListener;
use super::sink::{Command, OutboundSink};
use crate::error::{Error, SessionError, Status};
use crate::frame::Frame;
use crate::session::Session;
use crate::transport::{FrameSink, TransportEvent, TransportEvents};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DriverState {
    AwaitingOpen,
    Open,
    Terminated,
}

/// How a terminal failure should reach the peer.
enum PeerNotice {
    /// The transport is already broken or the peer ended the stream.
    None,
    /// End our half of the stream with this status.
    Fail(Status),
}

pub(crate) struct Driver<S, K, L> {
    id: u64,
    state: DriverState,
    session: S,
    transport: K,
    listener: L,
    events: TransportEvents,
    commands: mpsc::UnboundedReceiver<Command>,
    command_tx: mpsc::UnboundedSender<Command>,
    half_closed: bool,
}

impl<S, K, L> Driver<S, K, L>
where
    S: Session,
    K: FrameSink,
    L: SessionListener,
{
    pub(crate) fn new(
        id: u64,
        session: S,
        transport: K,
        listener: L,
        events: TransportEvents,
        commands: mpsc::UnboundedReceiver<Command>,
        command_tx: mpsc::UnboundedSender<Command>,
    ) -> Self {
        Self {
            id,
            state: DriverState::AwaitingOpen,
            session,
            transport,
            listener,
            events,
            commands,
            command_tx,
            half_closed: false,
        }
    }

    pub(crate) async fn run(mut self) {
        tracing::debug!(session = self.id, "session driver started");
        self.start().await;

        while self.state != DriverState::Terminated {
            tokio::select! {
                biased;
                event = self.events.next() => match event {
                    Some(event) => self.on_transport_event(event).await,
                    None => {
                        self.terminate(
                            Err(Status::unavailable("transport dropped the stream").into()),
                            PeerNotice::None,
                        )
                        .await
                    }
                },
                Some(command) = self.commands.recv() => self.on_command(command).await,
            }
        }

        // Pending and late requests observe a closed sink.
        self.commands.close();
        self.events.close();
        tracing::debug!(session = self.id, "session driver finished");
    }

    /// Send whatever the session produced on creation.
    async fn start(&mut self) {
        if let Err(e) = self.flush().await {
            self.terminate(Err(e), PeerNotice::None).await;
            return;
        }
        if self.session.is_open() {
            self.open().await;
        }
    }

    async fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Frame(frame) => self.on_frame(frame).await,
            TransportEvent::Error(e) => {
                tracing::warn!(session = self.id, error = %e, "transport failed");
                self.terminate(Err(e), PeerNotice::None).await;
            }
            TransportEvent::Completed => match self.state {
                DriverState::Open => {
                    tracing::debug!(session = self.id, "peer completed the stream");
                    if !self.half_closed {
                        self.half_closed = true;
                        if let Err(e) = self.transport.complete().await {
                            tracing::debug!(session = self.id, error = %e, "half-close after peer completion failed");
                        }
                    }
                    self.terminate(Ok(()), PeerNotice::None).await;
                }
                DriverState::AwaitingOpen => {
                    tracing::warn!(session = self.id, "peer completed before the session opened");
                    self.terminate(
                        Err(SessionError::CompletedBeforeOpen.into()),
                        PeerNotice::None,
                    )
                    .await;
                }
                DriverState::Terminated => {}
            },
        }
    }

    async fn on_frame(&mut self, frame: Frame) {
        if let Err(e) = self.session.put_incoming_message(frame) {
            tracing::warn!(session = self.id, state = ?self.state, error = %e, "session rejected frame");
            let notice = PeerNotice::Fail(e.to_status());
            self.terminate(Err(e), notice).await;
            return;
        }

        match self.state {
            DriverState::AwaitingOpen => {
                if let Err(e) = self.flush().await {
                    self.terminate(Err(e), PeerNotice::None).await;
                    return;
                }
                if self.session.is_open() {
                    self.open().await;
                }
            }
            DriverState::Open => {
                self.deliver();
                if let Err(e) = self.flush().await {
                    self.terminate(Err(e), PeerNotice::None).await;
                }
            }
            DriverState::Terminated => {}
        }
    }

    async fn open(&mut self) {
        self.state = DriverState::Open;
        tracing::debug!(session = self.id, "session open");
        self.listener
            .on_open(OutboundSink::new(self.command_tx.clone()));
        self.deliver();
        if let Err(e) = self.flush().await {
            self.terminate(Err(e), PeerNotice::None).await;
        }
    }

    /// Hand every available plaintext to the listener, in order.
    fn deliver(&mut self) {
        while let Some(message) = self.session.read() {
            self.listener.on_message(message);
        }
    }

    /// Send every pending outgoing frame. Returns the number sent.
    async fn flush(&mut self) -> Result<usize, Error> {
        let mut sent = 0;
        while let Some(frame) = self.session.outgoing_message() {
            if let Err(e) = self.transport.send(frame).await {
                tracing::warn!(session = self.id, error = %e, "transport send failed");
                return Err(e);
            }
            sent += 1;
        }
        Ok(sent)
    }

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Send { plaintext, reply } => self.on_send(plaintext, reply).await,
            Command::Complete { reply } => {
                let result = self.on_complete().await;
                let _ = reply.send(result);
            }
            Command::Info { reply } => {
                let _ = reply.send(self.session.info());
            }
            Command::BindingToken { info, reply } => {
                let _ = reply.send(self.session.session_binding_token(&info));
            }
            Command::Abort => {
                tracing::debug!(session = self.id, "session aborted locally");
                let error: Error = SessionError::Aborted.into();
                let notice = PeerNotice::Fail(error.to_status());
                self.terminate(Err(error), notice).await;
            }
        }
    }

    async fn on_send(&mut self, plaintext: Bytes, reply: oneshot::Sender<Result<(), Error>>) {
        // Sinks exist only from `open()` on.
        if self.state != DriverState::Open || self.half_closed {
            let _ = reply.send(Err(SessionError::SinkClosed.into()));
            return;
        }

        if let Err(e) = self.session.write(plaintext) {
            tracing::warn!(session = self.id, error = %e, "session write failed");
            let _ = reply.send(Err(e.clone()));
            let notice = PeerNotice::Fail(e.to_status());
            self.terminate(Err(e), notice).await;
            return;
        }

        match self.flush().await {
            Ok(0) => {
                tracing::debug!(session = self.id, "write produced no frames");
                let _ = reply.send(Ok(()));
            }
            Ok(_) => {
                let _ = reply.send(Ok(()));
            }
            Err(e) => {
                let _ = reply.send(Err(e.clone()));
                self.terminate(Err(e), PeerNotice::None).await;
            }
        }
    }

    async fn on_complete(&mut self) -> Result<(), Error> {
        if self.state != DriverState::Open {
            return Err(SessionError::SinkClosed.into());
        }
        if self.half_closed {
            return Ok(());
        }
        self.half_closed = true;
        match self.transport.complete().await {
            Ok(()) => {
                tracing::debug!(session = self.id, "outbound stream completed");
                Ok(())
            }
            Err(e) => {
                self.terminate(Err(e.clone()), PeerNotice::None).await;
                Err(e)
            }
        }
    }

    /// Enter the terminal state and tell the listener. A no-op when already
    /// terminated.
    async fn terminate(&mut self, outcome: Result<(), Error>, notice: PeerNotice) {
        if self.state == DriverState::Terminated {
            return;
        }
        self.state = DriverState::Terminated;

        if let PeerNotice::Fail(status) = notice {
            if !self.half_closed {
                self.half_closed = true;
                if let Err(e) = self.transport.fail(status).await {
                    tracing::debug!(session = self.id, error = %e, "could not notify peer");
                }
            }
        }

        match outcome {
            Ok(()) => {
                tracing::debug!(session = self.id, "session completed");
                self.listener.on_completed();
            }
            Err(e) => {
                tracing::debug!(session = self.id, error = %e, "session terminated");
                self.listener.on_error(e);
            }
        }
    }
}
