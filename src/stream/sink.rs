use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{Error, SessionError};
use crate::session::{SessionInfo, SessionState};

/// Requests from callers to a session driver.
#[derive(Debug)]
pub(crate) enum Command {
    Send {
        plaintext: Bytes,
        reply: oneshot::Sender<Result<(), Error>>,
    },
    Complete {
        reply: oneshot::Sender<Result<(), Error>>,
    },
    Info {
        reply: oneshot::Sender<SessionInfo>,
    },
    BindingToken {
        info: Bytes,
        reply: oneshot::Sender<Result<[u8; 32], Error>>,
    },
    Abort,
}

async fn query_info(commands: &mpsc::UnboundedSender<Command>) -> Result<SessionInfo, Error> {
    let (reply, rx) = oneshot::channel();
    commands
        .send(Command::Info { reply })
        .map_err(|_| SessionError::Closed)?;
    Ok(rx.await.map_err(|_| SessionError::Closed)?)
}

/// Sends plaintext to the peer of an open session.
///
/// Handed out by `on_open`. Clones share one stream: once any clone calls
/// [`complete`](Self::complete), every clone rejects further sends.
#[derive(Debug, Clone)]
pub struct OutboundSink {
    commands: mpsc::UnboundedSender<Command>,
    completed: Arc<AtomicBool>,
}

impl OutboundSink {
    pub(crate) fn new(commands: mpsc::UnboundedSender<Command>) -> Self {
        Self {
            commands,
            completed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Encrypt `plaintext` and hand the resulting frames to the transport.
    ///
    /// Fails with [`SessionError::SinkClosed`] once the session has
    /// terminated or the sink was completed.
    pub async fn send(&self, plaintext: impl Into<Bytes>) -> Result<(), Error> {
        if self.completed.load(Ordering::Acquire) {
            return Err(SessionError::SinkClosed.into());
        }
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Send {
                plaintext: plaintext.into(),
                reply,
            })
            .map_err(|_| SessionError::SinkClosed)?;
        rx.await.map_err(|_| SessionError::SinkClosed)?
    }

    /// Half-close the stream towards the peer. The session stays up to
    /// receive the peer's remaining messages.
    pub async fn complete(&self) -> Result<(), Error> {
        if self.completed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Complete { reply })
            .map_err(|_| SessionError::SinkClosed)?;
        rx.await.map_err(|_| SessionError::SinkClosed)?
    }

    pub fn is_closed(&self) -> bool {
        self.completed.load(Ordering::Acquire) || self.commands.is_closed()
    }

    /// State, session id and peer evidence of the session behind this sink.
    ///
    /// Answered by the driver in turn with sends and inbound frames. Fails
    /// with [`SessionError::Closed`] once the session has terminated.
    pub async fn session_info(&self) -> Result<SessionInfo, Error> {
        query_info(&self.commands).await
    }

    /// Whether the session behind this sink still accepts records. Stays
    /// `true` after [`complete`](Self::complete) until the driver terminates.
    pub async fn is_open(&self) -> bool {
        matches!(
            self.session_info().await,
            Ok(SessionInfo {
                state: SessionState::Open,
                ..
            })
        )
    }

    /// A token bound to this session and `info`. The peer derives the same
    /// value from its own session.
    pub async fn binding_token(&self, info: impl Into<Bytes>) -> Result<[u8; 32], Error> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::BindingToken {
                info: info.into(),
                reply,
            })
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)?
    }
}

/// Control handle for a started session.
#[derive(Debug)]
pub struct SessionHandle {
    id: u64,
    commands: mpsc::UnboundedSender<Command>,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub(crate) fn new(
        id: u64,
        commands: mpsc::UnboundedSender<Command>,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self { id, commands, task }
    }

    /// Driver-local session number, as used in log fields.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Terminate the session locally. The listener sees
    /// [`SessionError::Aborted`]; the peer sees a cancelled stream.
    pub fn abort(&self) {
        let _ = self.commands.send(Command::Abort);
    }

    /// Same as [`OutboundSink::session_info`], also usable while the
    /// handshake is still running.
    pub async fn session_info(&self) -> Result<SessionInfo, Error> {
        query_info(&self.commands).await
    }

    pub fn is_finished(&self) -> bool {
        match &self.task {
            Some(task) => task.is_finished(),
            None => true,
        }
    }

    /// Wait for the driver to terminate.
    pub async fn join(self) {
        if let Some(task) = self.task {
            if let Err(e) = task.await {
                tracing::warn!(session = self.id, error = %e, "session driver task failed");
            }
        }
    }
}
