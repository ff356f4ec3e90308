pub mod client;
pub mod handshake;
pub mod record;
pub mod retry;
pub mod server;

use std::time::Duration;

use bytes::Bytes;

use crate::attestation::types::{ExpectedMeasurements, VerifiedAttestation};
use crate::error::{Error, SessionError};
use crate::frame::Frame;

use self::retry::RetryPolicy;

/// Lifecycle of a handshake + record session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Handshake frames are still being exchanged.
    Handshaking,
    /// Keys are established; application data flows.
    Open,
    /// A frame was rejected or a write failed. Every further call fails.
    Closed,
}

/// One handshake + transport cryptographic session.
///
/// A session is a pure state machine: it never performs I/O. Frames produced
/// by the peer go in through [`put_incoming_message`](Session::put_incoming_message),
/// decrypted application data comes out of [`read`](Session::read), plaintext
/// to protect goes in through [`write`](Session::write), and every frame that
/// must reach the peer comes out of [`outgoing_message`](Session::outgoing_message).
///
/// Sessions are not safe for concurrent use. All methods take `&mut self`, so
/// whoever owns the session decides how access is serialized.
pub trait Session: Send + 'static {
    /// Whether the handshake has completed.
    fn is_open(&self) -> bool;

    /// Feed one frame received from the peer. An error means the frame was
    /// rejected; the session is unusable afterwards.
    fn put_incoming_message(&mut self, frame: Frame) -> Result<(), Error>;

    /// Take the next decrypted application message, if any.
    fn read(&mut self) -> Option<Bytes>;

    /// Encrypt an application message for the peer.
    fn write(&mut self, plaintext: Bytes) -> Result<(), Error>;

    /// Take the next frame that must be sent to the peer, if any.
    fn outgoing_message(&mut self) -> Option<Frame>;

    fn state(&self) -> SessionState {
        if self.is_open() {
            SessionState::Open
        } else {
            SessionState::Handshaking
        }
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            state: self.state(),
            session_id: None,
            peer_attestation: None,
        }
    }

    /// A 32-byte token bound to this session and `info`, equal on both
    /// peers. Only available while open.
    fn session_binding_token(&self, _info: &[u8]) -> Result<[u8; 32], Error> {
        Err(SessionError::NotEstablished.into())
    }
}

/// What a session exposes about itself once it is owned by a driver.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub state: SessionState,
    /// Shared by both peers once open.
    pub session_id: Option<[u8; 32]>,
    /// The responder's verified evidence, on an attested initiator.
    pub peer_attestation: Option<VerifiedAttestation>,
}

/// Configuration for a secure session.
///
/// The cipher suite is always X25519 + HKDF-SHA256 + ChaCha20-Poly1305.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum frame payload size in bytes (default: 32 MiB).
    pub max_payload_size: u32,

    /// Maximum time a caller waits for the session to open (default: 30s).
    pub handshake_timeout: Duration,

    /// Maximum time a caller waits for the stream to finish (default: 60s).
    pub completion_timeout: Duration,

    /// Optional retry policy for connection attempts.
    pub retry_policy: Option<RetryPolicy>,

    /// Optional expected measurements to verify against the peer's attestation.
    pub expected_measurements: Option<ExpectedMeasurements>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_payload_size: crate::frame::MAX_PAYLOAD_SIZE,
            handshake_timeout: Duration::from_secs(30),
            completion_timeout: Duration::from_secs(60),
            retry_policy: None,
            expected_measurements: None,
        }
    }
}

impl SessionConfig {
    /// Create a builder for constructing a `SessionConfig`.
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug, Clone, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.config.max_payload_size = size;
        self
    }

    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    pub fn completion_timeout(mut self, timeout: Duration) -> Self {
        self.config.completion_timeout = timeout;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry_policy = Some(policy);
        self
    }

    pub fn expected_measurements(mut self, measurements: ExpectedMeasurements) -> Self {
        self.config.expected_measurements = Some(measurements);
        self
    }

    /// Build the `SessionConfig`, validating that all values are sensible.
    pub fn build(self) -> Result<SessionConfig, Error> {
        fn invalid(msg: &str) -> Result<SessionConfig, Error> {
            Err(SessionError::InvalidConfig(msg.into()).into())
        }
        let config = self.config;
        if config.max_payload_size as usize <= crate::crypto::seal::TAG_LEN {
            return invalid("max_payload_size must exceed the AEAD tag length");
        }
        if config.max_payload_size > crate::frame::MAX_PAYLOAD_SIZE {
            return invalid("max_payload_size exceeds the protocol maximum");
        }
        if config.handshake_timeout.is_zero() {
            return invalid("handshake_timeout must be > 0");
        }
        if config.completion_timeout.is_zero() {
            return invalid("completion_timeout must be > 0");
        }
        Ok(config)
    }
}
