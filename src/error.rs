use std::fmt;
use std::io;
use std::sync::Arc;

/// Errors from frame parsing and encoding.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FrameError {
    #[error("invalid magic bytes: expected 0xCF4D, got 0x{0:04X}")]
    InvalidMagic(u16),

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    #[error("unknown message type: 0x{0:02X}")]
    UnknownMessageType(u8),

    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: u32, max: u32 },

    #[error("header declares {declared} payload bytes, frame carries {actual}")]
    LengthMismatch { declared: u32, actual: u32 },

    #[error("malformed error frame: {0}")]
    MalformedStatus(String),

    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),
}

impl From<io::Error> for FrameError {
    fn from(e: io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}

/// Errors from cryptographic operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CryptoError {
    #[error("HKDF expand failed: invalid length")]
    HkdfExpandFailed,

    #[error("AEAD encryption failed")]
    SealFailed,

    #[error("AEAD decryption failed: ciphertext is invalid or tampered")]
    OpenFailed,

    #[error("nonce overflow: maximum sequence number reached")]
    NonceOverflow,

    #[error("sequence number replay: received {received}, expected > {expected}")]
    SequenceReplay { received: u32, expected: u32 },

    #[error("non-contributory key exchange: peer sent small-subgroup or identity point")]
    NonContributoryKey,
}

/// Errors from attestation operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AttestError {
    #[error("attestation generation failed: {0}")]
    GenerationFailed(String),

    #[error("attestation verification failed: {0}")]
    VerificationFailed(String),

    #[error("attestation public key mismatch")]
    PublicKeyMismatch,

    #[error("missing required field: {0}")]
    MissingField(String),
}

/// Errors from session establishment, the session driver and its sink.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("unexpected message: expected {expected}, got {actual}")]
    UnexpectedMessage {
        expected: &'static str,
        actual: String,
    },

    #[error("session not established")]
    NotEstablished,

    #[error("session closed after an earlier failure")]
    Closed,

    #[error("outbound sink is closed")]
    SinkClosed,

    #[error("stream completed before the session opened")]
    CompletedBeforeOpen,

    #[error("session aborted locally")]
    Aborted,

    #[error("timed out waiting for session {waiting_for}")]
    Timeout { waiting_for: &'static str },

    #[error("plaintext too large: {size} bytes (max {max})")]
    PlaintextTooLarge { size: usize, max: u32 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Transport-level status codes.
///
/// These are the codes a streaming transport attaches to a failed stream. Only
/// the subset this crate produces or interprets is modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Code {
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    Aborted = 10,
    Internal = 13,
    Unavailable = 14,
}

impl Code {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Cancelled,
            3 => Self::InvalidArgument,
            10 => Self::Aborted,
            13 => Self::Internal,
            14 => Self::Unavailable,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cancelled => "CANCELLED",
            Self::Unknown => "UNKNOWN",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::Aborted => "ABORTED",
            Self::Internal => "INTERNAL",
            Self::Unavailable => "UNAVAILABLE",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed-stream status reported by the transport or by the remote peer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct Status {
    pub code: Code,
    pub message: String,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(Code::Unknown, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(Code::Unavailable, message)
    }

    pub fn aborted(message: impl Into<String>) -> Self {
        Self::new(Code::Aborted, message)
    }
}

/// Top-level error type for the crate.
///
/// `Clone` so that one terminal cause can resolve every party waiting on the
/// session (open waiters, completion waiters, pending sends).
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Attestation(#[from] AttestError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("stream failed: {0}")]
    Status(#[from] Status),

    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}

impl Error {
    /// The transport status code, if this error is a failed-stream status.
    pub fn status_code(&self) -> Option<Code> {
        match self {
            Self::Status(status) => Some(status.code),
            _ => None,
        }
    }

    /// Whether the error means the session refused a frame (malformed or
    /// out-of-sequence handshake or record).
    pub fn is_protocol_rejection(&self) -> bool {
        match self {
            Self::Frame(_) | Self::Crypto(_) | Self::Attestation(_) => true,
            Self::Session(e) => matches!(
                e,
                SessionError::HandshakeFailed(_)
                    | SessionError::UnexpectedMessage { .. }
                    | SessionError::NotEstablished
                    | SessionError::Closed
            ),
            Self::Status(_) | Self::Io(_) => false,
        }
    }

    /// The status to report to a remote peer when this error ends a stream
    /// locally.
    pub fn to_status(&self) -> Status {
        match self {
            Self::Status(status) => status.clone(),
            Self::Session(SessionError::Aborted) => Status::new(Code::Cancelled, self.to_string()),
            e if e.is_protocol_rejection() => Status::internal(e.to_string()),
            e => Status::unknown(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
