pub mod attestation;
pub mod crypto;
pub mod error;
pub mod frame;
pub mod session;
pub mod stream;
pub mod transport;

// Re-export key types at crate root for convenience.
pub use error::{Code, Error, Result, SessionError, Status};
pub use frame::{Flags, Frame, FrameType};
pub use session::client::ClientSession;
pub use session::server::ServerSession;
pub use session::{Session, SessionConfig, SessionInfo, SessionState};
pub use stream::{
    waiting_listener, Connected, OutboundSink, SessionEvent, SessionHandle, SessionListener,
    SessionWaiter, StreamSessionClient, StreamSessionServer,
};
pub use transport::{FrameSink, InboundHandle, TransportEvent, TransportEvents};

pub use attestation::{AttestationProvider, AttestationVerifier};

#[cfg(feature = "mock")]
pub use attestation::mock::{MockProvider, MockVerifier, MockVerifierWithMeasurements};
