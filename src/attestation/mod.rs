pub mod types;

#[cfg(feature = "mock")]
pub mod mock;

use crate::error::AttestError;
use types::{AttestationDocument, VerifiedAttestation};

/// Provider that generates attestation evidence (runs inside the TEE, on the
/// serving side of a session).
///
/// Sessions call this synchronously while processing a handshake frame, so
/// implementations should return promptly.
pub trait AttestationProvider: Send + Sync {
    /// Generate an attestation document binding the handshake nonce and the
    /// session public key.
    fn attest(&self, nonce: &[u8], public_key: &[u8]) -> Result<AttestationDocument, AttestError>;
}

/// Verifier that validates attestation evidence (runs on the client side).
pub trait AttestationVerifier: Send + Sync {
    /// Verify an attestation document and return the extracted claims.
    fn verify(&self, doc: &AttestationDocument) -> Result<VerifiedAttestation, AttestError>;
}
