use sha2::{Digest, Sha256};

use super::PublicKey;
use crate::frame::PROTOCOL_VERSION;

/// Compute the transcript hash binding the session to attestation and key material.
///
/// `transcript = SHA256(attestation_hash || sorted(pk_a, pk_b) || nonce || version)`
///
/// The sorted public keys ensure both sides compute the same transcript
/// regardless of who initiated.
pub fn compute_transcript(
    attestation_hash: &[u8; 32],
    pk_a: &PublicKey,
    pk_b: &PublicKey,
    nonce: &[u8; 32],
) -> [u8; 32] {
    let mut hasher = Sha256::new();

    hasher.update(attestation_hash);

    if pk_a <= pk_b {
        hasher.update(pk_a);
        hasher.update(pk_b);
    } else {
        hasher.update(pk_b);
        hasher.update(pk_a);
    }

    hasher.update(nonce);
    hasher.update([PROTOCOL_VERSION]);

    hasher.finalize().into()
}
