//! Handshake message layout and key-schedule helpers.
//!
//! The handshake is three `Hello` frames:
//!
//! 1. initiator hello (seq 0): `1 || initiator_pk || initiator_nonce`
//! 2. responder hello (seq 0): `2 || responder_pk || responder_nonce || doc_len || attestation_doc`
//! 3. confirmation (seq 1): `3 || SHA256("css-confirmation" || session_id || keys)`
//!
//! The initiator opens after processing (2); the responder after verifying (3).

use bytes::{Buf, BufMut, Bytes, BytesMut};
use hkdf::Hkdf;
use sha2::{Digest, Sha256};

use crate::attestation::types::AttestationDocument;
use crate::crypto::SymmetricKey;
use crate::error::{CryptoError, Error, SessionError};
use crate::frame::{Frame, FrameType};

/// Maximum attestation document size accepted during handshake (64 KiB).
pub const MAX_ATTESTATION_DOC_SIZE: usize = 64 * 1024;

pub const INITIATOR_HELLO_LEN: usize = 1 + 32 + 32;
pub const RESPONDER_HELLO_MIN_LEN: usize = 1 + 32 + 32 + 4;
pub const CONFIRMATION_LEN: usize = 1 + 32;

pub fn encode_initiator_hello(public_key: &[u8; 32], nonce: &[u8; 32]) -> Bytes {
    let mut buf = BytesMut::with_capacity(INITIATOR_HELLO_LEN);
    buf.put_u8(1);
    buf.put_slice(public_key);
    buf.put_slice(nonce);
    buf.freeze()
}

pub fn encode_responder_hello(
    public_key: &[u8; 32],
    nonce: &[u8; 32],
    attestation_doc: &[u8],
) -> Bytes {
    let mut buf = BytesMut::with_capacity(RESPONDER_HELLO_MIN_LEN + attestation_doc.len());
    buf.put_u8(2);
    buf.put_slice(public_key);
    buf.put_slice(nonce);
    buf.put_u32(attestation_doc.len() as u32);
    buf.put_slice(attestation_doc);
    buf.freeze()
}

pub fn encode_confirmation(confirmation_hash: &[u8; 32]) -> Bytes {
    let mut buf = BytesMut::with_capacity(CONFIRMATION_LEN);
    buf.put_u8(3);
    buf.put_slice(confirmation_hash);
    buf.freeze()
}

fn split_key_and_nonce(payload: &[u8]) -> ([u8; 32], [u8; 32]) {
    let mut pk = [0u8; 32];
    let mut nonce = [0u8; 32];
    pk.copy_from_slice(&payload[1..33]);
    nonce.copy_from_slice(&payload[33..65]);
    (pk, nonce)
}

pub fn parse_initiator_hello(payload: &[u8]) -> Result<([u8; 32], [u8; 32]), SessionError> {
    if payload.len() != INITIATOR_HELLO_LEN {
        return Err(SessionError::HandshakeFailed(format!(
            "initiator hello: expected {INITIATOR_HELLO_LEN} bytes, got {}",
            payload.len()
        )));
    }
    if payload[0] != 1 {
        return Err(SessionError::UnexpectedMessage {
            expected: "initiator_hello (1)",
            actual: format!("message type {}", payload[0]),
        });
    }
    Ok(split_key_and_nonce(payload))
}

pub fn parse_responder_hello(
    payload: &[u8],
) -> Result<([u8; 32], [u8; 32], AttestationDocument), SessionError> {
    if payload.len() < RESPONDER_HELLO_MIN_LEN {
        return Err(SessionError::HandshakeFailed(
            "responder hello too short".into(),
        ));
    }
    if payload[0] != 2 {
        return Err(SessionError::UnexpectedMessage {
            expected: "responder_hello (2)",
            actual: format!("message type {}", payload[0]),
        });
    }
    let (pk, nonce) = split_key_and_nonce(payload);
    let mut cursor = &payload[65..];
    let doc_len = cursor.get_u32() as usize;
    if doc_len > MAX_ATTESTATION_DOC_SIZE {
        return Err(SessionError::HandshakeFailed(format!(
            "attestation document too large: {doc_len} bytes (max {MAX_ATTESTATION_DOC_SIZE})"
        )));
    }
    if cursor.len() != doc_len {
        return Err(SessionError::HandshakeFailed(format!(
            "responder hello: expected {} bytes, got {}",
            RESPONDER_HELLO_MIN_LEN + doc_len,
            payload.len()
        )));
    }
    Ok((pk, nonce, AttestationDocument::new(cursor.to_vec())))
}

pub fn parse_confirmation(payload: &[u8]) -> Result<[u8; 32], SessionError> {
    if payload.len() != CONFIRMATION_LEN {
        return Err(SessionError::HandshakeFailed(format!(
            "confirmation: expected {CONFIRMATION_LEN} bytes, got {}",
            payload.len()
        )));
    }
    if payload[0] != 3 {
        return Err(SessionError::UnexpectedMessage {
            expected: "confirmation (3)",
            actual: format!("message type {}", payload[0]),
        });
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&payload[1..33]);
    Ok(hash)
}

/// Confirmation hash binding the session id and both directional keys.
pub fn compute_confirmation(
    session_id: &[u8; 32],
    send_key: &SymmetricKey,
    recv_key: &SymmetricKey,
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"css-confirmation");
    hasher.update(session_id);
    hasher.update(send_key.as_bytes());
    hasher.update(recv_key.as_bytes());
    hasher.finalize().into()
}

/// Derive a session ID from the transcript hash via HKDF (domain-separated from key material).
pub fn derive_session_id(transcript_hash: &[u8; 32]) -> Result<[u8; 32], CryptoError> {
    let hkdf = Hkdf::<Sha256>::new(None, transcript_hash);
    let mut session_id = [0u8; 32];
    hkdf.expand(b"css-session-id", &mut session_id)
        .map_err(|_| CryptoError::HkdfExpandFailed)?;
    Ok(session_id)
}

/// XOR of both parties' nonces.
pub fn combine_nonces(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut combined = [0u8; 32];
    for (out, (x, y)) in combined.iter_mut().zip(a.iter().zip(b.iter())) {
        *out = x ^ y;
    }
    combined
}

/// Validate that a handshake frame has the expected type and sequence number.
pub fn validate_handshake_frame(frame: &Frame, expected_seq: u32) -> Result<(), Error> {
    if frame.header.msg_type != FrameType::Hello {
        return Err(SessionError::UnexpectedMessage {
            expected: "Hello",
            actual: format!("{:?}", frame.header.msg_type),
        }
        .into());
    }
    if frame.header.sequence != expected_seq {
        return Err(SessionError::HandshakeFailed(format!(
            "unexpected handshake sequence: expected {expected_seq}, got {}",
            frame.header.sequence
        ))
        .into());
    }
    Ok(())
}
