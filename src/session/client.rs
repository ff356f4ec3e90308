use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use rand::Rng;

use super::handshake::{self, compute_confirmation, validate_handshake_frame};
use super::record::RecordLayer;
use super::{Session, SessionConfig, SessionInfo, SessionState};
use crate::attestation::types::{ExpectedMeasurements, VerifiedAttestation};
use crate::attestation::AttestationVerifier;
use crate::crypto::hpke::{self, KeyPair};
use crate::crypto::transcript;
use crate::error::{AttestError, CryptoError, Error, SessionError};
use crate::frame::Frame;

enum Phase {
    AwaitingResponderHello { keypair: KeyPair, nonce: [u8; 32] },
    Open(RecordLayer),
    Closed,
}

/// Initiator side of a session.
///
/// Creating a client queues the initiator hello, so the first
/// [`outgoing_message`](Session::outgoing_message) returns it immediately.
pub struct ClientSession {
    phase: Phase,
    verifier: Option<Arc<dyn AttestationVerifier>>,
    expected_measurements: Option<ExpectedMeasurements>,
    max_payload_size: u32,
    outgoing: VecDeque<Frame>,
    incoming: VecDeque<Bytes>,
    peer_attestation: Option<VerifiedAttestation>,
}

impl ClientSession {
    /// A client that verifies the responder's attestation evidence.
    pub fn attested(verifier: Arc<dyn AttestationVerifier>, config: &SessionConfig) -> Self {
        Self::new(Some(verifier), config)
    }

    /// A client that accepts the responder without evidence.
    pub fn unattested(config: &SessionConfig) -> Self {
        Self::new(None, config)
    }

    fn new(verifier: Option<Arc<dyn AttestationVerifier>>, config: &SessionConfig) -> Self {
        let keypair = KeyPair::generate();
        let mut nonce = [0u8; 32];
        rand::thread_rng().fill(&mut nonce);

        let hello = handshake::encode_initiator_hello(&keypair.public.to_bytes(), &nonce);
        let mut outgoing = VecDeque::with_capacity(2);
        outgoing.push_back(Frame::hello(0, hello));

        Self {
            phase: Phase::AwaitingResponderHello { keypair, nonce },
            verifier,
            expected_measurements: config.expected_measurements.clone(),
            max_payload_size: config.max_payload_size,
            outgoing,
            incoming: VecDeque::new(),
            peer_attestation: None,
        }
    }

    /// The responder's verified attestation, once open with a verifier.
    pub fn peer_attestation(&self) -> Option<&VerifiedAttestation> {
        self.peer_attestation.as_ref()
    }

    pub fn session_id(&self) -> Option<&[u8; 32]> {
        match &self.phase {
            Phase::Open(record) => Some(record.session_id()),
            _ => None,
        }
    }

    fn verify_evidence(
        &mut self,
        responder_pk: &[u8; 32],
        doc: &crate::attestation::types::AttestationDocument,
    ) -> Result<(), Error> {
        let Some(verifier) = &self.verifier else {
            return Ok(());
        };

        let verified = verifier.verify(doc).map_err(|e| {
            tracing::warn!(error = %e, "attestation verification failed");
            SessionError::HandshakeFailed("attestation verification failed".into())
        })?;

        tracing::info!(
            document_hash = hex::encode(verified.document_hash),
            measurement_count = verified.measurements.len(),
            "attestation verification succeeded"
        );
        tracing::debug!(
            measurements = ?verified.measurements.iter().map(hex::encode).collect::<Vec<_>>(),
            "peer attestation measurements"
        );

        match verified.public_key {
            Some(ref att_pk) if att_pk.as_slice() == responder_pk.as_slice() => {}
            Some(_) => return Err(AttestError::PublicKeyMismatch.into()),
            None => return Err(AttestError::MissingField("public_key".into()).into()),
        }

        if let Some(expected) = &self.expected_measurements {
            expected.verify(&verified.measurements)?;
            tracing::info!(
                expected_count = expected.values.len(),
                "measurement verification passed"
            );
        }

        self.peer_attestation = Some(verified);
        Ok(())
    }

    fn accept_responder_hello(
        &mut self,
        keypair: KeyPair,
        nonce: [u8; 32],
        frame: &Frame,
    ) -> Result<RecordLayer, Error> {
        validate_handshake_frame(frame, 0)?;
        let (responder_pk, responder_nonce, doc) = handshake::parse_responder_hello(&frame.payload)?;

        self.verify_evidence(&responder_pk, &doc)?;

        let combined_nonce = handshake::combine_nonces(&nonce, &responder_nonce);
        let own_pk = keypair.public.to_bytes();
        let transcript_hash =
            transcript::compute_transcript(&doc.hash(), &own_pk, &responder_pk, &combined_nonce);

        let peer = x25519_dalek::PublicKey::from(responder_pk);
        let (send_key, recv_key) =
            hpke::derive_session_keys(&keypair.secret, &peer, &transcript_hash, true)?;
        let session_id = handshake::derive_session_id(&transcript_hash)?;

        let confirmation = compute_confirmation(&session_id, &send_key, &recv_key);
        self.outgoing
            .push_back(Frame::hello(1, handshake::encode_confirmation(&confirmation)));

        Ok(RecordLayer::new(
            &send_key,
            &recv_key,
            session_id,
            self.max_payload_size,
        ))
    }

    fn process(&mut self, frame: Frame) -> Result<(), Error> {
        match std::mem::replace(&mut self.phase, Phase::Closed) {
            Phase::AwaitingResponderHello { keypair, nonce } => {
                let record = self.accept_responder_hello(keypair, nonce, &frame)?;
                tracing::debug!(
                    session_id = hex::encode(record.session_id()),
                    "client session open"
                );
                self.phase = Phase::Open(record);
                Ok(())
            }
            Phase::Open(mut record) => {
                let plaintext = record.open(&frame)?;
                self.phase = Phase::Open(record);
                self.incoming.push_back(plaintext);
                Ok(())
            }
            Phase::Closed => Err(SessionError::Closed.into()),
        }
    }
}

impl Session for ClientSession {
    fn is_open(&self) -> bool {
        matches!(self.phase, Phase::Open(_))
    }

    fn put_incoming_message(&mut self, frame: Frame) -> Result<(), Error> {
        // `process` leaves the phase Closed on every error path.
        self.process(frame)
    }

    fn read(&mut self) -> Option<Bytes> {
        self.incoming.pop_front()
    }

    fn write(&mut self, plaintext: Bytes) -> Result<(), Error> {
        let result = match &mut self.phase {
            Phase::Open(record) => record.seal(&plaintext),
            Phase::AwaitingResponderHello { .. } => return Err(SessionError::NotEstablished.into()),
            Phase::Closed => return Err(SessionError::Closed.into()),
        };
        match result {
            Ok(frame) => {
                self.outgoing.push_back(frame);
                Ok(())
            }
            // An oversized write leaves the session usable.
            Err(e @ Error::Session(SessionError::PlaintextTooLarge { .. })) => Err(e),
            Err(e) => {
                self.phase = Phase::Closed;
                if matches!(e, Error::Crypto(CryptoError::NonceOverflow)) {
                    tracing::warn!("send sequence exhausted, closing session");
                }
                Err(e)
            }
        }
    }

    fn outgoing_message(&mut self) -> Option<Frame> {
        self.outgoing.pop_front()
    }

    fn state(&self) -> SessionState {
        match self.phase {
            Phase::AwaitingResponderHello { .. } => SessionState::Handshaking,
            Phase::Open(_) => SessionState::Open,
            Phase::Closed => SessionState::Closed,
        }
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            state: self.state(),
            session_id: self.session_id().copied(),
            peer_attestation: self.peer_attestation.clone(),
        }
    }

    fn session_binding_token(&self, info: &[u8]) -> Result<[u8; 32], Error> {
        match &self.phase {
            Phase::Open(record) => Ok(record.binding_token(info)?),
            _ => Err(SessionError::NotEstablished.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_is_queued_on_creation() {
        let mut client = ClientSession::unattested(&SessionConfig::default());
        let hello = client.outgoing_message().unwrap();
        assert_eq!(hello.header.sequence, 0);
        assert_eq!(hello.payload.len(), handshake::INITIATOR_HELLO_LEN);
        assert!(client.outgoing_message().is_none());
        assert_eq!(client.state(), SessionState::Handshaking);
    }

    #[test]
    fn write_before_open_fails() {
        let mut client = ClientSession::unattested(&SessionConfig::default());
        let err = client.write(Bytes::from_static(b"early")).unwrap_err();
        assert!(matches!(err, Error::Session(SessionError::NotEstablished)));
        assert!(!client.is_open());
    }

    #[test]
    fn garbage_hello_closes_session() {
        let mut client = ClientSession::unattested(&SessionConfig::default());
        let _ = client.outgoing_message();
        let bogus = Frame::hello(0, Bytes::from_static(b"\x02short"));
        assert!(client.put_incoming_message(bogus).is_err());
        assert_eq!(client.state(), SessionState::Closed);
        let again = Frame::hello(0, Bytes::from_static(b"\x02short"));
        assert!(matches!(
            client.put_incoming_message(again),
            Err(Error::Session(SessionError::Closed))
        ));
    }

    #[test]
    fn binding_token_requires_open_session() {
        let client = ClientSession::unattested(&SessionConfig::default());
        assert!(client.session_binding_token(b"ctx").is_err());
    }
}
