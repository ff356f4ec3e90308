use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use rand::Rng;

use super::handshake::{self, compute_confirmation, validate_handshake_frame};
use super::record::RecordLayer;
use super::{Session, SessionConfig, SessionInfo, SessionState};
use crate::attestation::types::AttestationDocument;
use crate::attestation::AttestationProvider;
use crate::crypto::hpke::{self, KeyPair};
use crate::crypto::{transcript, SymmetricKey};
use crate::error::{Error, SessionError};
use crate::frame::Frame;

enum Phase {
    AwaitingHello,
    AwaitingConfirmation {
        send_key: SymmetricKey,
        recv_key: SymmetricKey,
        session_id: [u8; 32],
    },
    Open(RecordLayer),
    Closed,
}

/// Responder side of a session.
pub struct ServerSession {
    phase: Phase,
    provider: Option<Arc<dyn AttestationProvider>>,
    max_payload_size: u32,
    outgoing: VecDeque<Frame>,
    incoming: VecDeque<Bytes>,
}

impl ServerSession {
    /// A server that binds attestation evidence to its handshake key.
    pub fn attested(provider: Arc<dyn AttestationProvider>, config: &SessionConfig) -> Self {
        Self::new(Some(provider), config)
    }

    /// A server that sends an empty evidence document.
    pub fn unattested(config: &SessionConfig) -> Self {
        Self::new(None, config)
    }

    fn new(provider: Option<Arc<dyn AttestationProvider>>, config: &SessionConfig) -> Self {
        Self {
            phase: Phase::AwaitingHello,
            provider,
            max_payload_size: config.max_payload_size,
            outgoing: VecDeque::with_capacity(1),
            incoming: VecDeque::new(),
        }
    }

    pub fn session_id(&self) -> Option<&[u8; 32]> {
        match &self.phase {
            Phase::Open(record) => Some(record.session_id()),
            _ => None,
        }
    }

    fn evidence(&self, nonce: &[u8; 32], public_key: &[u8; 32]) -> Result<AttestationDocument, Error> {
        let Some(provider) = &self.provider else {
            return Ok(AttestationDocument::empty());
        };
        let doc = provider.attest(nonce, public_key).map_err(|e| {
            tracing::warn!(error = %e, "attestation generation failed");
            SessionError::HandshakeFailed("attestation generation failed".into())
        })?;
        tracing::debug!(doc_len = doc.raw.len(), "attestation document generated");
        Ok(doc)
    }

    fn accept_hello(&mut self, frame: &Frame) -> Result<Phase, Error> {
        validate_handshake_frame(frame, 0)?;
        let (initiator_pk, initiator_nonce) = handshake::parse_initiator_hello(&frame.payload)?;

        let keypair = KeyPair::generate();
        let mut nonce = [0u8; 32];
        rand::thread_rng().fill(&mut nonce);
        let own_pk = keypair.public.to_bytes();

        let doc = self.evidence(&nonce, &own_pk)?;
        if doc.raw.len() > handshake::MAX_ATTESTATION_DOC_SIZE {
            return Err(SessionError::HandshakeFailed(format!(
                "attestation document too large: {} bytes",
                doc.raw.len()
            ))
            .into());
        }

        let combined_nonce = handshake::combine_nonces(&initiator_nonce, &nonce);
        let transcript_hash =
            transcript::compute_transcript(&doc.hash(), &initiator_pk, &own_pk, &combined_nonce);

        let peer = x25519_dalek::PublicKey::from(initiator_pk);
        let (send_key, recv_key) =
            hpke::derive_session_keys(&keypair.secret, &peer, &transcript_hash, false)?;
        let session_id = handshake::derive_session_id(&transcript_hash)?;

        self.outgoing.push_back(Frame::hello(
            0,
            handshake::encode_responder_hello(&own_pk, &nonce, &doc.raw),
        ));

        Ok(Phase::AwaitingConfirmation {
            send_key,
            recv_key,
            session_id,
        })
    }

    fn process(&mut self, frame: Frame) -> Result<(), Error> {
        match std::mem::replace(&mut self.phase, Phase::Closed) {
            Phase::AwaitingHello => {
                self.phase = self.accept_hello(&frame)?;
                Ok(())
            }
            Phase::AwaitingConfirmation {
                send_key,
                recv_key,
                session_id,
            } => {
                validate_handshake_frame(&frame, 1)?;
                let received = handshake::parse_confirmation(&frame.payload)?;
                // The initiator's (send, recv) is our (recv, send).
                let expected = compute_confirmation(&session_id, &recv_key, &send_key);
                if received != expected {
                    return Err(SessionError::HandshakeFailed(
                        "confirmation hash mismatch: peer derived different keys".into(),
                    )
                    .into());
                }
                tracing::debug!(
                    session_id = hex::encode(session_id),
                    "server session open"
                );
                self.phase = Phase::Open(RecordLayer::new(
                    &send_key,
                    &recv_key,
                    session_id,
                    self.max_payload_size,
                ));
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

impl Session for ServerSession {
    fn is_open(&self) -> bool {
        matches!(self.phase, Phase::Open(_))
    }

    fn put_incoming_message(&mut self, frame: Frame) -> Result<(), Error> {
        self.process(frame)
    }

    fn read(&mut self) -> Option<Bytes> {
        self.incoming.pop_front()
    }

    fn write(&mut self, plaintext: Bytes) -> Result<(), Error> {
        let result = match &mut self.phase {
            Phase::Open(record) => record.seal(&plaintext),
            Phase::Closed => return Err(SessionError::Closed.into()),
            _ => return Err(SessionError::NotEstablished.into()),
        };
        match result {
            Ok(frame) => {
                self.outgoing.push_back(frame);
                Ok(())
            }
            Err(e @ Error::Session(SessionError::PlaintextTooLarge { .. })) => Err(e),
            Err(e) => {
                self.phase = Phase::Closed;
                Err(e)
            }
        }
    }

    fn outgoing_message(&mut self) -> Option<Frame> {
        self.outgoing.pop_front()
    }

    fn state(&self) -> SessionState {
        match self.phase {
            Phase::AwaitingHello | Phase::AwaitingConfirmation { .. } => SessionState::Handshaking,
            Phase::Open(_) => SessionState::Open,
            Phase::Closed => SessionState::Closed,
        }
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            state: self.state(),
            session_id: self.session_id().copied(),
            peer_attestation: None,
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
    use crate::session::client::ClientSession;

    fn pump<A: Session, B: Session>(from: &mut A, to: &mut B) {
        while let Some(frame) = from.outgoing_message() {
            to.put_incoming_message(frame).unwrap();
        }
    }

    #[test]
    fn unattested_handshake_opens_both_sides() {
        let config = SessionConfig::default();
        let mut client = ClientSession::unattested(&config);
        let mut server = ServerSession::unattested(&config);

        pump(&mut client, &mut server);
        assert_eq!(server.state(), SessionState::Handshaking);
        pump(&mut server, &mut client);
        assert!(client.is_open());
        pump(&mut client, &mut server);
        assert!(server.is_open());
        assert_eq!(client.session_id(), server.session_id());
        assert_eq!(
            client.session_binding_token(b"app").unwrap(),
            server.session_binding_token(b"app").unwrap()
        );

        client.write(Bytes::from_static(b"ping")).unwrap();
        pump(&mut client, &mut server);
        assert_eq!(server.read().unwrap(), Bytes::from_static(b"ping"));
        assert!(server.read().is_none());
    }

    #[test]
    fn data_before_handshake_is_rejected() {
        let mut server = ServerSession::unattested(&SessionConfig::default());
        let frame = Frame::data(0, Bytes::from_static(b"nope"), true);
        assert!(server.put_incoming_message(frame).is_err());
        assert_eq!(server.state(), SessionState::Closed);
    }

    #[test]
    fn tampered_confirmation_is_rejected() {
        let config = SessionConfig::default();
        let mut client = ClientSession::unattested(&config);
        let mut server = ServerSession::unattested(&config);
        pump(&mut client, &mut server);
        pump(&mut server, &mut client);

        let mut confirmation = client.outgoing_message().unwrap();
        let mut payload = confirmation.payload.to_vec();
        payload[5] ^= 0xFF;
        confirmation.payload = Bytes::from(payload);

        let err = server.put_incoming_message(confirmation).unwrap_err();
        assert!(err.to_string().contains("confirmation hash mismatch"));
        assert!(!server.is_open());
    }
}
