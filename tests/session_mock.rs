#![cfg(feature = "mock")]

//! Handshake and record behavior of the concrete sessions with mock attestation.

use std::sync::Arc;

use bytes::Bytes;

use confidential_session_stream::attestation::types::{AttestationDocument, VerifiedAttestation};
use confidential_session_stream::error::{AttestError, CryptoError};
use confidential_session_stream::{
    AttestationProvider, AttestationVerifier, ClientSession, Error, MockProvider, MockVerifier,
    ServerSession, Session, SessionConfig, SessionError, SessionState,
};

fn pump<A: Session, B: Session>(from: &mut A, to: &mut B) -> Result<usize, Error> {
    let mut moved = 0;
    while let Some(frame) = from.outgoing_message() {
        to.put_incoming_message(frame)?;
        moved += 1;
    }
    Ok(moved)
}

fn attested_pair() -> (ClientSession, ServerSession) {
    let config = SessionConfig::default();
    (
        ClientSession::attested(Arc::new(MockVerifier::new()), &config),
        ServerSession::attested(Arc::new(MockProvider::new()), &config),
    )
}

fn open_pair() -> (ClientSession, ServerSession) {
    let (mut client, mut server) = attested_pair();
    assert_eq!(pump(&mut client, &mut server).unwrap(), 1);
    assert_eq!(pump(&mut server, &mut client).unwrap(), 1);
    assert_eq!(pump(&mut client, &mut server).unwrap(), 1);
    assert!(client.is_open() && server.is_open());
    (client, server)
}

#[test]
fn attested_handshake_and_bidirectional_data() {
    let (mut client, mut server) = open_pair();

    client.write(Bytes::from_static(b"hello from client")).unwrap();
    pump(&mut client, &mut server).unwrap();
    assert_eq!(server.read().unwrap(), Bytes::from_static(b"hello from client"));

    server.write(Bytes::from_static(b"hello from server")).unwrap();
    pump(&mut server, &mut client).unwrap();
    assert_eq!(client.read().unwrap(), Bytes::from_static(b"hello from server"));

    let attestation = client.peer_attestation().unwrap();
    assert!(attestation.public_key.is_some());
}

#[test]
fn both_sides_agree_on_session_identity() {
    let (client, server) = open_pair();
    assert_eq!(client.session_id(), server.session_id());
    assert_eq!(
        client.session_binding_token(b"request-42").unwrap(),
        server.session_binding_token(b"request-42").unwrap()
    );

    let (other, _) = open_pair();
    assert_ne!(
        client.session_binding_token(b"request-42").unwrap(),
        other.session_binding_token(b"request-42").unwrap()
    );
}

#[test]
fn several_records_in_one_pump_stay_ordered() {
    let (mut client, mut server) = open_pair();
    for i in 0u8..5 {
        client.write(Bytes::from(vec![i; 3])).unwrap();
    }
    assert_eq!(pump(&mut client, &mut server).unwrap(), 5);
    for i in 0u8..5 {
        assert_eq!(server.read().unwrap(), Bytes::from(vec![i; 3]));
    }
    assert!(server.read().is_none());
}

#[test]
fn replayed_record_is_rejected() {
    let (mut client, mut server) = open_pair();
    client.write(Bytes::from_static(b"once")).unwrap();
    let frame = client.outgoing_message().unwrap();

    server.put_incoming_message(frame.clone()).unwrap();
    let err = server.put_incoming_message(frame).unwrap_err();
    assert!(matches!(
        err,
        Error::Crypto(CryptoError::SequenceReplay { .. })
    ));
    assert_eq!(server.state(), SessionState::Closed);
}

#[test]
fn tampered_record_is_rejected() {
    let (mut client, mut server) = open_pair();
    client.write(Bytes::from_static(b"integrity")).unwrap();
    let mut frame = client.outgoing_message().unwrap();
    let mut payload = frame.payload.to_vec();
    payload[0] ^= 0x01;
    frame.payload = Bytes::from(payload);

    assert!(matches!(
        server.put_incoming_message(frame),
        Err(Error::Crypto(CryptoError::OpenFailed))
    ));
}

#[test]
fn oversized_plaintext_is_rejected() {
    let config = SessionConfig::builder().max_payload_size(64).build().unwrap();
    let mut client = ClientSession::attested(Arc::new(MockVerifier::new()), &config);
    let mut server = ServerSession::attested(Arc::new(MockProvider::new()), &SessionConfig::default());
    pump(&mut client, &mut server).unwrap();
    pump(&mut server, &mut client).unwrap();

    let err = client.write(Bytes::from(vec![0u8; 64])).unwrap_err();
    assert!(matches!(
        err,
        Error::Session(SessionError::PlaintextTooLarge { .. })
    ));
}

/// Reports a public key other than the one in the handshake.
struct SubstitutingVerifier;

impl AttestationVerifier for SubstitutingVerifier {
    fn verify(&self, doc: &AttestationDocument) -> Result<VerifiedAttestation, AttestError> {
        let mut verified = MockVerifier::new().verify(doc)?;
        verified.public_key = Some(vec![0x42; 32]);
        Ok(verified)
    }
}

#[test]
fn attested_key_mismatch_rejects_handshake() {
    let config = SessionConfig::default();
    let mut client = ClientSession::attested(Arc::new(SubstitutingVerifier), &config);
    let mut server = ServerSession::attested(Arc::new(MockProvider::new()), &config);
    pump(&mut client, &mut server).unwrap();

    let err = pump(&mut server, &mut client).unwrap_err();
    assert!(matches!(
        err,
        Error::Attestation(AttestError::PublicKeyMismatch)
    ));
    assert_eq!(client.state(), SessionState::Closed);
}

#[test]
fn unattested_responder_fails_attested_client() {
    let config = SessionConfig::default();
    let mut client = ClientSession::attested(Arc::new(MockVerifier::new()), &config);
    let mut server = ServerSession::unattested(&config);
    pump(&mut client, &mut server).unwrap();

    let err = pump(&mut server, &mut client).unwrap_err();
    assert!(err.to_string().contains("attestation verification failed"), "{err}");
}

struct FailingProvider;

impl AttestationProvider for FailingProvider {
    fn attest(&self, _nonce: &[u8], _public_key: &[u8]) -> Result<AttestationDocument, AttestError> {
        Err(AttestError::GenerationFailed("no enclave".into()))
    }
}

#[test]
fn provider_failure_rejects_initiator_hello() {
    let config = SessionConfig::default();
    let mut client = ClientSession::unattested(&config);
    let mut server = ServerSession::attested(Arc::new(FailingProvider), &config);

    let err = pump(&mut client, &mut server).unwrap_err();
    assert!(err.is_protocol_rejection());
    assert_eq!(server.state(), SessionState::Closed);
    assert!(server.outgoing_message().is_none());
}
