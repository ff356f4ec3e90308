use bytes::Bytes;
use hkdf::Hkdf;
use sha2::Sha256;

use crate::crypto::seal::{RecordOpener, RecordSealer, TAG_LEN};
use crate::crypto::SymmetricKey;
use crate::error::{CryptoError, Error, SessionError};
use crate::frame::{Frame, FrameType};

/// Encrypted record protection for an open session.
pub struct RecordLayer {
    sealer: RecordSealer,
    opener: RecordOpener,
    session_id: [u8; 32],
    max_payload_size: u32,
}

impl RecordLayer {
    pub fn new(
        send_key: &SymmetricKey,
        recv_key: &SymmetricKey,
        session_id: [u8; 32],
        max_payload_size: u32,
    ) -> Self {
        Self {
            sealer: RecordSealer::new(send_key, session_id),
            opener: RecordOpener::new(recv_key, session_id),
            session_id,
            max_payload_size,
        }
    }

    pub fn session_id(&self) -> &[u8; 32] {
        &self.session_id
    }

    /// Seal one plaintext into an encrypted `Data` frame.
    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Frame, Error> {
        if plaintext.len() + TAG_LEN > self.max_payload_size as usize {
            return Err(SessionError::PlaintextTooLarge {
                size: plaintext.len(),
                max: self.max_payload_size.saturating_sub(TAG_LEN as u32),
            }
            .into());
        }
        Ok(self.sealer.seal(plaintext)?)
    }

    /// Open one encrypted `Data` frame.
    pub fn open(&mut self, frame: &Frame) -> Result<Bytes, Error> {
        if frame.header.msg_type != FrameType::Data {
            return Err(SessionError::UnexpectedMessage {
                expected: "Data",
                actual: format!("{:?}", frame.header.msg_type),
            }
            .into());
        }
        if !frame.header.flags.is_encrypted() {
            return Err(SessionError::UnexpectedMessage {
                expected: "encrypted Data",
                actual: "plaintext Data".into(),
            }
            .into());
        }
        Ok(self.opener.open(frame)?)
    }

    /// Derive a token bound to this session for the given context string.
    pub fn binding_token(&self, info: &[u8]) -> Result<[u8; 32], CryptoError> {
        let hkdf = Hkdf::<Sha256>::new(Some(b"css-binding-token"), &self.session_id);
        let mut token = [0u8; 32];
        hkdf.expand(info, &mut token)
            .map_err(|_| CryptoError::HkdfExpandFailed)?;
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Flags;

    fn pair(max: u32) -> (RecordLayer, RecordLayer) {
        let a = SymmetricKey::from([0x01; 32]);
        let b = SymmetricKey::from([0x02; 32]);
        let sid = [0x33; 32];
        (
            RecordLayer::new(&a, &b, sid, max),
            RecordLayer::new(&b, &a, sid, max),
        )
    }

    #[test]
    fn sealed_frame_opens_on_peer() {
        let (mut left, mut right) = pair(1024);
        let frame = left.seal(b"ping").unwrap();
        assert_eq!(frame.header.sequence, 0);
        assert_eq!(&right.open(&frame).unwrap()[..], b"ping");
        assert_eq!(left.seal(b"again").unwrap().header.sequence, 1);
    }

    #[test]
    fn flipped_flags_fail_authentication() {
        let (mut left, mut right) = pair(1024);
        let mut frame = left.seal(b"ping").unwrap();
        frame.header.flags = Flags::from_raw(Flags::ENCRYPTED | 0x80);
        assert!(matches!(
            right.open(&frame),
            Err(Error::Crypto(CryptoError::OpenFailed))
        ));
    }

    #[test]
    fn plaintext_data_frame_rejected() {
        let (_, mut right) = pair(1024);
        let frame = Frame::data(0, Bytes::from_static(b"clear"), false);
        assert!(right.open(&frame).is_err());
    }

    #[test]
    fn oversized_plaintext_rejected() {
        let (mut left, _) = pair(64);
        let err = left.seal(&[0u8; 49]).unwrap_err();
        assert!(matches!(
            err,
            Error::Session(SessionError::PlaintextTooLarge { size: 49, max: 48 })
        ));
        assert!(left.seal(&[0u8; 48]).is_ok());
    }

    #[test]
    fn binding_tokens_depend_on_info() {
        let (left, right) = pair(1024);
        assert_eq!(
            left.binding_token(b"ctx").unwrap(),
            right.binding_token(b"ctx").unwrap()
        );
        assert_ne!(
            left.binding_token(b"ctx").unwrap(),
            left.binding_token(b"other").unwrap()
        );
    }
}
