use bytes::Bytes;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};

use super::SymmetricKey;
use crate::error::CryptoError;
use crate::frame::{Frame, FrameHeader, PROTOCOL_VERSION};

/// ChaCha20-Poly1305 authentication tag length appended to every ciphertext.
pub const TAG_LEN: usize = 16;

const AAD_LEN: usize = 3 + 32 + 4;

/// One direction of record protection: a cipher keyed for that direction
/// plus the session id every record is bound to.
struct RecordCipher {
    cipher: ChaCha20Poly1305,
    session_id: [u8; 32],
}

impl RecordCipher {
    fn new(key: &SymmetricKey, session_id: [u8; 32]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key.as_bytes())),
            session_id,
        }
    }

    /// `version || msg_type || flags || session_id || sequence`, taken from
    /// the header that travels in the clear. `payload_len` is left out; the
    /// tag already covers the ciphertext length.
    fn aad(&self, header: &FrameHeader) -> [u8; AAD_LEN] {
        let mut aad = [0u8; AAD_LEN];
        aad[0] = header.version;
        aad[1] = header.msg_type as u8;
        aad[2] = header.flags.raw();
        aad[3..35].copy_from_slice(&self.session_id);
        aad[35..].copy_from_slice(&header.sequence.to_be_bytes());
        aad
    }

    /// The frame sequence number, big-endian in the low four bytes.
    fn nonce(sequence: u32) -> Nonce {
        let mut nonce = [0u8; 12];
        nonce[8..].copy_from_slice(&sequence.to_be_bytes());
        *Nonce::from_slice(&nonce)
    }
}

/// Seals plaintexts into encrypted `Data` frames with consecutive sequence
/// numbers starting at zero.
pub struct RecordSealer {
    inner: RecordCipher,
    /// `None` once `u32::MAX` has been used.
    next: Option<u32>,
}

impl RecordSealer {
    pub fn new(key: &SymmetricKey, session_id: [u8; 32]) -> Self {
        Self {
            inner: RecordCipher::new(key, session_id),
            next: Some(0),
        }
    }

    /// Sequence number the next record will carry.
    pub fn next_sequence(&self) -> Option<u32> {
        self.next
    }

    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Frame, CryptoError> {
        let sequence = self.next.ok_or(CryptoError::NonceOverflow)?;
        // The header fields sealed into the AAD are final before encryption;
        // only its length is filled in afterwards.
        let mut header = Frame::data(sequence, Bytes::new(), true).header;
        let aad = self.inner.aad(&header);
        let ciphertext = self
            .inner
            .cipher
            .encrypt(
                &RecordCipher::nonce(sequence),
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|_| CryptoError::SealFailed)?;

        self.next = sequence.checked_add(1);
        header.payload_len =
            u32::try_from(ciphertext.len()).map_err(|_| CryptoError::SealFailed)?;
        Ok(Frame {
            header,
            payload: Bytes::from(ciphertext),
        })
    }
}

/// Opens encrypted frames, accepting strictly increasing sequence numbers.
pub struct RecordOpener {
    inner: RecordCipher,
    last: Option<u32>,
}

impl RecordOpener {
    pub fn new(key: &SymmetricKey, session_id: [u8; 32]) -> Self {
        Self {
            inner: RecordCipher::new(key, session_id),
            last: None,
        }
    }

    /// Authenticate the frame's header and decrypt its payload. A rejected
    /// frame does not advance the accepted sequence.
    pub fn open(&mut self, frame: &Frame) -> Result<Bytes, CryptoError> {
        let sequence = frame.header.sequence;
        if let Some(last) = self.last {
            if sequence <= last {
                return Err(CryptoError::SequenceReplay {
                    received: sequence,
                    expected: last,
                });
            }
        }
        if frame.header.version != PROTOCOL_VERSION || !frame.header.flags.is_encrypted() {
            return Err(CryptoError::OpenFailed);
        }

        let aad = self.inner.aad(&frame.header);
        let plaintext = self
            .inner
            .cipher
            .decrypt(
                &RecordCipher::nonce(sequence),
                Payload {
                    msg: &frame.payload,
                    aad: &aad,
                },
            )
            .map_err(|_| CryptoError::OpenFailed)?;

        self.last = Some(sequence);
        Ok(Bytes::from(plaintext))
    }
}
