use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use super::{Frame, FrameHeader, HEADER_SIZE, MAX_PAYLOAD_SIZE};
use crate::error::FrameError;

/// Upper bound on how much buffer space a single decode call reserves while
/// waiting for a payload.
const MAX_RESERVE_PER_DECODE: usize = 64 * 1024;

#[derive(Debug)]
enum DecodeState {
    Header,
    Payload(FrameHeader),
}

/// Frames on a byte stream: header, then exactly `payload_len` bytes.
///
/// The same limit applies in both directions, so a peer configured with a
/// smaller `max_payload_size` never receives a frame it would refuse.
#[derive(Debug)]
pub struct FrameCodec {
    state: DecodeState,
    max_payload_size: u32,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::with_max_payload_size(MAX_PAYLOAD_SIZE)
    }

    /// Limits above the protocol maximum are clamped to it.
    pub fn with_max_payload_size(max_payload_size: u32) -> Self {
        Self {
            state: DecodeState::Header,
            max_payload_size: max_payload_size.min(MAX_PAYLOAD_SIZE),
        }
    }

    pub fn max_payload_size(&self) -> u32 {
        self.max_payload_size
    }

    fn check_len(&self, len: usize) -> Result<u32, FrameError> {
        match u32::try_from(len) {
            Ok(size) if size <= self.max_payload_size => Ok(size),
            Ok(size) => Err(FrameError::PayloadTooLarge {
                size,
                max: self.max_payload_size,
            }),
            Err(_) => Err(FrameError::PayloadTooLarge {
                size: u32::MAX,
                max: self.max_payload_size,
            }),
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        let header = match std::mem::replace(&mut self.state, DecodeState::Header) {
            DecodeState::Payload(header) => header,
            DecodeState::Header => match FrameHeader::decode(src)? {
                Some(header) => {
                    self.check_len(header.payload_len as usize)?;
                    header
                }
                None => return Ok(None),
            },
        };

        let len = header.payload_len as usize;
        if src.len() < len {
            src.reserve((len - src.len()).min(MAX_RESERVE_PER_DECODE));
            self.state = DecodeState::Payload(header);
            return Ok(None);
        }

        let payload = src.split_to(len).freeze();
        Ok(Some(Frame { header, payload }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        let size = self.check_len(frame.payload.len())?;
        if size != frame.header.payload_len {
            return Err(FrameError::LengthMismatch {
                declared: frame.header.payload_len,
                actual: size,
            });
        }
        dst.reserve(HEADER_SIZE + frame.payload.len());
        frame.header.encode(dst);
        dst.extend_from_slice(&frame.payload);
        Ok(())
    }
}
