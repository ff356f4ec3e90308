pub mod codec;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Code, FrameError, Status};

/// Magic bytes: 0xCF 0x4D.
pub const MAGIC: u16 = 0xCF4D;

/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Fixed header size in bytes.
pub const HEADER_SIZE: usize = 13;

/// Maximum payload size: 32 MiB.
pub const MAX_PAYLOAD_SIZE: u32 = 32 * 1024 * 1024;

/// Frame message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// Handshake message.
    Hello = 0x01,
    /// Encrypted application record.
    Data = 0x02,
    /// Stream failure status, carried in-band by byte-stream transports.
    Error = 0x03,
}

impl FrameType {
    pub fn from_u8(v: u8) -> std::result::Result<Self, FrameError> {
        match v {
            0x01 => Ok(Self::Hello),
            0x02 => Ok(Self::Data),
            0x03 => Ok(Self::Error),
            other => Err(FrameError::UnknownMessageType(other)),
        }
    }
}

/// Frame flags (bit field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flags(pub(crate) u8);

impl Flags {
    pub const ENCRYPTED: u8 = 0x01;

    pub const fn empty() -> Self {
        Self(0)
    }

    /// Create flags from raw bits.
    pub const fn from_raw(bits: u8) -> Self {
        Self(bits)
    }

    /// Get the raw flag bits.
    pub const fn raw(self) -> u8 {
        self.0
    }

    pub const fn is_encrypted(self) -> bool {
        self.0 & Self::ENCRYPTED != 0
    }
}

/// A parsed frame header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub msg_type: FrameType,
    pub flags: Flags,
    pub sequence: u32,
    pub payload_len: u32,
}

impl FrameHeader {
    /// Encode the header into bytes.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(MAGIC);
        buf.put_u8(self.version);
        buf.put_u8(self.msg_type as u8);
        buf.put_u8(self.flags.0);
        buf.put_u32(self.sequence);
        buf.put_u32(self.payload_len);
    }

    /// Decode a header from a buffer. Returns `None` if not enough bytes.
    pub fn decode(buf: &mut BytesMut) -> std::result::Result<Option<Self>, FrameError> {
        if buf.len() < HEADER_SIZE {
            return Ok(None);
        }

        let magic = u16::from_be_bytes([buf[0], buf[1]]);
        if magic != MAGIC {
            return Err(FrameError::InvalidMagic(magic));
        }

        let version = buf[2];
        if version != PROTOCOL_VERSION {
            return Err(FrameError::UnsupportedVersion(version));
        }

        let msg_type = FrameType::from_u8(buf[3])?;
        let flags = Flags(buf[4]);
        let sequence = u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]);
        let payload_len = u32::from_be_bytes([buf[9], buf[10], buf[11], buf[12]]);

        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(FrameError::PayloadTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        buf.advance(HEADER_SIZE);

        Ok(Some(Self {
            version,
            msg_type,
            flags,
            sequence,
            payload_len,
        }))
    }
}

/// A complete frame: header + payload.
///
/// This is the opaque unit the transport carries. The session driver never
/// looks inside; sessions decide what a frame means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl Frame {
    fn new(msg_type: FrameType, flags: Flags, sequence: u32, payload: Bytes) -> Self {
        // Oversized payloads saturate here and are rejected by the codec.
        let payload_len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
        Self {
            header: FrameHeader {
                version: PROTOCOL_VERSION,
                msg_type,
                flags,
                sequence,
                payload_len,
            },
            payload,
        }
    }

    /// Create a new data frame.
    pub fn data(sequence: u32, payload: Bytes, encrypted: bool) -> Self {
        let flags = if encrypted {
            Flags(Flags::ENCRYPTED)
        } else {
            Flags::empty()
        };
        Self::new(FrameType::Data, flags, sequence, payload)
    }

    /// Create a hello frame (used during handshake).
    pub fn hello(sequence: u32, payload: Bytes) -> Self {
        Self::new(FrameType::Hello, Flags::empty(), sequence, payload)
    }

    /// Create an error frame carrying a stream status: `code || utf-8 message`.
    pub fn error(status: &Status) -> Self {
        let mut payload = BytesMut::with_capacity(1 + status.message.len());
        payload.put_u8(status.code as u8);
        payload.put_slice(status.message.as_bytes());
        Self::new(FrameType::Error, Flags::empty(), 0, payload.freeze())
    }

    /// Parse the status carried by an error frame.
    pub fn status(&self) -> std::result::Result<Status, FrameError> {
        if self.header.msg_type != FrameType::Error {
            return Err(FrameError::MalformedStatus(format!(
                "{:?} frame carries no status",
                self.header.msg_type
            )));
        }
        let Some((&code, message)) = self.payload.split_first() else {
            return Err(FrameError::MalformedStatus("empty payload".into()));
        };
        let message = std::str::from_utf8(message)
            .map_err(|e| FrameError::MalformedStatus(e.to_string()))?;
        Ok(Status::new(Code::from_u8(code), message))
    }
}
