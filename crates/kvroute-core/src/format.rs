//! Frame format for messages handed to the transport
//!
//! Every message travels as a fixed header followed by a postcard payload:
//!
//! ```text
//!   [0..4]   magic:    "KVRF"
//!   [4..8]   length:   u32 LE - payload length in bytes
//!   [8..12]  checksum: u32 LE - CRC32C of payload bytes
//!   [12]     kind:     u8     - FrameKind
//!   [13..16] reserved: [u8;3] - zero
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;

/// Magic bytes identifying a frame
pub const MAGIC_ARRAY: [u8; 4] = *b"KVRF";

/// Header size in bytes
pub const HEADER_SIZE: usize = 16;

/// What a frame carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Request = 1,
    Response = 2,
    MetaRequest = 3,
    MetaResponse = 4,
}

/// Fixed-size frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub magic: [u8; 4],
    pub length: u32,
    pub checksum: u32,
    pub kind: u8,
}

impl FrameHeader {
    pub fn new(length: u32, checksum: u32, kind: FrameKind) -> Self {
        Self { magic: MAGIC_ARRAY, length, checksum, kind: kind as u8 }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic);
        buf[4..8].copy_from_slice(&self.length.to_le_bytes());
        buf[8..12].copy_from_slice(&self.checksum.to_le_bytes());
        buf[12] = self.kind;
        // reserved bytes stay zero
        buf
    }

    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        Self {
            magic: [bytes[0], bytes[1], bytes[2], bytes[3]],
            length: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            checksum: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            kind: bytes[12],
        }
    }
}

/// Serialize a message into a complete frame.
pub fn encode_frame<T: Serialize>(kind: FrameKind, message: &T) -> Result<Vec<u8>, CodecError> {
    let payload = postcard::to_stdvec(message)?;
    let length = u32::try_from(payload.len())
        .map_err(|_| CodecError::Payload(format!("payload of {} bytes exceeds u32", payload.len())))?;
    let header = FrameHeader::new(length, crc32c::crc32c(&payload), kind);

    let mut buffer = Vec::with_capacity(HEADER_SIZE + payload.len());
    buffer.extend_from_slice(&header.to_bytes());
    buffer.extend_from_slice(&payload);
    Ok(buffer)
}

/// Verify and deserialize a frame of the expected kind.
pub fn decode_frame<T: DeserializeOwned>(kind: FrameKind, data: &[u8]) -> Result<T, CodecError> {
    let Some(header_bytes) = data.first_chunk::<HEADER_SIZE>() else {
        return Err(CodecError::TooShort { len: data.len(), need: HEADER_SIZE });
    };
    let header = FrameHeader::from_bytes(header_bytes);

    if header.magic != MAGIC_ARRAY {
        return Err(CodecError::NoMagicFound { found: header.magic });
    }
    if header.kind != kind as u8 {
        return Err(CodecError::UnexpectedKind { expected: kind as u8, found: header.kind });
    }

    let payload_end = HEADER_SIZE + header.length as usize;
    if data.len() < payload_end {
        return Err(CodecError::TornFrame { expected: header.length, available: data.len() - HEADER_SIZE });
    }
    let payload = &data[HEADER_SIZE..payload_end];

    let actual = crc32c::crc32c(payload);
    if actual != header.checksum {
        return Err(CodecError::ChecksumMismatch { expected: header.checksum, actual });
    }

    Ok(postcard::from_bytes(payload)?)
}
