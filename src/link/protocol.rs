//! Wire format spoken with the actuator control board
//!
//! Every frame has the same shape:
//!
//! ```text
//! 0xA5 0x5A | type | len | payload[len] | crc8
//! ```
//!
//! - 2 sync bytes for frame alignment
//! - 1 byte frame type
//! - 1 byte payload length
//! - payload, floats little-endian
//! - CRC-8/DVB-S2 over type, length and payload

use crc::{Crc, CRC_8_DVB_S2};

use crate::mapping::CommandVector;

pub const SYNC_0: u8 = 0xA5;
pub const SYNC_1: u8 = 0x5A;

/// Sync, type and length bytes
pub const HEADER_SIZE: usize = 4;
pub const MAX_PAYLOAD: usize = 64;

const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_DVB_S2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    /// Host asks for the command limits
    QueryLimits = 0x01,
    /// Host sends a new command vector
    SetCommand = 0x02,
    /// Board answers with upper and lower limits
    Limits = 0x81,
    /// Board reports a fault
    Fault = 0xEE,
}

impl FrameType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(FrameType::QueryLimits),
            0x02 => Some(FrameType::SetCommand),
            0x81 => Some(FrameType::Limits),
            0xEE => Some(FrameType::Fault),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid sync bytes {got_0:#04x} {got_1:#04x}")]
    InvalidSync { got_0: u8, got_1: u8 },

    #[error("unknown frame type {0:#04x}")]
    UnknownFrameType(u8),

    #[error("payload of {length} bytes exceeds maximum of {maximum}")]
    PayloadTooLarge { length: usize, maximum: usize },

    #[error("checksum mismatch: expected {expected:#04x}, computed {computed:#04x}")]
    ChecksumMismatch { expected: u8, computed: u8 },

    #[error("{frame_type:?} payload must be {expected} bytes, got {actual}")]
    BadPayloadLength {
        frame_type: FrameType,
        expected: usize,
        actual: usize,
    },

    #[error("expected {expected:?} frame, got {actual:?}")]
    UnexpectedFrame {
        expected: FrameType,
        actual: FrameType,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(frame_type: FrameType, payload: Vec<u8>) -> Self {
        Self {
            frame_type,
            payload,
        }
    }

    pub fn query_limits() -> Self {
        Self::new(FrameType::QueryLimits, Vec::new())
    }

    pub fn set_command(command: &CommandVector) -> Self {
        Self::new(FrameType::SetCommand, encode_floats(&command.as_array()))
    }

    fn checksum(frame_type: u8, payload: &[u8]) -> u8 {
        let mut digest = CRC8.digest();
        digest.update(&[frame_type, payload.len() as u8]);
        digest.update(payload);
        digest.finalize()
    }

    /// Serialize to wire bytes
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        if self.payload.len() > MAX_PAYLOAD {
            return Err(ProtocolError::PayloadTooLarge {
                length: self.payload.len(),
                maximum: MAX_PAYLOAD,
            });
        }

        let frame_type = self.frame_type as u8;
        let mut bytes = Vec::with_capacity(HEADER_SIZE + self.payload.len() + 1);
        bytes.extend_from_slice(&[SYNC_0, SYNC_1, frame_type, self.payload.len() as u8]);
        bytes.extend_from_slice(&self.payload);
        bytes.push(Self::checksum(frame_type, &self.payload));
        Ok(bytes)
    }

    /// Parse one frame from the start of `bytes`
    ///
    /// `bytes` must begin at the sync bytes. Returns `Ok(None)` while the frame
    /// is still incomplete, otherwise the frame and the number of bytes it used.
    pub fn decode(bytes: &[u8]) -> Result<Option<(Frame, usize)>, ProtocolError> {
        if bytes.len() < 2 {
            return Ok(None);
        }
        if bytes[0] != SYNC_0 || bytes[1] != SYNC_1 {
            return Err(ProtocolError::InvalidSync {
                got_0: bytes[0],
                got_1: bytes[1],
            });
        }
        if bytes.len() < HEADER_SIZE {
            return Ok(None);
        }

        let frame_type =
            FrameType::from_byte(bytes[2]).ok_or(ProtocolError::UnknownFrameType(bytes[2]))?;
        let length = bytes[3] as usize;
        if length > MAX_PAYLOAD {
            return Err(ProtocolError::PayloadTooLarge {
                length,
                maximum: MAX_PAYLOAD,
            });
        }

        let total = HEADER_SIZE + length + 1;
        if bytes.len() < total {
            return Ok(None);
        }

        let payload = &bytes[HEADER_SIZE..HEADER_SIZE + length];
        let expected = bytes[total - 1];
        let computed = Self::checksum(bytes[2], payload);
        if expected != computed {
            return Err(ProtocolError::ChecksumMismatch { expected, computed });
        }

        Ok(Some((Frame::new(frame_type, payload.to_vec()), total)))
    }

    /// Upper and lower limits carried by a `Limits` frame
    pub fn limits(&self) -> Result<([f64; 3], [f64; 3]), ProtocolError> {
        self.expect_type(FrameType::Limits)?;
        let values = decode_floats::<6>(self.frame_type, &self.payload)?;
        Ok((
            [values[0], values[1], values[2]],
            [values[3], values[4], values[5]],
        ))
    }

    /// Command carried by a `SetCommand` frame
    #[cfg(test)]
    pub fn command(&self) -> Result<CommandVector, ProtocolError> {
        self.expect_type(FrameType::SetCommand)?;
        let values = decode_floats::<3>(self.frame_type, &self.payload)?;
        Ok(CommandVector::new(values[0], values[1], values[2]))
    }

    fn expect_type(&self, expected: FrameType) -> Result<(), ProtocolError> {
        if self.frame_type == expected {
            Ok(())
        } else {
            Err(ProtocolError::UnexpectedFrame {
                expected,
                actual: self.frame_type,
            })
        }
    }
}

/// Scan a buffer for the start of a frame
pub fn find_sync(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(2)
        .position(|pair| pair[0] == SYNC_0 && pair[1] == SYNC_1)
}

/// Build a `Limits` reply, as sent by the control board
#[cfg(test)]
pub fn limits_frame(upper: [f64; 3], lower: [f64; 3]) -> Frame {
    let mut payload = encode_floats(&upper);
    payload.extend(encode_floats(&lower));
    Frame::new(FrameType::Limits, payload)
}

fn encode_floats(values: &[f64]) -> Vec<u8> {
    values
        .iter()
        .flat_map(|v| (*v as f32).to_le_bytes())
        .collect()
}

fn decode_floats<const N: usize>(
    frame_type: FrameType,
    payload: &[u8],
) -> Result<[f64; N], ProtocolError> {
    if payload.len() != N * 4 {
        return Err(ProtocolError::BadPayloadLength {
            frame_type,
            expected: N * 4,
            actual: payload.len(),
        });
    }

    let mut values = [0.0; N];
    for (value, chunk) in values.iter_mut().zip(payload.chunks_exact(4)) {
        *value = f64::from(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_frame_layout() {
        let bytes = Frame::query_limits().encode().unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + 1);
        assert_eq!(&bytes[..4], &[SYNC_0, SYNC_1, 0x01, 0x00]);
        assert_eq!(bytes[4], CRC8.checksum(&[0x01, 0x00]));
    }

    #[test]
    fn set_command_carries_three_floats() {
        let cmd = CommandVector::new(-1.5, 2.0, 0.25);
        let bytes = Frame::set_command(&cmd).encode().unwrap();
        assert_eq!(bytes[3], 12);
        assert_eq!(&bytes[4..8], &(-1.5f32).to_le_bytes());

        let (frame, used) = Frame::decode(&bytes).unwrap().unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(frame.command().unwrap(), cmd);
    }

    #[test]
    fn limits_reply_decodes() {
        let bytes = limits_frame([1.5, 3.0, 1.0], [-1.5, 0.0, 0.0])
            .encode()
            .unwrap();
        let (frame, _) = Frame::decode(&bytes).unwrap().unwrap();
        let (upper, lower) = frame.limits().unwrap();
        assert_eq!(upper, [1.5, 3.0, 1.0]);
        assert_eq!(lower, [-1.5, 0.0, 0.0]);
    }

    #[test]
    fn incomplete_frame_waits_for_more() {
        let bytes = limits_frame([1.0; 3], [0.0; 3]).encode().unwrap();
        assert_eq!(Frame::decode(&bytes[..1]).unwrap(), None);
        assert_eq!(Frame::decode(&bytes[..3]).unwrap(), None);
        assert_eq!(Frame::decode(&bytes[..bytes.len() - 1]).unwrap(), None);
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let mut bytes = Frame::set_command(&CommandVector::new(0.1, 0.2, 0.3))
            .encode()
            .unwrap();
        bytes[6] ^= 0xFF;
        assert!(matches!(
            Frame::decode(&bytes),
            Err(ProtocolError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn rejects_bad_sync_and_unknown_type() {
        assert!(matches!(
            Frame::decode(&[0x00, 0x5A, 0x01, 0x00, 0x00]),
            Err(ProtocolError::InvalidSync { .. })
        ));
        assert_eq!(
            Frame::decode(&[SYNC_0, SYNC_1, 0x42, 0x00, 0x00]),
            Err(ProtocolError::UnknownFrameType(0x42))
        );
    }

    #[test]
    fn rejects_oversized_length_field() {
        assert_eq!(
            Frame::decode(&[SYNC_0, SYNC_1, 0x81, 0xFF]),
            Err(ProtocolError::PayloadTooLarge {
                length: 0xFF,
                maximum: MAX_PAYLOAD
            })
        );
    }

    #[test]
    fn limits_from_wrong_frame_type() {
        let frame = Frame::set_command(&CommandVector::ZERO);
        assert_eq!(
            frame.limits(),
            Err(ProtocolError::UnexpectedFrame {
                expected: FrameType::Limits,
                actual: FrameType::SetCommand
            })
        );
    }

    #[test]
    fn short_limits_payload_is_rejected() {
        let frame = Frame::new(FrameType::Limits, vec![0; 12]);
        assert_eq!(
            frame.limits(),
            Err(ProtocolError::BadPayloadLength {
                frame_type: FrameType::Limits,
                expected: 24,
                actual: 12
            })
        );
    }

    #[test]
    fn finds_sync_after_garbage() {
        assert_eq!(find_sync(&[0x00, 0xA5, 0x00, 0xA5, 0x5A, 0x01]), Some(3));
        assert_eq!(find_sync(&[0xA5]), None);
        assert_eq!(find_sync(&[]), None);
    }
}
