//! Wire framing: a fixed 7-byte header followed by an opaque payload.
//!
//! ```text
//!  0        1        2        3        4        5        6        7 ...
//! +--------+--------+--------+--------+--------+--------+--------+-------
//! | chan   |   sequence (BE) |         timestamp ms (BE)         | payload
//! +--------+--------+--------+--------+--------+--------+--------+-------
//! ```
//!
//! Reliable frames carry either application data or an acknowledgment. An
//! acknowledgment is recognised by the [`ACK_MARKER`] prefix in the payload.

pub const HEADER_SIZE: usize = 7;
pub const MAX_DATAGRAM_SIZE: usize = 1200;

pub const ACK_MARKER: &[u8; 4] = b"ACK:";
pub const ACK_BODY_SIZE: usize = ACK_MARKER.len() + 2 + 4;

const SEQUENCE_WRAP_THRESHOLD: u16 = u16::MAX / 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ChannelType {
    Reliable,
    Unreliable,
}

impl ChannelType {
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Reliable => 0,
            Self::Unreliable => 1,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Reliable),
            1 => Some(Self::Unreliable),
            _ => None,
        }
    }
}

/// `true` when `s1` is newer than `s2`, accounting for wraparound at 65536.
#[inline]
pub fn sequence_greater_than(s1: u16, s2: u16) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    #[error("payload of {len} bytes exceeds the {max}-byte limit")]
    Oversized { len: usize, max: usize },
    #[error("reliable payload starts with the reserved ACK marker")]
    ReservedPrefix,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedFrame {
    #[error("datagram of {len} bytes is shorter than the 7-byte header")]
    Truncated { len: usize },
    #[error("unknown channel type {0:#04x}")]
    UnknownChannel(u8),
    #[error("ACK body of {len} bytes, expected 10")]
    BadAck { len: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub channel: ChannelType,
    pub sequence: u16,
    pub timestamp: u32,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(channel: ChannelType, sequence: u16, timestamp: u32, payload: Vec<u8>) -> Self {
        Self {
            channel,
            sequence,
            timestamp,
            payload,
        }
    }

    pub fn encode(&self, max_datagram_size: usize) -> Result<Vec<u8>, EncodingError> {
        encode(
            self.channel,
            self.sequence,
            self.timestamp,
            &self.payload,
            max_datagram_size,
        )
    }

    pub fn decode(data: &[u8]) -> Result<Self, MalformedFrame> {
        decode(data)
    }
}

pub fn encode(
    channel: ChannelType,
    sequence: u16,
    timestamp: u32,
    payload: &[u8],
    max_datagram_size: usize,
) -> Result<Vec<u8>, EncodingError> {
    let max = max_datagram_size.saturating_sub(HEADER_SIZE);
    if payload.len() > max {
        return Err(EncodingError::Oversized {
            len: payload.len(),
            max,
        });
    }

    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.push(channel.as_byte());
    out.extend_from_slice(&sequence.to_be_bytes());
    out.extend_from_slice(&timestamp.to_be_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

pub fn decode(data: &[u8]) -> Result<Frame, MalformedFrame> {
    if data.len() < HEADER_SIZE {
        return Err(MalformedFrame::Truncated { len: data.len() });
    }

    let channel = ChannelType::from_byte(data[0]).ok_or(MalformedFrame::UnknownChannel(data[0]))?;
    let sequence = u16::from_be_bytes([data[1], data[2]]);
    let timestamp = u32::from_be_bytes([data[3], data[4], data[5], data[6]]);

    Ok(Frame {
        channel,
        sequence,
        timestamp,
        payload: data[HEADER_SIZE..].to_vec(),
    })
}

/// Payload of a Reliable frame, split by the reserved ACK prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReliablePayload {
    Data(Vec<u8>),
    Ack { sequence: u16, echo_timestamp: u32 },
}

impl ReliablePayload {
    pub fn parse(payload: Vec<u8>) -> Result<Self, MalformedFrame> {
        if !payload.starts_with(ACK_MARKER) {
            return Ok(Self::Data(payload));
        }
        if payload.len() != ACK_BODY_SIZE {
            return Err(MalformedFrame::BadAck { len: payload.len() });
        }

        let body = &payload[ACK_MARKER.len()..];
        Ok(Self::Ack {
            sequence: u16::from_be_bytes([body[0], body[1]]),
            echo_timestamp: u32::from_be_bytes([body[2], body[3], body[4], body[5]]),
        })
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Data(data) => data,
            Self::Ack {
                sequence,
                echo_timestamp,
            } => {
                let mut out = Vec::with_capacity(ACK_BODY_SIZE);
                out.extend_from_slice(ACK_MARKER);
                out.extend_from_slice(&sequence.to_be_bytes());
                out.extend_from_slice(&echo_timestamp.to_be_bytes());
                out
            }
        }
    }
}

/// Builds the Reliable frame acknowledging `sequence`.
pub fn ack_frame(sequence: u16, echo_timestamp: u32, now_timestamp: u32) -> Frame {
    let payload = ReliablePayload::Ack {
        sequence,
        echo_timestamp,
    }
    .into_bytes();
    Frame::new(ChannelType::Reliable, sequence, now_timestamp, payload)
}

/// Truncates a millisecond clock reading to the 32-bit wire timestamp.
#[inline]
pub fn wire_timestamp(now_ms: u64) -> u32 {
    now_ms as u32
}
