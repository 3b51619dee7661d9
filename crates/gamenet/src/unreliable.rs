use crate::net::{ChannelType, EncodingError, Frame, wire_timestamp};

/// Fire-and-forget channel. Sequence numbers are stamped for observability
/// only and never used for ordering.
#[derive(Debug, Default)]
pub struct UnreliableChannel {
    next_sequence: u16,
    max_payload_size: usize,
}

impl UnreliableChannel {
    pub fn new(max_payload_size: usize) -> Self {
        Self {
            next_sequence: 0,
            max_payload_size,
        }
    }

    pub fn send(&mut self, payload: Vec<u8>, now_ms: u64) -> Result<Frame, EncodingError> {
        if payload.len() > self.max_payload_size {
            return Err(EncodingError::Oversized {
                len: payload.len(),
                max: self.max_payload_size,
            });
        }

        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);

        Ok(Frame::new(
            ChannelType::Unreliable,
            sequence,
            wire_timestamp(now_ms),
            payload,
        ))
    }

    pub fn next_sequence(&self) -> u16 {
        self.next_sequence
    }
}
