use crate::net::{ChannelType, MalformedFrame, wire_timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrivalMetadata {
    pub sequence: u16,
    /// Sender-local wire timestamp from the frame header.
    pub send_timestamp: u32,
    pub received_at_ms: u64,
    /// Held in the reorder buffer before delivery.
    pub reordered: bool,
    /// Released by a skip-after-timeout rather than by the gap closing.
    pub after_skip: bool,
}

impl ArrivalMetadata {
    /// Receive time minus send timestamp. Only meaningful when both peers
    /// read the same clock; readings that went backwards give zero.
    pub fn one_way_latency_ms(&self) -> u32 {
        let delta = wire_timestamp(self.received_at_ms).wrapping_sub(self.send_timestamp);
        if delta > i32::MAX as u32 { 0 } else { delta }
    }
}

/// A payload handed to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub channel: ChannelType,
    pub payload: Vec<u8>,
    pub metadata: ArrivalMetadata,
}

/// Observable protocol activity, drained with `Session::drain_events`.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PacketSent {
        channel: ChannelType,
        sequence: u16,
        timestamp: u32,
        retransmission: bool,
    },
    PacketReceived {
        channel: ChannelType,
        sequence: u16,
        timestamp: u32,
    },
    AckSent {
        sequence: u16,
        duplicate: bool,
    },
    AckAccepted {
        sequence: u16,
        rtt_ms: f32,
    },
    FastRetransmit {
        sequence: u16,
    },
    /// Retry budget exhausted; the packet is no longer tracked.
    DeliveryFailure {
        sequence: u16,
        attempts: u32,
    },
    BufferSkip {
        first_missing: u16,
        missing: u16,
        released: usize,
    },
    BufferOverflow {
        sequence: u16,
    },
    MalformedFrame {
        len: usize,
        error: MalformedFrame,
    },
}
