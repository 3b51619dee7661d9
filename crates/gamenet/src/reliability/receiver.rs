use super::reorder::{Arrival, ReadyPacket, ReorderBuffer, Skip};
use crate::config::ReliabilityConfig;
use crate::net::{Frame, ack_frame, wire_timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrivalKind {
    InOrder,
    Buffered,
    AlreadyBuffered,
    Overflow,
    Late,
}

#[derive(Debug, Clone)]
pub struct ReceiveOutcome {
    pub kind: ArrivalKind,
    pub ack: Frame,
    /// The ACK names the last in-order sequence rather than the arrival.
    pub duplicate_ack: bool,
    pub delivered: Vec<ReadyPacket>,
    /// One ACK per packet released from the buffer behind the arrival.
    pub release_acks: Vec<Frame>,
}

/// A skip plus the ACKs for the packets it released.
#[derive(Debug, Clone)]
pub struct SkipOutcome {
    pub skip: Skip,
    pub acks: Vec<Frame>,
}

/// Receive side of the reliable channel: feeds the reorder buffer and
/// answers every data frame with an ACK.
#[derive(Debug)]
pub struct ReliableReceiver {
    buffer: ReorderBuffer,
    reorder_timeout_ms: u64,
}

impl ReliableReceiver {
    pub fn new(config: &ReliabilityConfig) -> Self {
        Self {
            buffer: ReorderBuffer::new(config.reorder_buffer_size),
            reorder_timeout_ms: config.reorder_timeout_ms,
        }
    }

    pub fn on_data(
        &mut self,
        sequence: u16,
        timestamp: u32,
        payload: Vec<u8>,
        now_ms: u64,
    ) -> ReceiveOutcome {
        let now_ts = wire_timestamp(now_ms);
        let arrival = self.buffer.insert(sequence, payload, timestamp, now_ms);

        let (kind, delivered) = match arrival {
            Arrival::InOrder(ready) => (ArrivalKind::InOrder, ready),
            Arrival::Buffered => (ArrivalKind::Buffered, Vec::new()),
            Arrival::AlreadyBuffered => (ArrivalKind::AlreadyBuffered, Vec::new()),
            Arrival::Overflow => (ArrivalKind::Overflow, Vec::new()),
            Arrival::Late => (ArrivalKind::Late, Vec::new()),
        };

        let duplicate_ack = matches!(
            kind,
            ArrivalKind::Buffered | ArrivalKind::AlreadyBuffered | ArrivalKind::Overflow
        );
        let acked = if duplicate_ack {
            self.buffer.last_delivered()
        } else {
            sequence
        };

        ReceiveOutcome {
            kind,
            ack: ack_frame(acked, timestamp, now_ts),
            duplicate_ack,
            release_acks: release_acks(&delivered, now_ts),
            delivered,
        }
    }

    pub fn poll_timeout(&mut self, now_ms: u64) -> Vec<SkipOutcome> {
        let now_ts = wire_timestamp(now_ms);
        self.buffer
            .skip_expired(now_ms, self.reorder_timeout_ms)
            .into_iter()
            .map(|skip| SkipOutcome {
                acks: release_acks(&skip.released, now_ts),
                skip,
            })
            .collect()
    }

    /// When the oldest buffered packet will force a skip.
    pub fn next_deadline(&self) -> Option<u64> {
        self.buffer
            .oldest_buffered_at()
            .map(|at| at + self.reorder_timeout_ms)
    }

    pub fn last_delivered(&self) -> u16 {
        self.buffer.last_delivered()
    }

    pub fn buffered_count(&self) -> usize {
        self.buffer.len()
    }
}

// Each packet leaving the buffer is acknowledged by its own sequence.
fn release_acks(ready: &[ReadyPacket], now_ts: u32) -> Vec<Frame> {
    ready
        .iter()
        .filter(|p| p.from_buffer)
        .map(|p| ack_frame(p.sequence, p.timestamp, now_ts))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::ReliablePayload;

    fn acked_sequence(frame: &Frame) -> u16 {
        match ReliablePayload::parse(frame.payload.clone()).unwrap() {
            ReliablePayload::Ack { sequence, .. } => sequence,
            ReliablePayload::Data(_) => panic!("Expected ACK payload"),
        }
    }

    #[test]
    fn test_in_order_arrival_acks_itself() {
        let mut receiver = ReliableReceiver::new(&ReliabilityConfig::default());
        let outcome = receiver.on_data(0, 500, b"a".to_vec(), 520);

        assert_eq!(outcome.kind, ArrivalKind::InOrder);
        assert!(!outcome.duplicate_ack);
        assert_eq!(acked_sequence(&outcome.ack), 0);
        assert_eq!(outcome.ack.timestamp, 520);
        assert_eq!(outcome.delivered.len(), 1);
        assert!(outcome.release_acks.is_empty());
    }

    #[test]
    fn test_gap_produces_duplicate_acks() {
        let mut receiver = ReliableReceiver::new(&ReliabilityConfig::default());
        receiver.on_data(0, 0, vec![], 0);

        for seq in 2..5 {
            let outcome = receiver.on_data(seq, 0, vec![], 0);
            assert_eq!(outcome.kind, ArrivalKind::Buffered);
            assert!(outcome.duplicate_ack);
            assert_eq!(acked_sequence(&outcome.ack), 0);
            assert!(outcome.delivered.is_empty());
        }

        let outcome = receiver.on_data(1, 0, vec![], 0);
        assert_eq!(acked_sequence(&outcome.ack), 1);
        assert_eq!(outcome.delivered.len(), 4);
        let released: Vec<u16> = outcome.release_acks.iter().map(acked_sequence).collect();
        assert_eq!(released, vec![2, 3, 4]);
        assert_eq!(receiver.last_delivered(), 4);
    }

    #[test]
    fn test_late_arrival_is_reacked() {
        let mut receiver = ReliableReceiver::new(&ReliabilityConfig::default());
        receiver.on_data(0, 0, vec![], 0);

        let outcome = receiver.on_data(0, 0, vec![], 10);
        assert_eq!(outcome.kind, ArrivalKind::Late);
        assert!(!outcome.duplicate_ack);
        assert_eq!(acked_sequence(&outcome.ack), 0);
        assert!(outcome.delivered.is_empty());
    }

    #[test]
    fn test_first_packet_lost_acks_previous_wrap() {
        let mut receiver = ReliableReceiver::new(&ReliabilityConfig::default());
        let outcome = receiver.on_data(1, 0, vec![], 0);
        assert_eq!(acked_sequence(&outcome.ack), u16::MAX);
    }

    #[test]
    fn test_skip_deadline_tracks_oldest_packet() {
        let mut receiver = ReliableReceiver::new(&ReliabilityConfig::default());
        assert_eq!(receiver.next_deadline(), None);

        receiver.on_data(3, 0, vec![], 100);
        receiver.on_data(4, 0, vec![], 300);
        assert_eq!(receiver.next_deadline(), Some(2_100));
        assert!(receiver.poll_timeout(2_099).is_empty());

        let skips = receiver.poll_timeout(2_100);
        assert_eq!(skips.len(), 1);
        assert_eq!(skips[0].skip.first_missing, 0);
        let acked: Vec<u16> = skips[0].acks.iter().map(acked_sequence).collect();
        assert_eq!(acked, vec![3, 4]);
        assert_eq!(skips[0].acks[0].timestamp, 2_100);
        assert_eq!(receiver.buffered_count(), 0);
    }
}
