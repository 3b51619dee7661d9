use std::collections::HashMap;

use crate::net::sequence_greater_than;

#[derive(Debug, Clone)]
pub struct BufferedPacket {
    pub sequence: u16,
    pub payload: Vec<u8>,
    pub timestamp: u32,
    pub buffered_at_ms: u64,
}

/// A packet released to the application, in sequence order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyPacket {
    pub sequence: u16,
    pub payload: Vec<u8>,
    pub timestamp: u32,
    pub arrived_at_ms: u64,
    /// Waited in the buffer for a gap to close.
    pub from_buffer: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arrival {
    /// The expected packet, followed by any buffered run it unblocked.
    InOrder(Vec<ReadyPacket>),
    Buffered,
    AlreadyBuffered,
    /// Out of order with the buffer at capacity; the packet was dropped.
    Overflow,
    /// At or behind the last delivered sequence.
    Late,
}

/// A gap given up on after the reorder timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skip {
    pub first_missing: u16,
    pub missing: u16,
    pub released: Vec<ReadyPacket>,
}

/// Holds out-of-order reliable packets and releases them strictly in
/// sequence order.
#[derive(Debug)]
pub struct ReorderBuffer {
    next_expected: u16,
    buffer: HashMap<u16, BufferedPacket>,
    max_size: usize,
}

impl ReorderBuffer {
    pub fn new(max_size: usize) -> Self {
        Self {
            next_expected: 0,
            buffer: HashMap::new(),
            max_size,
        }
    }

    pub fn next_expected(&self) -> u16 {
        self.next_expected
    }

    /// Highest sequence of the contiguous delivered prefix.
    pub fn last_delivered(&self) -> u16 {
        self.next_expected.wrapping_sub(1)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn contains(&self, sequence: u16) -> bool {
        self.buffer.contains_key(&sequence)
    }

    pub fn insert(&mut self, sequence: u16, payload: Vec<u8>, timestamp: u32, now_ms: u64) -> Arrival {
        if sequence == self.next_expected {
            let mut ready = vec![ReadyPacket {
                sequence,
                payload,
                timestamp,
                arrived_at_ms: now_ms,
                from_buffer: false,
            }];
            self.next_expected = self.next_expected.wrapping_add(1);
            self.drain_contiguous(&mut ready);
            return Arrival::InOrder(ready);
        }

        if !sequence_greater_than(sequence, self.next_expected) {
            return Arrival::Late;
        }
        if self.buffer.contains_key(&sequence) {
            return Arrival::AlreadyBuffered;
        }
        if self.buffer.len() >= self.max_size {
            return Arrival::Overflow;
        }

        self.buffer.insert(
            sequence,
            BufferedPacket {
                sequence,
                payload,
                timestamp,
                buffered_at_ms: now_ms,
            },
        );
        Arrival::Buffered
    }

    pub fn oldest_buffered_at(&self) -> Option<u64> {
        self.buffer.values().map(|p| p.buffered_at_ms).min()
    }

    /// Gives up on every gap whose oldest waiting packet has been buffered
    /// for at least `timeout_ms`: jumps past the missing range and releases
    /// the run that becomes contiguous.
    pub fn skip_expired(&mut self, now_ms: u64, timeout_ms: u64) -> Vec<Skip> {
        let mut skips = Vec::new();

        while let Some(oldest) = self.oldest_buffered_at() {
            if now_ms.saturating_sub(oldest) < timeout_ms {
                break;
            }

            let expected = self.next_expected;
            let Some(resume_at) = self
                .buffer
                .keys()
                .copied()
                .min_by_key(|s| s.wrapping_sub(expected))
            else {
                break;
            };

            self.next_expected = resume_at;
            let mut released = Vec::new();
            self.drain_contiguous(&mut released);

            let last_delivered = self.last_delivered();
            self.buffer
                .retain(|&s, _| sequence_greater_than(s, last_delivered));

            skips.push(Skip {
                first_missing: expected,
                missing: resume_at.wrapping_sub(expected),
                released,
            });
        }

        skips
    }

    fn drain_contiguous(&mut self, ready: &mut Vec<ReadyPacket>) {
        while let Some(packet) = self.buffer.remove(&self.next_expected) {
            ready.push(ReadyPacket {
                sequence: packet.sequence,
                payload: packet.payload,
                timestamp: packet.timestamp,
                arrived_at_ms: packet.buffered_at_ms,
                from_buffer: true,
            });
            self.next_expected = self.next_expected.wrapping_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sequences(arrival: &Arrival) -> Vec<u16> {
        match arrival {
            Arrival::InOrder(ready) => ready.iter().map(|p| p.sequence).collect(),
            _ => Vec::new(),
        }
    }

    #[test]
    fn test_in_order_passes_straight_through() {
        let mut buffer = ReorderBuffer::new(500);
        for seq in 0..5 {
            assert_eq!(sequences(&buffer.insert(seq, vec![seq as u8], 0, 0)), vec![seq]);
        }
        assert_eq!(buffer.last_delivered(), 4);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_gap_closes_in_order() {
        let mut buffer = ReorderBuffer::new(500);
        buffer.insert(0, vec![], 0, 0);

        assert_eq!(buffer.insert(2, vec![], 0, 0), Arrival::Buffered);
        assert_eq!(buffer.insert(3, vec![], 0, 0), Arrival::Buffered);
        assert_eq!(buffer.insert(3, vec![], 0, 0), Arrival::AlreadyBuffered);

        let arrival = buffer.insert(1, vec![], 0, 0);
        assert_eq!(sequences(&arrival), vec![1, 2, 3]);
        if let Arrival::InOrder(ready) = arrival {
            assert!(!ready[0].from_buffer);
            assert!(ready[1].from_buffer && ready[2].from_buffer);
        }
        assert_eq!(buffer.next_expected(), 4);
    }

    #[test]
    fn test_late_packets_are_not_redelivered() {
        let mut buffer = ReorderBuffer::new(500);
        buffer.insert(0, vec![], 0, 0);
        buffer.insert(1, vec![], 0, 0);

        assert_eq!(buffer.insert(1, vec![], 0, 0), Arrival::Late);
        assert_eq!(buffer.insert(0, vec![], 0, 0), Arrival::Late);
    }

    #[test]
    fn test_wraps_around_sequence_space() {
        let mut buffer = ReorderBuffer::new(500);
        buffer.next_expected = u16::MAX;

        assert_eq!(buffer.insert(0, vec![], 0, 0), Arrival::Buffered);
        assert_eq!(sequences(&buffer.insert(u16::MAX, vec![], 0, 0)), vec![u16::MAX, 0]);
        assert_eq!(buffer.next_expected(), 1);
    }

    #[test]
    fn test_overflow_drops_new_arrivals() {
        let mut buffer = ReorderBuffer::new(2);
        assert_eq!(buffer.insert(5, vec![], 0, 0), Arrival::Buffered);
        assert_eq!(buffer.insert(6, vec![], 0, 0), Arrival::Buffered);
        assert_eq!(buffer.insert(7, vec![], 0, 0), Arrival::Overflow);
        assert!(!buffer.contains(7));
    }

    #[test]
    fn test_skip_after_timeout_releases_run() {
        let mut buffer = ReorderBuffer::new(500);
        for seq in 0..6 {
            buffer.insert(seq, vec![], 0, 0);
        }
        buffer.insert(7, b"seven".to_vec(), 0, 1_000);
        buffer.insert(8, b"eight".to_vec(), 0, 1_100);
        buffer.insert(10, b"ten".to_vec(), 0, 2_900);

        assert!(buffer.skip_expired(2_999, 2_000).is_empty());

        let skips = buffer.skip_expired(3_000, 2_000);
        assert_eq!(skips.len(), 1);
        assert_eq!(skips[0].first_missing, 6);
        assert_eq!(skips[0].missing, 1);
        let released: Vec<u16> = skips[0].released.iter().map(|p| p.sequence).collect();
        assert_eq!(released, vec![7, 8]);
        assert_eq!(buffer.next_expected(), 9);
        assert!(buffer.contains(10));

        assert_eq!(buffer.insert(6, vec![], 0, 3_001), Arrival::Late);

        let skips = buffer.skip_expired(4_900, 2_000);
        assert_eq!(skips.len(), 1);
        assert_eq!(skips[0].first_missing, 9);
        assert_eq!(buffer.next_expected(), 11);
    }

    #[test]
    fn test_successive_stale_gaps_skip_together() {
        let mut buffer = ReorderBuffer::new(500);
        buffer.insert(2, vec![], 0, 0);
        buffer.insert(5, vec![], 0, 10);

        let skips = buffer.skip_expired(5_000, 2_000);
        assert_eq!(skips.len(), 2);
        assert_eq!((skips[0].first_missing, skips[0].missing), (0, 2));
        assert_eq!((skips[1].first_missing, skips[1].missing), (3, 2));
        assert!(buffer.is_empty());
        assert_eq!(buffer.last_delivered(), 5);
    }
}
