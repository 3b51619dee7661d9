use serde::Serialize;

/// Counters and gauges for one session. Derived figures such as jitter,
/// throughput or delivery ratio are left to the consumer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionStats {
    pub reliable_sent: u64,
    pub unreliable_sent: u64,
    pub reliable_delivered: u64,
    pub unreliable_delivered: u64,
    pub acks_sent: u64,
    pub duplicate_acks_sent: u64,
    pub acks_received: u64,
    pub acks_accepted: u64,
    pub duplicate_acks_received: u64,
    pub retransmissions: u64,
    pub fast_retransmits: u64,
    pub delivery_failures: u64,
    pub packets_reordered: u64,
    pub buffer_skips: u64,
    pub sequences_skipped: u64,
    pub late_duplicates: u64,
    pub buffer_overflows: u64,
    pub malformed_frames: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub in_flight: usize,
    pub buffered: usize,
    pub srtt_ms: Option<f32>,
    pub rtt_variance_ms: f32,
    pub last_rtt_ms: Option<f32>,
}
