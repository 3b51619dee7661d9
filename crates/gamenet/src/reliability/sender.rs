//! Send side of the reliable channel.
//!
//! Every outgoing packet stays in the in-flight table until its ACK arrives
//! or its retry budget runs out. Loss is detected two ways:
//!
//! - the packet's retransmission timer fires (fixed RTO), or
//! - the peer keeps acknowledging the packet *before* it. The receiver answers
//!   every out-of-order arrival with an ACK for its last in-order sequence, so
//!   a run of identical ACKs means the next packet never arrived. On the
//!   threshold-th duplicate the next packet is resent at once.
//!
//! The sender does no I/O; it hands back frames for the session to transmit.

use std::collections::HashMap;
use std::time::Duration;

use super::rtt::RttEstimator;
use super::scheduler::{RetransmissionScheduler, TimerHandle};
use crate::config::ReliabilityConfig;
use crate::net::{ACK_MARKER, ChannelType, EncodingError, Frame, wire_timestamp};

#[derive(Debug, Clone)]
pub struct InFlightPacket {
    pub sequence: u16,
    pub payload: Vec<u8>,
    /// Wire timestamp of the first transmission. Retransmissions resend the
    /// frame byte for byte, so this never changes.
    pub send_timestamp: u32,
    /// Local time of the most recent transmission, used for RTT samples.
    pub last_sent_ms: u64,
    pub retry_count: u8,
    pub timer: TimerHandle,
}

impl InFlightPacket {
    pub fn frame(&self) -> Frame {
        Frame::new(
            ChannelType::Reliable,
            self.sequence,
            self.send_timestamp,
            self.payload.clone(),
        )
    }

    pub fn attempts(&self) -> u32 {
        self.retry_count as u32 + 1
    }
}

/// A reliable packet abandoned after exhausting its retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub sequence: u16,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AckOutcome {
    Accepted { sequence: u16, rtt_ms: f32 },
    /// Nothing was in flight for this sequence.
    Duplicate { sequence: u16, count: u32 },
    /// The duplicate run hit the threshold and the following packet was resent.
    FastRetransmit { duplicate_of: u16, frame: Frame },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimerOutcome {
    Retransmit { frame: Frame, attempt: u32 },
    Failed(DeliveryFailure),
}

#[derive(Debug, Clone, Copy)]
struct DuplicateRun {
    sequence: u16,
    count: u32,
    fired: bool,
}

#[derive(Debug)]
pub struct ReliableSender {
    next_sequence: u16,
    in_flight: HashMap<u16, InFlightPacket>,
    scheduler: RetransmissionScheduler,
    rtt: RttEstimator,
    duplicate_run: Option<DuplicateRun>,
    displaced: Vec<DeliveryFailure>,
    max_retransmits: u8,
    duplicate_ack_threshold: u32,
    max_payload_size: usize,
}

impl ReliableSender {
    pub fn new(config: &ReliabilityConfig) -> Self {
        Self {
            next_sequence: 0,
            in_flight: HashMap::new(),
            scheduler: RetransmissionScheduler::new(config.retransmit_timeout_ms),
            rtt: RttEstimator::new(Duration::from_millis(config.retransmit_timeout_ms)),
            duplicate_run: None,
            displaced: Vec::new(),
            max_retransmits: config.max_retransmits,
            duplicate_ack_threshold: config.duplicate_ack_threshold,
            max_payload_size: config.max_payload_size(),
        }
    }

    /// Sequences `payload`, records it as in flight and arms its timer.
    /// Returns the frame for its first transmission.
    pub fn send(&mut self, payload: Vec<u8>, now_ms: u64) -> Result<Frame, EncodingError> {
        if payload.len() > self.max_payload_size {
            return Err(EncodingError::Oversized {
                len: payload.len(),
                max: self.max_payload_size,
            });
        }
        if payload.starts_with(ACK_MARKER) {
            return Err(EncodingError::ReservedPrefix);
        }

        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);

        if let Some(stale) = self.in_flight.remove(&sequence) {
            log::warn!(
                "R#{} still unacknowledged after a full sequence wrap, giving up on it",
                sequence
            );
            self.scheduler.cancel(sequence);
            self.displaced.push(DeliveryFailure {
                sequence,
                attempts: stale.attempts(),
            });
        }

        let timer = self.scheduler.schedule(sequence, now_ms);
        let packet = InFlightPacket {
            sequence,
            payload,
            send_timestamp: wire_timestamp(now_ms),
            last_sent_ms: now_ms,
            retry_count: 0,
            timer,
        };
        let frame = packet.frame();
        self.in_flight.insert(sequence, packet);

        Ok(frame)
    }

    pub fn on_ack(&mut self, sequence: u16, now_ms: u64) -> AckOutcome {
        if let Some(packet) = self.in_flight.remove(&sequence) {
            self.scheduler.cancel(sequence);

            let rtt_ms = now_ms.saturating_sub(packet.last_sent_ms) as f32;
            self.rtt.record_sample(rtt_ms);
            self.duplicate_run = Some(DuplicateRun {
                sequence,
                count: 0,
                fired: false,
            });

            return AckOutcome::Accepted { sequence, rtt_ms };
        }

        let mut run = match self.duplicate_run {
            Some(run) if run.sequence == sequence => DuplicateRun {
                count: run.count.saturating_add(1),
                ..run
            },
            _ => DuplicateRun {
                sequence,
                count: 1,
                fired: false,
            },
        };
        let count = run.count;

        if run.fired || count < self.duplicate_ack_threshold {
            self.duplicate_run = Some(run);
            return AckOutcome::Duplicate { sequence, count };
        }
        run.fired = true;
        self.duplicate_run = Some(run);

        match self.fast_retransmit(sequence.wrapping_add(1), now_ms) {
            Some(frame) => AckOutcome::FastRetransmit {
                duplicate_of: sequence,
                frame,
            },
            None => AckOutcome::Duplicate { sequence, count },
        }
    }

    /// Resends `sequence` immediately and restarts its timer. Counts against
    /// the retry budget; a packet with no retries left is left to its timer.
    pub fn fast_retransmit(&mut self, sequence: u16, now_ms: u64) -> Option<Frame> {
        let packet = self.in_flight.get_mut(&sequence)?;
        if packet.retry_count >= self.max_retransmits {
            return None;
        }

        packet.timer = self.scheduler.reset(sequence, now_ms)?;
        packet.retry_count += 1;
        packet.last_sent_ms = now_ms;
        Some(packet.frame())
    }

    /// Fires every expired timer: resend while retries remain, otherwise
    /// drop the packet and report the failure.
    pub fn on_timer(&mut self, now_ms: u64) -> Vec<TimerOutcome> {
        let mut outcomes = Vec::new();

        for sequence in self.scheduler.expired(now_ms) {
            let Some(packet) = self.in_flight.get_mut(&sequence) else {
                continue;
            };

            if packet.retry_count < self.max_retransmits {
                packet.retry_count += 1;
                packet.last_sent_ms = now_ms;
                packet.timer = self.scheduler.schedule(sequence, now_ms);
                outcomes.push(TimerOutcome::Retransmit {
                    frame: packet.frame(),
                    attempt: packet.attempts(),
                });
            } else if let Some(packet) = self.in_flight.remove(&sequence) {
                outcomes.push(TimerOutcome::Failed(DeliveryFailure {
                    sequence,
                    attempts: packet.attempts(),
                }));
            }
        }

        outcomes
    }

    /// Packets pushed out of the in-flight table by a sequence number that
    /// wrapped around onto them while still unacknowledged.
    pub fn take_displaced(&mut self) -> Vec<DeliveryFailure> {
        std::mem::take(&mut self.displaced)
    }

    pub fn next_deadline(&mut self) -> Option<u64> {
        self.scheduler.next_deadline()
    }

    pub fn next_sequence(&self) -> u16 {
        self.next_sequence
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_in_flight(&self, sequence: u16) -> bool {
        self.in_flight.contains_key(&sequence)
    }

    pub fn in_flight(&self, sequence: u16) -> Option<&InFlightPacket> {
        self.in_flight.get(&sequence)
    }

    pub fn rtt(&self) -> &RttEstimator {
        &self.rtt
    }
}
