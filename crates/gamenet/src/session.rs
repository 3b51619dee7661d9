//! One peer-to-peer session: a reliable and an unreliable channel sharing a
//! single transport.
//!
//! The session is poll driven. Call [`Session::poll`] often (every tick, or
//! whenever [`Session::next_wakeup_ms`] comes due); it drains the transport,
//! routes every datagram by its channel byte and then runs the
//! retransmission and reorder timers. Payloads come out through
//! [`Session::recv`] and protocol activity through [`Session::drain_events`].

use std::collections::VecDeque;

use log::{debug, info, trace, warn};

use crate::config::ReliabilityConfig;
use crate::error::Result;
use crate::event::{ArrivalMetadata, Delivery, SessionEvent};
use crate::net::{
    ChannelType, Clock, Frame, MalformedFrame, RECV_BUFFER_SIZE, ReliablePayload, SessionStats,
    SystemClock, Transport,
};
use crate::reliability::{
    AckOutcome, ArrivalKind, DeliveryFailure, ReadyPacket, ReliableReceiver, ReliableSender,
    RttEstimator, SkipOutcome, TimerOutcome,
};
use crate::unreliable::UnreliableChannel;

pub struct Session<T, C = SystemClock> {
    transport: T,
    clock: C,
    config: ReliabilityConfig,
    sender: ReliableSender,
    receiver: ReliableReceiver,
    unreliable: UnreliableChannel,
    deliveries: VecDeque<Delivery>,
    events: VecDeque<SessionEvent>,
    stats: SessionStats,
    recv_buffer: Vec<u8>,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, config: ReliabilityConfig) -> Result<Self> {
        Self::with_clock(transport, SystemClock::new(), config)
    }
}

impl<T: Transport, C: Clock> Session<T, C> {
    pub fn with_clock(transport: T, clock: C, config: ReliabilityConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            sender: ReliableSender::new(&config),
            receiver: ReliableReceiver::new(&config),
            unreliable: UnreliableChannel::new(config.max_payload_size()),
            transport,
            clock,
            config,
            deliveries: VecDeque::new(),
            events: VecDeque::new(),
            stats: SessionStats::default(),
            recv_buffer: vec![0u8; RECV_BUFFER_SIZE],
        })
    }

    /// Queues `payload` for guaranteed, in-order delivery and transmits it.
    ///
    /// The packet is tracked before it reaches the transport, so an I/O error
    /// returned here is still recovered by the retransmission timer.
    pub fn send_reliable(&mut self, payload: impl Into<Vec<u8>>) -> Result<u16> {
        let now = self.clock.now_ms();
        let frame = self.sender.send(payload.into(), now)?;
        self.stats.reliable_sent += 1;
        for failure in self.sender.take_displaced() {
            self.report_failure(failure);
        }

        debug!(
            "[SEND] R#{} ({} bytes, ts={})",
            frame.sequence,
            frame.payload.len(),
            frame.timestamp
        );
        self.transmit(&frame, false)?;
        Ok(frame.sequence)
    }

    pub fn send_unreliable(&mut self, payload: impl Into<Vec<u8>>) -> Result<u16> {
        let now = self.clock.now_ms();
        let frame = self.unreliable.send(payload.into(), now)?;
        self.stats.unreliable_sent += 1;

        trace!("[SEND] U#{} ({} bytes)", frame.sequence, frame.payload.len());
        self.transmit(&frame, false)?;
        Ok(frame.sequence)
    }

    /// Drains every datagram the transport has ready, then runs timers.
    pub fn poll(&mut self) -> Result<()> {
        let mut buf = std::mem::take(&mut self.recv_buffer);
        let result = self.drain_transport(&mut buf);
        self.recv_buffer = buf;

        self.process_timers();
        result
    }

    fn drain_transport(&mut self, buf: &mut [u8]) -> Result<()> {
        while let Some(size) = self.transport.recv(buf)? {
            self.handle_datagram(&buf[..size]);
        }
        Ok(())
    }

    /// Routes one raw datagram. Malformed input is counted and dropped.
    pub fn handle_datagram(&mut self, data: &[u8]) {
        let now = self.clock.now_ms();
        self.stats.bytes_received += data.len() as u64;

        let frame = match Frame::decode(data) {
            Ok(frame) => frame,
            Err(error) => {
                self.reject(data.len(), error);
                return;
            }
        };

        let Frame {
            channel,
            sequence,
            timestamp,
            payload,
        } = frame;

        match channel {
            ChannelType::Unreliable => self.handle_unreliable(sequence, timestamp, payload, now),
            ChannelType::Reliable => match ReliablePayload::parse(payload) {
                Ok(ReliablePayload::Ack { sequence, .. }) => self.handle_ack(sequence, now),
                Ok(ReliablePayload::Data(payload)) => {
                    self.handle_reliable(sequence, timestamp, payload, now)
                }
                Err(error) => self.reject(data.len(), error),
            },
        }
    }

    fn reject(&mut self, len: usize, error: MalformedFrame) {
        warn!("Dropping malformed datagram ({} bytes): {}", len, error);
        self.stats.malformed_frames += 1;
        self.events
            .push_back(SessionEvent::MalformedFrame { len, error });
    }

    fn handle_unreliable(&mut self, sequence: u16, timestamp: u32, payload: Vec<u8>, now: u64) {
        trace!("[RECV] U#{} ({} bytes)", sequence, payload.len());
        self.events.push_back(SessionEvent::PacketReceived {
            channel: ChannelType::Unreliable,
            sequence,
            timestamp,
        });

        self.stats.unreliable_delivered += 1;
        self.deliveries.push_back(Delivery {
            channel: ChannelType::Unreliable,
            payload,
            metadata: ArrivalMetadata {
                sequence,
                send_timestamp: timestamp,
                received_at_ms: now,
                reordered: false,
                after_skip: false,
            },
        });
    }

    fn handle_ack(&mut self, acked: u16, now: u64) {
        self.stats.acks_received += 1;

        match self.sender.on_ack(acked, now) {
            AckOutcome::Accepted { sequence, rtt_ms } => {
                self.stats.acks_accepted += 1;
                debug!("[ACK] R#{} acknowledged (RTT: {:.1}ms)", sequence, rtt_ms);
                self.events
                    .push_back(SessionEvent::AckAccepted { sequence, rtt_ms });
            }
            AckOutcome::Duplicate { sequence, count } => {
                self.stats.duplicate_acks_received += 1;
                trace!("[ACK] Duplicate ACK for R#{} (x{})", sequence, count);
            }
            AckOutcome::FastRetransmit {
                duplicate_of,
                frame,
            } => {
                self.stats.duplicate_acks_received += 1;
                self.stats.fast_retransmits += 1;
                info!(
                    "[FAST-RETRANSMIT] {} duplicate ACKs for R#{}, resending R#{}",
                    self.config.duplicate_ack_threshold, duplicate_of, frame.sequence
                );
                self.events.push_back(SessionEvent::FastRetransmit {
                    sequence: frame.sequence,
                });
                if let Err(e) = self.transmit(&frame, true) {
                    warn!("Fast retransmit of R#{} failed: {}", frame.sequence, e);
                }
            }
        }
    }

    fn handle_reliable(&mut self, sequence: u16, timestamp: u32, payload: Vec<u8>, now: u64) {
        self.events.push_back(SessionEvent::PacketReceived {
            channel: ChannelType::Reliable,
            sequence,
            timestamp,
        });

        let outcome = self.receiver.on_data(sequence, timestamp, payload, now);
        match outcome.kind {
            ArrivalKind::InOrder => {
                debug!("[RECV] R#{} in order", sequence);
            }
            ArrivalKind::Buffered => {
                debug!(
                    "[REORDER] Buffering R#{}, waiting for R#{}",
                    sequence,
                    self.receiver.last_delivered().wrapping_add(1)
                );
            }
            ArrivalKind::AlreadyBuffered => {
                trace!("[REORDER] R#{} already buffered", sequence);
            }
            ArrivalKind::Overflow => {
                warn!(
                    "[REORDER] Buffer full ({} packets), dropping R#{}",
                    self.receiver.buffered_count(),
                    sequence
                );
                self.stats.buffer_overflows += 1;
                self.events
                    .push_back(SessionEvent::BufferOverflow { sequence });
            }
            ArrivalKind::Late => {
                debug!("[RECV] Ignoring late or duplicate R#{}", sequence);
                self.stats.late_duplicates += 1;
            }
        }

        self.send_ack(&outcome.ack, outcome.duplicate_ack);
        for ack in &outcome.release_acks {
            self.send_ack(ack, false);
        }
        self.deliver_reliable(outcome.delivered, false);
    }

    fn send_ack(&mut self, ack: &Frame, duplicate: bool) {
        if let Err(e) = self.write(ack) {
            warn!("Failed to send ACK for R#{}: {}", ack.sequence, e);
            return;
        }

        self.stats.acks_sent += 1;
        if duplicate {
            self.stats.duplicate_acks_sent += 1;
        }
        self.events.push_back(SessionEvent::AckSent {
            sequence: ack.sequence,
            duplicate,
        });
    }

    fn deliver_reliable(&mut self, ready: Vec<ReadyPacket>, after_skip: bool) {
        for packet in ready {
            self.stats.reliable_delivered += 1;
            if packet.from_buffer {
                self.stats.packets_reordered += 1;
            }

            self.deliveries.push_back(Delivery {
                channel: ChannelType::Reliable,
                payload: packet.payload,
                metadata: ArrivalMetadata {
                    sequence: packet.sequence,
                    send_timestamp: packet.timestamp,
                    received_at_ms: packet.arrived_at_ms,
                    reordered: packet.from_buffer,
                    after_skip,
                },
            });
        }
    }

    /// Fires due retransmissions and gives up on stale reorder gaps. Called
    /// by [`Session::poll`]; exposed for callers that drive I/O themselves.
    pub fn process_timers(&mut self) {
        let now = self.clock.now_ms();

        for outcome in self.sender.on_timer(now) {
            match outcome {
                TimerOutcome::Retransmit { frame, attempt } => {
                    self.stats.retransmissions += 1;
                    debug!(
                        "[RETRANSMIT] R#{} attempt {}/{}",
                        frame.sequence,
                        attempt,
                        self.config.max_retransmits as u32 + 1
                    );
                    if let Err(e) = self.transmit(&frame, true) {
                        warn!("Retransmit of R#{} failed: {}", frame.sequence, e);
                    }
                }
                TimerOutcome::Failed(failure) => self.report_failure(failure),
            }
        }

        for SkipOutcome { skip, acks } in self.receiver.poll_timeout(now) {
            self.stats.buffer_skips += 1;
            self.stats.sequences_skipped += skip.missing as u64;
            info!(
                "[SKIP] Gave up on {} packet(s) from R#{}, releasing {} buffered",
                skip.missing,
                skip.first_missing,
                skip.released.len()
            );
            self.events.push_back(SessionEvent::BufferSkip {
                first_missing: skip.first_missing,
                missing: skip.missing,
                released: skip.released.len(),
            });
            for ack in &acks {
                self.send_ack(ack, false);
            }
            self.deliver_reliable(skip.released, true);
        }
    }

    fn report_failure(&mut self, failure: DeliveryFailure) {
        self.stats.delivery_failures += 1;
        warn!(
            "[FAILED] R#{} undelivered after {} attempts",
            failure.sequence, failure.attempts
        );
        self.events.push_back(SessionEvent::DeliveryFailure {
            sequence: failure.sequence,
            attempts: failure.attempts,
        });
    }

    fn transmit(&mut self, frame: &Frame, retransmission: bool) -> Result<()> {
        self.write(frame)?;
        self.events.push_back(SessionEvent::PacketSent {
            channel: frame.channel,
            sequence: frame.sequence,
            timestamp: frame.timestamp,
            retransmission,
        });
        Ok(())
    }

    fn write(&mut self, frame: &Frame) -> Result<()> {
        let datagram = frame.encode(self.config.max_datagram_size)?;
        let sent = self.transport.send(&datagram)?;
        self.stats.bytes_sent += sent as u64;
        Ok(())
    }

    pub fn recv(&mut self) -> Option<Delivery> {
        self.deliveries.pop_front()
    }

    pub fn drain_deliveries(&mut self) -> impl Iterator<Item = Delivery> + '_ {
        self.deliveries.drain(..)
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = SessionEvent> + '_ {
        self.events.drain(..)
    }

    pub fn stats(&self) -> SessionStats {
        let rtt = self.sender.rtt();
        SessionStats {
            in_flight: self.sender.in_flight_count(),
            buffered: self.receiver.buffered_count(),
            srtt_ms: rtt.srtt(),
            rtt_variance_ms: rtt.rtt_var(),
            last_rtt_ms: rtt.latest(),
            ..self.stats.clone()
        }
    }

    /// Earliest clock reading at which [`Session::poll`] has timer work.
    pub fn next_wakeup_ms(&mut self) -> Option<u64> {
        match (self.sender.next_deadline(), self.receiver.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.sender.in_flight_count()
    }

    pub fn is_in_flight(&self, sequence: u16) -> bool {
        self.sender.is_in_flight(sequence)
    }

    pub fn buffered_count(&self) -> usize {
        self.receiver.buffered_count()
    }

    pub fn rtt(&self) -> &RttEstimator {
        self.sender.rtt()
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn config(&self) -> &ReliabilityConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}
