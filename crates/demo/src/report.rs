use gamenet::{ChannelType, Delivery, SessionStats};
use serde::Serialize;

#[derive(Debug, Default, Serialize)]
pub struct ChannelReport {
    pub sent: u64,
    pub delivered: u64,
    pub delivery_ratio: f64,
    pub avg_latency_ms: Option<f64>,
    pub max_latency_ms: Option<u32>,
    pub reordered: u64,
    pub after_skip: u64,
    #[serde(skip)]
    latency_sum_ms: u64,
}

impl ChannelReport {
    fn record(&mut self, delivery: &Delivery) {
        let latency = delivery.metadata.one_way_latency_ms();
        self.delivered += 1;
        self.latency_sum_ms += latency as u64;
        self.max_latency_ms = Some(self.max_latency_ms.map_or(latency, |max| max.max(latency)));
        if delivery.metadata.reordered {
            self.reordered += 1;
        }
        if delivery.metadata.after_skip {
            self.after_skip += 1;
        }
    }

    fn finish(&mut self, sent: u64) {
        self.sent = sent;
        if sent > 0 {
            self.delivery_ratio = self.delivered as f64 / sent as f64;
        }
        if self.delivered > 0 {
            self.avg_latency_ms = Some(self.latency_sum_ms as f64 / self.delivered as f64);
        }
    }
}

/// Everything the demo observed, printed at the end of a run.
#[derive(Debug, Default, Serialize)]
pub struct Report {
    pub elapsed_ms: u64,
    pub reliable: ChannelReport,
    pub unreliable: ChannelReport,
    pub delivery_failures: u64,
    pub sender: SessionStats,
    pub receiver: SessionStats,
}

impl Report {
    pub fn record(&mut self, delivery: &Delivery) {
        match delivery.channel {
            ChannelType::Reliable => self.reliable.record(delivery),
            ChannelType::Unreliable => self.unreliable.record(delivery),
        }
    }

    pub fn finish(&mut self, sender: SessionStats, receiver: SessionStats, elapsed_ms: u64) {
        self.reliable.finish(sender.reliable_sent);
        self.unreliable.finish(sender.unreliable_sent);
        self.delivery_failures = sender.delivery_failures;
        self.sender = sender;
        self.receiver = receiver;
        self.elapsed_ms = elapsed_ms;
    }

    pub fn print(&self) {
        println!("Run finished in {} ms", self.elapsed_ms);
        print_channel("Reliable", &self.reliable);
        print_channel("Unreliable", &self.unreliable);
        println!(
            "Sender:   {} retransmits, {} fast retransmits, {} failures, srtt {}",
            self.sender.retransmissions,
            self.sender.fast_retransmits,
            self.delivery_failures,
            self.sender
                .srtt_ms
                .map_or_else(|| "n/a".to_string(), |srtt| format!("{:.1} ms", srtt))
        );
        println!(
            "Receiver: {} ACKs ({} duplicate), {} skips, {} late, {} malformed",
            self.receiver.acks_sent,
            self.receiver.duplicate_acks_sent,
            self.receiver.buffer_skips,
            self.receiver.late_duplicates,
            self.receiver.malformed_frames
        );
    }
}

fn print_channel(name: &str, report: &ChannelReport) {
    println!(
        "{:<10} {}/{} delivered ({:.1}%), avg latency {}, {} reordered",
        name,
        report.delivered,
        report.sent,
        report.delivery_ratio * 100.0,
        report
            .avg_latency_ms
            .map_or_else(|| "n/a".to_string(), |ms| format!("{:.2} ms", ms)),
        report.reordered
    );
}
