use std::time::Duration;

const ALPHA: f32 = 0.125;
const BETA: f32 = 0.25;

/// Smoothed round-trip time from individual ACK samples.
///
/// The estimate is exposed for observability only; the retransmission
/// timeout stays at the configured constant.
#[derive(Debug, Clone)]
pub struct RttEstimator {
    srtt: Option<f32>,
    rtt_var: f32,
    latest: Option<f32>,
    samples: u64,
    timeout: Duration,
}

impl RttEstimator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            srtt: None,
            rtt_var: 0.0,
            latest: None,
            samples: 0,
            timeout,
        }
    }

    pub fn record_sample(&mut self, rtt_ms: f32) {
        let rtt_ms = rtt_ms.max(0.0);
        self.latest = Some(rtt_ms);
        self.samples += 1;

        match self.srtt {
            None => {
                self.srtt = Some(rtt_ms);
                self.rtt_var = rtt_ms / 2.0;
            }
            Some(srtt) => {
                let diff = (rtt_ms - srtt).abs();
                self.rtt_var = (1.0 - BETA) * self.rtt_var + BETA * diff;
                self.srtt = Some((1.0 - ALPHA) * srtt + ALPHA * rtt_ms);
            }
        }
    }

    pub fn current_timeout(&self) -> Duration {
        self.timeout
    }

    pub fn srtt(&self) -> Option<f32> {
        self.srtt
    }

    pub fn rtt_var(&self) -> f32 {
        self.rtt_var
    }

    pub fn latest(&self) -> Option<f32> {
        self.latest
    }

    pub fn sample_count(&self) -> u64 {
        self.samples
    }
}
