use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::net::{ACK_BODY_SIZE, HEADER_SIZE, MAX_DATAGRAM_SIZE};

pub const RETRANSMIT_TIMEOUT_MS: u64 = 150;
pub const MAX_RETRANSMITS: u8 = 12;
pub const REORDER_TIMEOUT_MS: u64 = 2000;
pub const REORDER_BUFFER_SIZE: usize = 500;
pub const DUPLICATE_ACK_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReliabilityConfig {
    pub retransmit_timeout_ms: u64,
    /// Retries after the first send; total attempts is one more.
    pub max_retransmits: u8,
    pub reorder_timeout_ms: u64,
    pub reorder_buffer_size: usize,
    pub duplicate_ack_threshold: u32,
    pub max_datagram_size: usize,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            retransmit_timeout_ms: RETRANSMIT_TIMEOUT_MS,
            max_retransmits: MAX_RETRANSMITS,
            reorder_timeout_ms: REORDER_TIMEOUT_MS,
            reorder_buffer_size: REORDER_BUFFER_SIZE,
            duplicate_ack_threshold: DUPLICATE_ACK_THRESHOLD,
            max_datagram_size: MAX_DATAGRAM_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("max_datagram_size {0} cannot hold an ACK frame")]
    DatagramTooSmall(usize),
}

impl ReliabilityConfig {
    pub fn retransmit_timeout(&self) -> Duration {
        Duration::from_millis(self.retransmit_timeout_ms)
    }

    pub fn reorder_timeout(&self) -> Duration {
        Duration::from_millis(self.reorder_timeout_ms)
    }

    pub fn max_payload_size(&self) -> usize {
        self.max_datagram_size.saturating_sub(HEADER_SIZE)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retransmit_timeout_ms == 0 {
            return Err(ConfigError::Zero("retransmit_timeout_ms"));
        }
        if self.reorder_timeout_ms == 0 {
            return Err(ConfigError::Zero("reorder_timeout_ms"));
        }
        if self.reorder_buffer_size == 0 {
            return Err(ConfigError::Zero("reorder_buffer_size"));
        }
        if self.duplicate_ack_threshold == 0 {
            return Err(ConfigError::Zero("duplicate_ack_threshold"));
        }
        if self.max_datagram_size < HEADER_SIZE + ACK_BODY_SIZE {
            return Err(ConfigError::DatagramTooSmall(self.max_datagram_size));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ReliabilityConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retransmit_timeout(), Duration::from_millis(150));
        assert_eq!(config.max_payload_size(), MAX_DATAGRAM_SIZE - HEADER_SIZE);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: ReliabilityConfig =
            serde_json::from_str(r#"{ "reorder_timeout_ms": 500 }"#).unwrap();
        assert_eq!(config.reorder_timeout_ms, 500);
        assert_eq!(config.max_retransmits, MAX_RETRANSMITS);
    }

    #[test]
    fn test_rejects_degenerate_values() {
        let config = ReliabilityConfig {
            duplicate_ack_threshold: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Zero("duplicate_ack_threshold"))
        );

        let config = ReliabilityConfig {
            max_datagram_size: HEADER_SIZE,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::DatagramTooSmall(HEADER_SIZE))
        );
    }
}
