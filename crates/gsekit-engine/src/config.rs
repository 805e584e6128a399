use gsekit_packet::MAX_PACKET_LEN;

use crate::error::{EngineError, Result};

/// Default number of PDUs a channel queue holds.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default packet budget used until a caller asks for a specific size.
pub const DEFAULT_PACKET_SIZE: usize = 4096;

/// Fixed engine configuration, applied at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct EngineConfig {
    /// Number of independent channels.
    pub channels: usize,
    /// Maximum PDUs pending fragmentation output per channel.
    pub tx_queue_capacity: usize,
    /// Maximum completed PDUs awaiting collection per channel.
    pub rx_queue_capacity: usize,
    /// Packet budget used before the first `pop_packet` on a channel.
    pub default_packet_size: usize,
    /// Send LT=2 (label omitted) when a PDU repeats the channel's previous label.
    pub label_reuse: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            channels: 1,
            tx_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            rx_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            default_packet_size: DEFAULT_PACKET_SIZE,
            label_reuse: false,
        }
    }
}

impl EngineConfig {
    /// Config with `channels` channels and defaults elsewhere.
    pub fn with_channels(channels: usize) -> Self {
        Self {
            channels,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 {
            return Err(EngineError::InvalidConfig(
                "at least one channel required".to_string(),
            ));
        }
        if self.tx_queue_capacity == 0 || self.rx_queue_capacity == 0 {
            return Err(EngineError::InvalidConfig(
                "queue capacities must be non-zero".to_string(),
            ));
        }
        if self.default_packet_size == 0 {
            return Err(EngineError::InvalidConfig(
                "default packet size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Default packet size clamped to what the length field can express.
    pub(crate) fn initial_budget(&self) -> usize {
        self.default_packet_size.min(MAX_PACKET_LEN)
    }
}
