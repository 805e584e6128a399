use tracing::debug;

use crate::config::EngineConfig;
use crate::decap::Decapsulator;
use crate::encap::Encapsulator;
use crate::error::Result;

/// A paired encapsulator and decapsulator built from one configuration.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    encapsulator: Encapsulator,
    decapsulator: Decapsulator,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let encapsulator = Encapsulator::new(&config)?;
        let decapsulator = Decapsulator::new(&config)?;
        debug!(
            channels = config.channels,
            label_reuse = config.label_reuse,
            "engine created"
        );
        Ok(Self {
            config,
            encapsulator,
            decapsulator,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn encapsulator(&self) -> &Encapsulator {
        &self.encapsulator
    }

    pub fn encapsulator_mut(&mut self) -> &mut Encapsulator {
        &mut self.encapsulator
    }

    pub fn decapsulator(&self) -> &Decapsulator {
        &self.decapsulator
    }

    pub fn decapsulator_mut(&mut self) -> &mut Decapsulator {
        &mut self.decapsulator
    }

    /// Borrow both halves at once, e.g. to drive them from separate threads.
    pub fn split_mut(&mut self) -> (&mut Encapsulator, &mut Decapsulator) {
        (&mut self.encapsulator, &mut self.decapsulator)
    }

    /// Move every queued packet of `channel` from the TX side to the RX side.
    ///
    /// Packets are popped at `max_bytes`. Recoverable RX errors are skipped
    /// the way a lossy link would drop them. Returns the packets moved.
    pub fn loopback(&mut self, channel: usize, max_bytes: usize) -> Result<usize> {
        let mut moved = 0;
        while let Some(packet) = self.encapsulator.pop_packet(channel, max_bytes)? {
            match self.decapsulator.push_packet(&packet, channel) {
                Ok(()) => {}
                Err(err) if err.is_recoverable() => {
                    debug!(channel, error = %err, "loopback packet dropped a PDU");
                }
                Err(err) => return Err(err),
            }
            moved += 1;
        }
        Ok(moved)
    }
}
