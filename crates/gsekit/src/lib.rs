//! GSE-style link-layer encapsulation and decapsulation.
//!
//! gsekit fragments PDUs into small self-describing packets for narrowband,
//! bursty links and reassembles them on the far side, with independent
//! logical channels multiplexed over one transport.
//!
//! # Crate Structure
//!
//! - [`packet`]: Pure packet header codec (no state)
//! - [`engine`]: Per-channel encapsulator, decapsulator and burst adapters
//! - [`logging`]: `tracing-subscriber` setup (behind `logging` feature)

/// Re-export packet codec types.
pub mod packet {
    pub use gsekit_packet::*;
}

/// Re-export engine types.
pub mod engine {
    pub use gsekit_engine::*;
}

#[cfg(feature = "logging")]
pub mod logging;
