//! Per-channel fragmentation and reassembly over the `gsekit-packet` codec.
//!
//! Each channel owns its own queues and sequence state:
//! - [`Encapsulator`] splits PDUs into packets sized to a per-channel budget
//! - [`Decapsulator`] rebuilds PDUs and isolates losses to the PDU in flight
//! - [`BurstReader`] / [`BurstWriter`] move fixed-size, zero-padded bursts
//!   over blocking `Read`/`Write` transports
//!
//! Channels are plain values; different channels can be driven from different
//! threads through `channels_mut`. One channel is never shared.

pub mod config;
pub mod decap;
pub mod encap;
pub mod engine;
pub mod error;
mod fragment;
pub mod pdu;
pub mod reader;
pub mod writer;

pub use config::{EngineConfig, DEFAULT_PACKET_SIZE, DEFAULT_QUEUE_CAPACITY};
pub use decap::{ChannelState, Decapsulator, RxChannel, RxStats};
pub use encap::{Encapsulator, TxChannel};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use fragment::fragment_count;
pub use pdu::Pdu;
pub use reader::BurstReader;
pub use writer::BurstWriter;
