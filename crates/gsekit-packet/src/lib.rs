//! Packet header codec for GSE-style link-layer encapsulation.
//!
//! Every packet starts with a 2-byte base header:
//! - Start (S) and End (E) flags marking the packet's position in its PDU
//! - A 2-bit label type (LT)
//! - A 12-bit length counting every byte after the base header
//!
//! followed by the conditional fields selected by S/E/LT and a slice of the
//! PDU payload. The functions here are pure; all state lives in the engine.

pub mod codec;
pub mod error;
pub mod label;
#[cfg(feature = "async")]
pub mod stream;

pub use codec::{
    announced_total_length, decode_header, encode_header, encode_packet, is_padding, packet_len,
    total_length_field, FragmentDescriptor, FragmentKind, PacketHeader, BASE_HEADER_LEN,
    MAX_HEADER_LEN, MAX_LENGTH, MAX_PACKET_LEN, MAX_PDU_LEN, MIN_PACKET_LEN,
};
pub use error::{DecodingError, EncodingError, StreamError};
pub use label::{Label, LabelType, LABEL_LEN, SHORT_LABEL_LEN};
#[cfg(feature = "async")]
pub use stream::GseCodec;
