use crate::label::LabelType;

/// Errors that can occur while encoding a packet header.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodingError {
    /// The length field only has 12 bits.
    #[error("length field overflow ({length} bytes, max 4095)")]
    LengthOverflow { length: usize },

    /// A field required by the start/end flag combination was not supplied.
    #[error("missing {0} for this fragment kind")]
    MissingField(&'static str),

    /// The supplied label does not have the width implied by the label type.
    #[error("label does not match label type {label_type:?}")]
    LabelMismatch { label_type: LabelType },

    /// The declared length cannot hold the conditional header fields.
    #[error("declared length {length} shorter than header fields ({required} bytes)")]
    LengthTooShort { length: usize, required: usize },

    /// The length field disagrees with the payload being encoded.
    #[error("length field {length} does not match payload (expected {expected})")]
    PayloadMismatch { length: usize, expected: usize },
}

/// Errors that can occur while decoding a packet header.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodingError {
    /// The buffer ends before the header or the declared packet boundary.
    #[error("truncated packet (need {needed} bytes, have {available})")]
    Truncated { needed: usize, available: usize },

    /// The declared length cannot hold the conditional header fields.
    #[error("declared length {length} shorter than header fields ({required} bytes)")]
    LengthTooShort { length: usize, required: usize },

    /// A header lacks a field its start/end flags require.
    #[error("header without {0} for its fragment kind")]
    MissingField(&'static str),
}

pub type EncodeResult<T> = std::result::Result<T, EncodingError>;
pub type DecodeResult<T> = std::result::Result<T, DecodingError>;

/// Errors from the byte-stream packet codec.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("packet decode failed: {0}")]
    Decoding(#[from] DecodingError),

    #[error("packet encode failed: {0}")]
    Encoding(#[from] EncodingError),

    /// A packet does not fit in what is left of its burst.
    #[error("packet of {len} bytes overruns burst ({remaining} bytes left)")]
    BurstOverrun { len: usize, remaining: usize },

    #[error("burst length {burst_len} below minimum {min}")]
    InvalidBurstLen { burst_len: usize, min: usize },

    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),
}
