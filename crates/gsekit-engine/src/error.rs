use gsekit_packet::{DecodingError, EncodingError};

/// Errors that can occur in encapsulation and decapsulation.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The channel index is outside the configured range.
    #[error("channel {channel} out of range (engine has {channels} channels)")]
    ChannelOutOfRange { channel: usize, channels: usize },

    /// The label cannot be used on a PDU pushed for encapsulation.
    #[error("invalid label: {0}")]
    InvalidLabel(String),

    /// The packet budget cannot carry a header plus one payload byte.
    #[error("packet budget {budget} too small (need at least {required} bytes)")]
    PacketTooSmall { budget: usize, required: usize },

    /// The PDU is longer than 65 536 bytes.
    #[error("PDU too large ({size} bytes, max {max})")]
    PduTooLarge { size: usize, max: usize },

    /// The channel queue is at capacity.
    #[error("channel {channel} queue full ({capacity} entries)")]
    QueueFull { channel: usize, capacity: usize },

    /// A packet header could not be encoded.
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// A received packet header could not be decoded.
    #[error("decoding error: {0}")]
    Decoding(#[from] DecodingError),

    /// A continuation fragment does not belong to the PDU being reassembled.
    #[error("fragment sequence error on channel {channel}: expected {expected:?}, got {got}")]
    FragmentSequence {
        channel: usize,
        expected: Option<u8>,
        got: u8,
    },

    /// Reassembled bytes disagree with the total length announced by the first fragment.
    #[error("length mismatch on channel {channel}: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        channel: usize,
        expected: usize,
        actual: usize,
    },

    /// A start fragment asked to reuse a label before any label was seen.
    #[error("no previous label to reuse on channel {0}")]
    NoPreviousLabel(usize),

    /// The engine configuration is unusable.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// An I/O error occurred while moving bursts over a transport.
    #[error("burst I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport closed before a complete burst was transferred.
    #[error("connection closed (incomplete burst)")]
    ConnectionClosed,
}

impl EngineError {
    /// True for errors that cost at most the PDU in flight on one channel.
    ///
    /// The channel is back in a state where the next PDU is handled normally.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::FragmentSequence { .. }
                | EngineError::LengthMismatch { .. }
                | EngineError::NoPreviousLabel(_)
                | EngineError::QueueFull { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
