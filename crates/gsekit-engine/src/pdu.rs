use bytes::Bytes;
use gsekit_packet::Label;

/// A protocol data unit with its addressing label and protocol type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    pub label: Label,
    pub protocol_type: u16,
    pub payload: Bytes,
}

impl Pdu {
    pub fn new(label: impl Into<Label>, protocol_type: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            label: label.into(),
            protocol_type,
            payload: payload.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
