//! Label model.
//!
//! The 2-bit label type (LT) in the first header byte selects how the label
//! of a start fragment is carried:
//!
//! | LT | meaning                               | bytes on the wire |
//! |----|---------------------------------------|-------------------|
//! | 0  | full label                            | 6                 |
//! | 1  | partial label                         | 3                 |
//! | 2  | omitted, reuse last label on channel  | 0                 |
//! | 3  | broadcast, no label                   | 0                 |

/// Width of a full label.
pub const LABEL_LEN: usize = 6;

/// Width of a partial label.
pub const SHORT_LABEL_LEN: usize = 3;

/// The 2-bit label type indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LabelType {
    SixByte = 0,
    ThreeByte = 1,
    Reuse = 2,
    Broadcast = 3,
}

impl LabelType {
    /// Map the two low bits of `bits` to a label type. All four values are legal.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => LabelType::SixByte,
            1 => LabelType::ThreeByte,
            2 => LabelType::Reuse,
            _ => LabelType::Broadcast,
        }
    }

    /// The 2-bit wire value.
    pub fn bits(self) -> u8 {
        self as u8
    }

    /// Number of label bytes carried on a start fragment.
    pub fn label_len(self) -> usize {
        match self {
            LabelType::SixByte => LABEL_LEN,
            LabelType::ThreeByte => SHORT_LABEL_LEN,
            LabelType::Reuse | LabelType::Broadcast => 0,
        }
    }
}

/// A PDU label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Label {
    /// Full 6-byte label.
    Six([u8; LABEL_LEN]),
    /// Partial 3-byte label.
    Three([u8; SHORT_LABEL_LEN]),
    /// Label omitted on the wire; the receiver substitutes the last label it saw.
    Reuse,
    /// No label.
    Broadcast,
}

impl Label {
    pub fn label_type(&self) -> LabelType {
        match self {
            Label::Six(_) => LabelType::SixByte,
            Label::Three(_) => LabelType::ThreeByte,
            Label::Reuse => LabelType::Reuse,
            Label::Broadcast => LabelType::Broadcast,
        }
    }

    /// Wire bytes of the label (empty for `Reuse` and `Broadcast`).
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Label::Six(bytes) => bytes,
            Label::Three(bytes) => bytes,
            Label::Reuse | Label::Broadcast => &[],
        }
    }

    /// Build a label of the given type from its wire bytes.
    ///
    /// Returns `None` if `bytes` is not exactly `label_type.label_len()` long.
    pub fn from_wire(label_type: LabelType, bytes: &[u8]) -> Option<Self> {
        match label_type {
            LabelType::SixByte => bytes.try_into().ok().map(Label::Six),
            LabelType::ThreeByte => bytes.try_into().ok().map(Label::Three),
            LabelType::Reuse if bytes.is_empty() => Some(Label::Reuse),
            LabelType::Broadcast if bytes.is_empty() => Some(Label::Broadcast),
            _ => None,
        }
    }

    /// True for labels that identify a destination (`Six` and `Three`).
    pub fn is_concrete(&self) -> bool {
        matches!(self, Label::Six(_) | Label::Three(_))
    }
}

impl From<[u8; LABEL_LEN]> for Label {
    fn from(bytes: [u8; LABEL_LEN]) -> Self {
        Label::Six(bytes)
    }
}

impl From<[u8; SHORT_LABEL_LEN]> for Label {
    fn from(bytes: [u8; SHORT_LABEL_LEN]) -> Self {
        Label::Three(bytes)
    }
}
