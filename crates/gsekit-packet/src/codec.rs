use bytes::{Buf, BufMut, BytesMut};

use crate::error::{DecodeResult, DecodingError, EncodeResult, EncodingError};
use crate::label::{Label, LabelType, LABEL_LEN, SHORT_LABEL_LEN};

/// Flags/label-type/length byte plus the low length byte.
pub const BASE_HEADER_LEN: usize = 2;

/// Fragment-ID field width.
pub const FRAG_ID_LEN: usize = 1;

/// Total PDU length field width (first fragment only).
pub const TOTAL_LENGTH_LEN: usize = 2;

/// Protocol-type field width.
pub const PROTOCOL_TYPE_LEN: usize = 2;

/// Largest value of the 12-bit length field.
pub const MAX_LENGTH: usize = 0x0FFF;

/// Largest encodable packet.
pub const MAX_PACKET_LEN: usize = BASE_HEADER_LEN + MAX_LENGTH;

/// Worst-case header: first fragment carrying a full label.
pub const MAX_HEADER_LEN: usize =
    BASE_HEADER_LEN + FRAG_ID_LEN + TOTAL_LENGTH_LEN + PROTOCOL_TYPE_LEN + LABEL_LEN;

/// Smallest packet budget that can always carry one payload byte.
pub const MIN_PACKET_LEN: usize = MAX_HEADER_LEN + 1;

/// Largest PDU. The total-length field carries it as 0, which no
/// fragmented PDU can otherwise announce since it always has a payload.
pub const MAX_PDU_LEN: usize = 1 << 16;

const START_FLAG: u8 = 0x80;
const END_FLAG: u8 = 0x40;
const LABEL_TYPE_SHIFT: u8 = 4;
const LENGTH_HIGH_MASK: u8 = 0x0F;

/// Position of a packet within its PDU, derived from the S and E flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    /// S=1 E=1: the whole PDU in one packet.
    Complete,
    /// S=1 E=0
    First,
    /// S=0 E=0
    Middle,
    /// S=0 E=1
    Last,
}

impl FragmentKind {
    pub fn from_flags(start: bool, end: bool) -> Self {
        match (start, end) {
            (true, true) => FragmentKind::Complete,
            (true, false) => FragmentKind::First,
            (false, false) => FragmentKind::Middle,
            (false, true) => FragmentKind::Last,
        }
    }

    pub fn is_start(self) -> bool {
        matches!(self, FragmentKind::Complete | FragmentKind::First)
    }

    pub fn is_end(self) -> bool {
        matches!(self, FragmentKind::Complete | FragmentKind::Last)
    }

    /// Encoded header length (base header included) for this kind.
    pub fn header_len(self, label_type: LabelType) -> usize {
        match self {
            FragmentKind::Complete => {
                BASE_HEADER_LEN + PROTOCOL_TYPE_LEN + label_type.label_len()
            }
            FragmentKind::First => {
                BASE_HEADER_LEN
                    + FRAG_ID_LEN
                    + TOTAL_LENGTH_LEN
                    + PROTOCOL_TYPE_LEN
                    + label_type.label_len()
            }
            FragmentKind::Middle | FragmentKind::Last => BASE_HEADER_LEN + FRAG_ID_LEN,
        }
    }
}

/// Header fields of one packet.
///
/// `length` is the value of the 12-bit length field: every byte after the two
/// base header bytes, conditional fields and payload included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    pub start: bool,
    pub end: bool,
    pub label_type: LabelType,
    pub length: usize,
    /// Present on every fragment except a complete (S=1 E=1) packet.
    pub frag_id: Option<u8>,
    /// Present on a first (S=1 E=0) fragment.
    pub total_length: Option<u16>,
    /// Present on start fragments.
    pub protocol_type: Option<u16>,
    /// Present on start fragments.
    pub label: Option<Label>,
}

impl PacketHeader {
    /// Header for a PDU that fits in a single packet.
    pub fn complete(label: Label, protocol_type: u16, payload_len: usize) -> Self {
        let label_type = label.label_type();
        Self {
            start: true,
            end: true,
            label_type,
            length: FragmentKind::Complete.header_len(label_type) - BASE_HEADER_LEN + payload_len,
            frag_id: None,
            total_length: None,
            protocol_type: Some(protocol_type),
            label: Some(label),
        }
    }

    /// Header for the first fragment of a fragmented PDU.
    pub fn first(
        frag_id: u8,
        total_length: u16,
        label: Label,
        protocol_type: u16,
        payload_len: usize,
    ) -> Self {
        let label_type = label.label_type();
        Self {
            start: true,
            end: false,
            label_type,
            length: FragmentKind::First.header_len(label_type) - BASE_HEADER_LEN + payload_len,
            frag_id: Some(frag_id),
            total_length: Some(total_length),
            protocol_type: Some(protocol_type),
            label: Some(label),
        }
    }

    /// Header for a middle (`end == false`) or last (`end == true`) fragment.
    pub fn continuation(frag_id: u8, end: bool, label_type: LabelType, payload_len: usize) -> Self {
        let kind = FragmentKind::from_flags(false, end);
        Self {
            start: false,
            end,
            label_type,
            length: kind.header_len(label_type) - BASE_HEADER_LEN + payload_len,
            frag_id: Some(frag_id),
            total_length: None,
            protocol_type: None,
            label: None,
        }
    }

    pub fn kind(&self) -> FragmentKind {
        FragmentKind::from_flags(self.start, self.end)
    }

    /// Encoded header length, base header included.
    pub fn header_len(&self) -> usize {
        self.kind().header_len(self.label_type)
    }

    /// Total packet length implied by the length field.
    pub fn packet_len(&self) -> usize {
        BASE_HEADER_LEN + self.length
    }

    /// Protocol type and label, if this is a start fragment carrying both.
    pub fn start_fields(&self) -> Option<(u16, Label)> {
        if !self.start {
            return None;
        }
        Some((self.protocol_type?, self.label?))
    }
}

/// Encode a packet header into `dst`.
///
/// Wire format:
/// ```text
/// ┌───┬───┬──────┬────────────┬────────────┬──────────────────────────────┐
/// │ S │ E │ LT   │ LEN[11:8]  │ LEN[7:0]   │ conditional fields, payload  │
/// │1b │1b │ 2b   │ 4b         │ 8b         │ (LEN bytes)                  │
/// └───┴───┴──────┴────────────┴────────────┴──────────────────────────────┘
///
/// S=1 E=1 : protocol(2) label(LT)
/// S=1 E=0 : frag_id(1) total_length(2) protocol(2) label(LT)
/// S=0     : frag_id(1)
/// ```
/// Multi-byte fields are big-endian. Nothing is written on error.
pub fn encode_header(header: &PacketHeader, dst: &mut BytesMut) -> EncodeResult<()> {
    if header.length > MAX_LENGTH {
        return Err(EncodingError::LengthOverflow {
            length: header.length,
        });
    }

    let kind = header.kind();
    let header_len = kind.header_len(header.label_type);
    let required = header_len - BASE_HEADER_LEN;
    if header.length < required {
        return Err(EncodingError::LengthTooShort {
            length: header.length,
            required,
        });
    }

    let frag_id = match kind {
        FragmentKind::Complete => None,
        _ => Some(header.frag_id.ok_or(EncodingError::MissingField("fragment id"))?),
    };
    let total_length = match kind {
        FragmentKind::First => Some(
            header
                .total_length
                .ok_or(EncodingError::MissingField("total length"))?,
        ),
        _ => None,
    };
    let start_fields = if kind.is_start() {
        let protocol_type = header
            .protocol_type
            .ok_or(EncodingError::MissingField("protocol type"))?;
        let label = header
            .label
            .as_ref()
            .ok_or(EncodingError::MissingField("label"))?;
        if label.label_type() != header.label_type {
            return Err(EncodingError::LabelMismatch {
                label_type: header.label_type,
            });
        }
        Some((protocol_type, label))
    } else {
        None
    };

    let mut flags = header.label_type.bits() << LABEL_TYPE_SHIFT;
    if header.start {
        flags |= START_FLAG;
    }
    if header.end {
        flags |= END_FLAG;
    }
    flags |= ((header.length >> 8) as u8) & LENGTH_HIGH_MASK;

    dst.reserve(header_len);
    dst.put_u8(flags);
    dst.put_u8(header.length as u8);
    if let Some(frag_id) = frag_id {
        dst.put_u8(frag_id);
    }
    if let Some(total_length) = total_length {
        dst.put_u16(total_length);
    }
    if let Some((protocol_type, label)) = start_fields {
        dst.put_u16(protocol_type);
        dst.put_slice(label.as_bytes());
    }
    Ok(())
}

/// Encode a header followed by its payload.
///
/// The header's length field must account for exactly `payload.len()` bytes.
pub fn encode_packet(header: &PacketHeader, payload: &[u8], dst: &mut BytesMut) -> EncodeResult<()> {
    let expected = header.header_len() - BASE_HEADER_LEN + payload.len();
    if header.length != expected {
        return Err(EncodingError::PayloadMismatch {
            length: header.length,
            expected,
        });
    }
    dst.reserve(header.packet_len());
    encode_header(header, dst)?;
    dst.put_slice(payload);
    Ok(())
}

/// A decoded packet header plus the offset at which its payload begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentDescriptor {
    pub header: PacketHeader,
    pub payload_offset: usize,
}

impl FragmentDescriptor {
    pub fn kind(&self) -> FragmentKind {
        self.header.kind()
    }

    /// Packet length according to the length field. Bytes past it are padding.
    pub fn packet_len(&self) -> usize {
        self.header.packet_len()
    }

    pub fn payload_len(&self) -> usize {
        self.packet_len() - self.payload_offset
    }

    /// Slice the payload out of the buffer this descriptor was decoded from.
    pub fn payload<'a>(&self, packet: &'a [u8]) -> &'a [u8] {
        &packet[self.payload_offset..self.packet_len()]
    }
}

/// Decode a packet header.
///
/// Only the declared length is trusted: any bytes beyond `2 + LEN` (transport
/// padding) are ignored.
pub fn decode_header(src: &[u8]) -> DecodeResult<FragmentDescriptor> {
    if src.len() < BASE_HEADER_LEN {
        return Err(DecodingError::Truncated {
            needed: BASE_HEADER_LEN,
            available: src.len(),
        });
    }

    let start = src[0] & START_FLAG != 0;
    let end = src[0] & END_FLAG != 0;
    let label_type = LabelType::from_bits(src[0] >> LABEL_TYPE_SHIFT);
    let length = (usize::from(src[0] & LENGTH_HIGH_MASK) << 8) | usize::from(src[1]);

    let packet_len = BASE_HEADER_LEN + length;
    if src.len() < packet_len {
        return Err(DecodingError::Truncated {
            needed: packet_len,
            available: src.len(),
        });
    }

    let kind = FragmentKind::from_flags(start, end);
    let header_len = kind.header_len(label_type);
    let required = header_len - BASE_HEADER_LEN;
    if length < required {
        return Err(DecodingError::LengthTooShort { length, required });
    }

    let mut fields = &src[BASE_HEADER_LEN..header_len];
    let mut header = PacketHeader {
        start,
        end,
        label_type,
        length,
        frag_id: None,
        total_length: None,
        protocol_type: None,
        label: None,
    };

    if kind != FragmentKind::Complete {
        header.frag_id = Some(fields.get_u8());
    }
    if kind == FragmentKind::First {
        header.total_length = Some(fields.get_u16());
    }
    if kind.is_start() {
        header.protocol_type = Some(fields.get_u16());
        header.label = Some(read_label(label_type, &mut fields));
    }

    Ok(FragmentDescriptor {
        header,
        payload_offset: header_len,
    })
}

fn read_label(label_type: LabelType, fields: &mut &[u8]) -> Label {
    match label_type {
        LabelType::SixByte => {
            let mut bytes = [0u8; LABEL_LEN];
            fields.copy_to_slice(&mut bytes);
            Label::Six(bytes)
        }
        LabelType::ThreeByte => {
            let mut bytes = [0u8; SHORT_LABEL_LEN];
            fields.copy_to_slice(&mut bytes);
            Label::Three(bytes)
        }
        LabelType::Reuse => Label::Reuse,
        LabelType::Broadcast => Label::Broadcast,
    }
}

/// Packet length declared by the header at the front of `src`, if readable.
pub fn packet_len(src: &[u8]) -> Option<usize> {
    if src.len() < BASE_HEADER_LEN {
        return None;
    }
    Some(BASE_HEADER_LEN + ((usize::from(src[0] & LENGTH_HIGH_MASK) << 8) | usize::from(src[1])))
}

/// True if `src` starts with padding rather than a packet.
///
/// Every packet carries at least one byte after the length field, so a
/// zero length with no flags never starts a real packet.
pub fn is_padding(src: &[u8]) -> bool {
    !src.is_empty() && src.iter().take(BASE_HEADER_LEN).all(|&b| b == 0)
}

/// Total-length field value announcing a fragmented PDU of `len` bytes.
///
/// `len` must be in `1..=MAX_PDU_LEN`; 65 536 wraps to 0.
pub fn total_length_field(len: usize) -> u16 {
    (len & 0xFFFF) as u16
}

/// PDU length announced by a total-length field.
pub fn announced_total_length(field: u16) -> usize {
    match field {
        0 => MAX_PDU_LEN,
        n => usize::from(n),
    }
}

#[cfg(test)]
mod tests {
    use bytes::BufMut;

    use super::*;

    const LABEL: [u8; 6] = [0xAB, 0xCD, 0xEF, 0x01, 0x23, 0x45];

    #[test]
    fn complete_packet_wire_bytes() {
        let header = PacketHeader::complete(Label::Six(LABEL), 0x1234, 3);
        let mut buf = BytesMut::new();
        encode_packet(&header, &[1, 2, 3], &mut buf).unwrap();

        assert_eq!(
            buf.as_ref(),
            &[0xC0, 0x0B, 0x12, 0x34, 0xAB, 0xCD, 0xEF, 0x01, 0x23, 0x45, 1, 2, 3]
        );
    }

    #[test]
    fn first_fragment_roundtrip() {
        let header = PacketHeader::first(7, 60, Label::Six(LABEL), 0x0800, 37);
        assert_eq!(header.header_len(), MAX_HEADER_LEN);
        assert_eq!(header.packet_len(), 50);

        let payload = vec![0xA5; 37];
        let mut buf = BytesMut::new();
        encode_packet(&header, &payload, &mut buf).unwrap();
        assert_eq!(buf.len(), 50);
        assert_eq!(buf[0] & 0xF0, 0x80);

        let desc = decode_header(&buf).unwrap();
        assert_eq!(desc.kind(), FragmentKind::First);
        assert_eq!(desc.header, header);
        assert_eq!(desc.payload_offset, MAX_HEADER_LEN);
        assert_eq!(desc.payload(&buf), payload.as_slice());
    }

    #[test]
    fn continuation_fragments_roundtrip() {
        for end in [false, true] {
            let header = PacketHeader::continuation(42, end, LabelType::SixByte, 5);
            let mut buf = BytesMut::new();
            encode_packet(&header, b"hello", &mut buf).unwrap();

            let desc = decode_header(&buf).unwrap();
            assert_eq!(desc.header.frag_id, Some(42));
            assert_eq!(desc.header.end, end);
            assert!(!desc.header.start);
            assert_eq!(desc.header.protocol_type, None);
            assert_eq!(desc.header.label, None);
            assert_eq!(desc.payload(&buf), b"hello");
        }
    }

    #[test]
    fn short_and_omitted_labels_roundtrip() {
        for label in [Label::Three([1, 2, 3]), Label::Reuse, Label::Broadcast] {
            let header = PacketHeader::complete(label, 0x86DD, 2);
            let mut buf = BytesMut::new();
            encode_packet(&header, &[9, 9], &mut buf).unwrap();
            assert_eq!(buf.len(), 4 + label.as_bytes().len() + 2);

            let desc = decode_header(&buf).unwrap();
            assert_eq!(desc.header.label, Some(label));
            assert_eq!(desc.header.label_type, label.label_type());
            assert_eq!(desc.header.protocol_type, Some(0x86DD));
        }
    }

    #[test]
    fn encode_rejects_length_overflow() {
        let header = PacketHeader::complete(Label::Broadcast, 1, MAX_LENGTH);
        let mut buf = BytesMut::new();
        let err = encode_header(&header, &mut buf).unwrap_err();
        assert!(matches!(err, EncodingError::LengthOverflow { length } if length == MAX_LENGTH + 2));
        assert!(buf.is_empty());
    }

    #[test]
    fn encode_accepts_max_length() {
        let header = PacketHeader::complete(Label::Broadcast, 1, MAX_LENGTH - 2);
        let mut buf = BytesMut::new();
        encode_header(&header, &mut buf).unwrap();
        assert_eq!(packet_len(&buf), Some(MAX_PACKET_LEN));
    }

    #[test]
    fn encode_rejects_missing_fields() {
        let mut buf = BytesMut::new();

        let mut header = PacketHeader::continuation(1, true, LabelType::SixByte, 4);
        header.frag_id = None;
        assert_eq!(
            encode_header(&header, &mut buf),
            Err(EncodingError::MissingField("fragment id"))
        );

        let mut header = PacketHeader::first(1, 100, Label::Six(LABEL), 1, 10);
        header.total_length = None;
        assert_eq!(
            encode_header(&header, &mut buf),
            Err(EncodingError::MissingField("total length"))
        );

        let mut header = PacketHeader::complete(Label::Six(LABEL), 1, 10);
        header.protocol_type = None;
        assert_eq!(
            encode_header(&header, &mut buf),
            Err(EncodingError::MissingField("protocol type"))
        );

        let mut header = PacketHeader::complete(Label::Six(LABEL), 1, 10);
        header.label = None;
        assert_eq!(
            encode_header(&header, &mut buf),
            Err(EncodingError::MissingField("label"))
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn encode_rejects_label_mismatch() {
        let mut header = PacketHeader::complete(Label::Six(LABEL), 1, 10);
        header.label_type = LabelType::ThreeByte;
        header.length = 20;
        let err = encode_header(&header, &mut BytesMut::new()).unwrap_err();
        assert!(matches!(err, EncodingError::LabelMismatch { .. }));
    }

    #[test]
    fn encode_rejects_length_shorter_than_fields() {
        let mut header = PacketHeader::complete(Label::Six(LABEL), 1, 0);
        header.length = 3;
        let err = encode_header(&header, &mut BytesMut::new()).unwrap_err();
        assert_eq!(
            err,
            EncodingError::LengthTooShort {
                length: 3,
                required: 8
            }
        );
    }

    #[test]
    fn encode_packet_checks_payload_length() {
        let header = PacketHeader::complete(Label::Broadcast, 1, 4);
        let err = encode_packet(&header, b"abc", &mut BytesMut::new()).unwrap_err();
        assert!(matches!(err, EncodingError::PayloadMismatch { .. }));
    }

    #[test]
    fn decode_truncated_base_header() {
        assert_eq!(
            decode_header(&[0xC0]),
            Err(DecodingError::Truncated {
                needed: 2,
                available: 1
            })
        );
        assert!(decode_header(&[]).is_err());
    }

    #[test]
    fn decode_truncated_packet() {
        let header = PacketHeader::complete(Label::Six(LABEL), 0x1234, 10);
        let mut buf = BytesMut::new();
        encode_packet(&header, &[0u8; 10], &mut buf).unwrap();
        buf.truncate(buf.len() - 1);

        let err = decode_header(&buf).unwrap_err();
        assert!(matches!(err, DecodingError::Truncated { needed: 20, available: 19 }));
    }

    #[test]
    fn decode_rejects_length_shorter_than_fields() {
        // S=1 E=0 LT=0 with LEN=4: needs 11 bytes of fields.
        let buf = [0x80, 0x04, 0, 0, 0, 0];
        assert_eq!(
            decode_header(&buf),
            Err(DecodingError::LengthTooShort {
                length: 4,
                required: 11
            })
        );
    }

    #[test]
    fn decode_ignores_trailing_padding() {
        let header = PacketHeader::continuation(3, true, LabelType::SixByte, 4);
        let mut exact = BytesMut::new();
        encode_packet(&header, b"tail", &mut exact).unwrap();

        let mut padded = exact.clone();
        padded.put_bytes(0, 64);

        let a = decode_header(&exact).unwrap();
        let b = decode_header(&padded).unwrap();
        assert_eq!(a, b);
        assert_eq!(b.payload(&padded), b"tail");
    }

    #[test]
    fn twelve_bit_length_spans_both_bytes() {
        let header = PacketHeader::continuation(0, false, LabelType::SixByte, 0x0ABC - 1);
        let mut buf = BytesMut::new();
        encode_header(&header, &mut buf).unwrap();
        assert_eq!(buf[0] & 0x0F, 0x0A);
        assert_eq!(buf[1], 0xBC);
        assert_eq!(packet_len(&buf), Some(2 + 0x0ABC));
    }

    #[test]
    fn padding_detection() {
        assert!(is_padding(&[0, 0, 0, 0]));
        assert!(is_padding(&[0]));
        assert!(!is_padding(&[]));
        assert!(!is_padding(&[0x00, 0x05, 1, 2, 3, 4, 5]));
        assert!(!is_padding(&[0xC0, 0x00]));
    }

    #[test]
    fn largest_pdu_wraps_total_length_to_zero() {
        assert_eq!(total_length_field(MAX_PDU_LEN), 0);
        assert_eq!(announced_total_length(0), 65_536);
        for len in [1usize, 60, 4096, 65_535] {
            assert_eq!(announced_total_length(total_length_field(len)), len);
        }

        let header =
            PacketHeader::first(1, total_length_field(MAX_PDU_LEN), Label::Broadcast, 1, 8);
        let mut buf = BytesMut::new();
        encode_packet(&header, &[0xEE; 8], &mut buf).unwrap();
        assert_eq!(&buf[3..5], &[0, 0]);
        let desc = decode_header(&buf).unwrap();
        assert_eq!(desc.header.total_length.map(announced_total_length), Some(65_536));
    }

    #[test]
    fn max_header_constants() {
        assert_eq!(MAX_HEADER_LEN, 13);
        assert_eq!(MIN_PACKET_LEN, 14);
        assert_eq!(MAX_PACKET_LEN, 4097);
        assert_eq!(FragmentKind::Complete.header_len(LabelType::SixByte), 10);
        assert_eq!(FragmentKind::Last.header_len(LabelType::Broadcast), 3);
    }
}
