//! Greedy fragmentation of one PDU into packets bounded by a byte budget.
//!
//! With label width `l` the headers cost `4 + l` bytes for a complete
//! packet, `7 + l` for a first fragment and `3` for any continuation.
//! A PDU that fits in one complete packet is sent unfragmented; otherwise
//! every fragment but the last is filled to the budget.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use gsekit_packet::{
    encode_packet, total_length_field, FragmentKind, Label, LabelType, PacketHeader,
    MAX_PACKET_LEN,
};

use crate::error::{EngineError, Result};

/// The fixed inputs of a fragmentation run.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PduSource<'a> {
    pub payload: &'a [u8],
    pub label: Label,
    pub protocol_type: u16,
    pub frag_id: u8,
}

/// One encoded packet and the number of PDU bytes it carries.
#[derive(Debug, Clone)]
pub(crate) struct Fragment {
    pub packet: Bytes,
    pub payload_len: usize,
    pub kind: FragmentKind,
}

/// Encode the fragment starting at `offset`.
///
/// `started` says whether the start fragment of this PDU was already emitted.
pub(crate) fn next_fragment(
    src: &PduSource<'_>,
    offset: usize,
    started: bool,
    budget: usize,
    scratch: &mut BytesMut,
) -> Result<Fragment> {
    let budget = budget.min(MAX_PACKET_LEN);
    let remaining = &src.payload[offset..];
    let label_type = src.label.label_type();

    let kind = if !started {
        if FragmentKind::Complete.header_len(label_type) + remaining.len() <= budget {
            FragmentKind::Complete
        } else {
            FragmentKind::First
        }
    } else if FragmentKind::Last.header_len(label_type) + remaining.len() <= budget {
        FragmentKind::Last
    } else {
        FragmentKind::Middle
    };

    let header_len = kind.header_len(label_type);
    let take = match kind {
        FragmentKind::Complete | FragmentKind::Last => remaining.len(),
        FragmentKind::First | FragmentKind::Middle => {
            if budget <= header_len {
                return Err(EngineError::PacketTooSmall {
                    budget,
                    required: header_len + 1,
                });
            }
            budget - header_len
        }
    };

    let header = match kind {
        FragmentKind::Complete => PacketHeader::complete(src.label, src.protocol_type, take),
        FragmentKind::First => PacketHeader::first(
            src.frag_id,
            total_length_field(src.payload.len()),
            src.label,
            src.protocol_type,
            take,
        ),
        FragmentKind::Middle | FragmentKind::Last => {
            PacketHeader::continuation(src.frag_id, kind.is_end(), label_type, take)
        }
    };

    scratch.clear();
    encode_packet(&header, &remaining[..take], scratch)?;
    Ok(Fragment {
        packet: scratch.split().freeze(),
        payload_len: take,
        kind,
    })
}

/// Encode every remaining fragment of a PDU at one budget.
pub(crate) fn fragment_remaining(
    src: &PduSource<'_>,
    mut offset: usize,
    mut started: bool,
    budget: usize,
    scratch: &mut BytesMut,
) -> Result<VecDeque<Fragment>> {
    let mut fragments = VecDeque::new();
    loop {
        let fragment = next_fragment(src, offset, started, budget, scratch)?;
        offset += fragment.payload_len;
        started = true;
        let done = fragment.kind.is_end();
        fragments.push_back(fragment);
        if done {
            return Ok(fragments);
        }
    }
}

/// Number of packets a PDU of `pdu_len` bytes needs at `budget`.
pub fn fragment_count(pdu_len: usize, label_type: LabelType, budget: usize) -> Result<usize> {
    let budget = budget.min(MAX_PACKET_LEN);
    if pdu_len + FragmentKind::Complete.header_len(label_type) <= budget {
        return Ok(1);
    }

    let first_header = FragmentKind::First.header_len(label_type);
    if budget <= first_header {
        return Err(EngineError::PacketTooSmall {
            budget,
            required: first_header + 1,
        });
    }

    let per_continuation = budget - FragmentKind::Middle.header_len(label_type);
    let rest = pdu_len - (budget - first_header);
    Ok(1 + rest.div_ceil(per_continuation))
}

#[cfg(test)]
mod tests {
    use gsekit_packet::{decode_header, MAX_HEADER_LEN};

    use super::*;

    const LABEL: Label = Label::Six([0xAB, 0xCD, 0xEF, 0x01, 0x23, 0x45]);

    fn source(payload: &[u8]) -> PduSource<'_> {
        PduSource {
            payload,
            label: LABEL,
            protocol_type: 0x1234,
            frag_id: 5,
        }
    }

    #[test]
    fn small_pdu_is_one_complete_packet() {
        let payload = [1u8; 20];
        let mut scratch = BytesMut::new();
        let frags = fragment_remaining(&source(&payload), 0, false, 100, &mut scratch).unwrap();

        assert_eq!(frags.len(), 1);
        assert_eq!(frags[0].kind, FragmentKind::Complete);
        assert_eq!(frags[0].packet.len(), 30);
    }

    #[test]
    fn sixty_bytes_at_fifty_makes_two_packets() {
        let payload = [0xA5u8; 60];
        let mut scratch = BytesMut::new();
        let frags = fragment_remaining(&source(&payload), 0, false, 50, &mut scratch).unwrap();

        assert_eq!(frags.len(), 2);
        assert_eq!(frags[0].kind, FragmentKind::First);
        assert_eq!(frags[0].packet.len(), 50);
        assert_eq!(frags[0].payload_len, 50 - MAX_HEADER_LEN);
        assert_eq!(frags[1].kind, FragmentKind::Last);
        assert_eq!(frags[1].payload_len, 60 - 37);
        assert_eq!(frags[1].packet.len(), 3 + 23);

        let first = decode_header(&frags[0].packet).unwrap();
        assert_eq!(first.header.total_length, Some(60));
        assert_eq!(first.header.frag_id, Some(5));
    }

    #[test]
    fn middle_fragments_fill_budget() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(500).collect();
        let mut scratch = BytesMut::new();
        let frags: Vec<Fragment> = fragment_remaining(&source(&payload), 0, false, 64, &mut scratch)
            .unwrap()
            .into();

        let (last, body) = frags.split_last().unwrap();
        for frag in body {
            assert_eq!(frag.packet.len(), 64);
        }
        assert!(last.packet.len() <= 64);
        assert!(last.payload_len >= 1);

        let mut joined = Vec::new();
        for frag in &frags {
            let desc = decode_header(&frag.packet).unwrap();
            joined.extend_from_slice(desc.payload(&frag.packet));
        }
        assert_eq!(joined, payload);
    }

    #[test]
    fn resumes_from_offset() {
        let payload = [7u8; 100];
        let mut scratch = BytesMut::new();
        let frags = fragment_remaining(&source(&payload), 40, true, 30, &mut scratch).unwrap();

        assert!(frags.iter().all(|f| !f.kind.is_start()));
        let total: usize = frags.iter().map(|f| f.payload_len).sum();
        assert_eq!(total, 60);
    }

    #[test]
    fn budget_too_small_for_first_fragment() {
        let payload = [0u8; 60];
        let mut scratch = BytesMut::new();
        let err = next_fragment(&source(&payload), 0, false, 13, &mut scratch).unwrap_err();
        assert!(matches!(
            err,
            EngineError::PacketTooSmall {
                budget: 13,
                required: 14
            }
        ));
    }

    #[test]
    fn budget_is_clamped_to_max_packet() {
        let payload = vec![0u8; 10_000];
        let mut scratch = BytesMut::new();
        let frags =
            fragment_remaining(&source(&payload), 0, false, 1 << 20, &mut scratch).unwrap();
        assert!(frags.iter().all(|f| f.packet.len() <= MAX_PACKET_LEN));
        assert_eq!(frags.len(), 3);
    }

    #[test]
    fn count_matches_greedy_plan() {
        let mut scratch = BytesMut::new();
        for label in [LABEL, Label::Three([1, 2, 3]), Label::Broadcast] {
            for len in [0usize, 1, 9, 10, 36, 37, 38, 60, 299, 1000, 4096, 9000] {
                for budget in [14usize, 15, 20, 50, 64, 255, 1500, 4097, 9000] {
                    let payload = vec![0x5A; len];
                    let src = PduSource {
                        payload: &payload,
                        label,
                        protocol_type: 1,
                        frag_id: 0,
                    };
                    let plan = fragment_remaining(&src, 0, false, budget, &mut scratch).unwrap();
                    let count = fragment_count(len, label.label_type(), budget).unwrap();
                    assert_eq!(plan.len(), count, "len={len} budget={budget}");
                }
            }
        }
    }

    #[test]
    fn count_rejects_tiny_budget() {
        assert!(fragment_count(60, LabelType::SixByte, 2).is_err());
        assert_eq!(fragment_count(0, LabelType::Broadcast, 4).unwrap(), 1);
    }

    #[test]
    fn empty_pdu_is_single_packet() {
        let mut scratch = BytesMut::new();
        let frags = fragment_remaining(&source(&[]), 0, false, 14, &mut scratch).unwrap();
        assert_eq!(frags.len(), 1);
        assert_eq!(frags[0].packet.len(), 10);
    }
}
