use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use gsekit_packet::{Label, LABEL_LEN, MAX_PACKET_LEN, MAX_PDU_LEN, MIN_PACKET_LEN};
use tracing::{debug, trace};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::fragment::{fragment_remaining, Fragment, PduSource};
use crate::pdu::Pdu;

const SCRATCH_CAPACITY: usize = MAX_PACKET_LEN;

/// A PDU accepted for transmission and its not-yet-delivered packets.
#[derive(Debug)]
struct PendingPdu {
    payload: Bytes,
    /// Label as it goes on the wire (`Reuse` when suppressed).
    label: Label,
    protocol_type: u16,
    frag_id: u8,
    /// PDU bytes already handed out in popped packets.
    sent: usize,
    /// Whether the start fragment was handed out.
    started: bool,
    packets: VecDeque<Fragment>,
}

impl PendingPdu {
    fn source(&self) -> PduSource<'_> {
        PduSource {
            payload: &self.payload,
            label: self.label,
            protocol_type: self.protocol_type,
            frag_id: self.frag_id,
        }
    }
}

/// Transmit-side state of one channel.
#[derive(Debug)]
pub struct TxChannel {
    index: usize,
    pending: VecDeque<PendingPdu>,
    capacity: usize,
    budget: usize,
    next_frag_id: u8,
    last_label: Option<Label>,
    label_reuse: bool,
    scratch: BytesMut,
}

impl TxChannel {
    pub(crate) fn new(index: usize, config: &EngineConfig) -> Self {
        Self {
            index,
            pending: VecDeque::new(),
            capacity: config.tx_queue_capacity,
            budget: config.initial_budget(),
            next_frag_id: 0,
            last_label: None,
            label_reuse: config.label_reuse,
            scratch: BytesMut::with_capacity(SCRATCH_CAPACITY),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Accept a PDU and fragment it at the current packet budget.
    pub fn push(&mut self, pdu: Pdu) -> Result<()> {
        if pdu.len() > MAX_PDU_LEN {
            return Err(EngineError::PduTooLarge {
                size: pdu.len(),
                max: MAX_PDU_LEN,
            });
        }
        if pdu.label == Label::Reuse {
            return Err(EngineError::InvalidLabel(
                "label reuse is selected by the encapsulator, not the caller".to_string(),
            ));
        }
        if self.pending.len() >= self.capacity {
            return Err(EngineError::QueueFull {
                channel: self.index,
                capacity: self.capacity,
            });
        }
        let budget = self.budget.min(MAX_PACKET_LEN);
        if budget < MIN_PACKET_LEN {
            return Err(EngineError::PacketTooSmall {
                budget,
                required: MIN_PACKET_LEN,
            });
        }

        let wire_label = if self.label_reuse
            && pdu.label.is_concrete()
            && self.last_label == Some(pdu.label)
        {
            Label::Reuse
        } else {
            pdu.label
        };

        let mut pending = PendingPdu {
            payload: pdu.payload,
            label: wire_label,
            protocol_type: pdu.protocol_type,
            frag_id: self.next_frag_id,
            sent: 0,
            started: false,
            packets: VecDeque::new(),
        };
        let packets = fragment_remaining(&pending.source(), 0, false, budget, &mut self.scratch)?;
        pending.packets = packets;

        debug!(
            channel = self.index,
            len = pending.payload.len(),
            packets = pending.packets.len(),
            frag_id = pending.frag_id,
            budget,
            "PDU queued for encapsulation"
        );

        self.next_frag_id = self.next_frag_id.wrapping_add(1);
        if pdu.label.is_concrete() {
            self.last_label = Some(pdu.label);
        }
        self.pending.push_back(pending);
        Ok(())
    }

    /// Pop the next packet no larger than `max_bytes`.
    ///
    /// `max_bytes` becomes the budget for PDUs pushed afterwards. If the next
    /// queued packet is larger, the rest of its PDU is re-fragmented at
    /// `max_bytes`. Returns `Ok(None)` when nothing can be delivered.
    pub fn pop_packet(&mut self, max_bytes: usize) -> Result<Option<Bytes>> {
        self.budget = max_bytes;
        self.take(max_bytes, true)
    }

    /// Pack queued packets into one zero-padded burst of exactly `burst_len` bytes.
    ///
    /// The head PDU is re-fragmented to fit the burst if needed; further
    /// packets are only added while they fit whole in the remaining space.
    pub fn pop_burst(&mut self, burst_len: usize) -> Result<Option<Bytes>> {
        self.budget = burst_len;
        let Some(first) = self.take(burst_len, true)? else {
            return Ok(None);
        };

        let mut burst = BytesMut::with_capacity(burst_len);
        burst.extend_from_slice(&first);
        while burst.len() < burst_len {
            match self.take(burst_len - burst.len(), false)? {
                Some(packet) => burst.extend_from_slice(&packet),
                None => break,
            }
        }
        trace!(
            channel = self.index,
            used = burst.len(),
            burst_len,
            "burst assembled"
        );
        burst.resize(burst_len, 0);
        Ok(Some(burst.freeze()))
    }

    fn take(&mut self, max_bytes: usize, refragment: bool) -> Result<Option<Bytes>> {
        let Some(head) = self.pending.front_mut() else {
            return Ok(None);
        };

        let fits = head
            .packets
            .front()
            .is_some_and(|fragment| fragment.packet.len() <= max_bytes);
        if !fits {
            if !refragment {
                return Ok(None);
            }
            let replanned = fragment_remaining(
                &head.source(),
                head.sent,
                head.started,
                max_bytes,
                &mut self.scratch,
            );
            match replanned {
                Ok(packets) => {
                    debug!(
                        channel = self.index,
                        frag_id = head.frag_id,
                        offset = head.sent,
                        packets = packets.len(),
                        max_bytes,
                        "re-fragmented PDU remainder"
                    );
                    head.packets = packets;
                }
                Err(EngineError::PacketTooSmall { .. }) => return Ok(None),
                Err(err) => return Err(err),
            }
        }

        let Some(fragment) = head.packets.pop_front() else {
            return Ok(None);
        };
        head.sent += fragment.payload_len;
        head.started = true;
        trace!(
            channel = self.index,
            len = fragment.packet.len(),
            kind = ?fragment.kind,
            "packet dequeued"
        );
        if head.packets.is_empty() {
            self.pending.pop_front();
        }
        Ok(Some(fragment.packet))
    }

    /// Set the budget used for PDUs pushed from now on.
    pub fn set_packet_budget(&mut self, budget: usize) {
        self.budget = budget;
    }

    pub fn packet_budget(&self) -> usize {
        self.budget
    }

    /// PDUs with at least one packet still queued.
    pub fn pending_pdus(&self) -> usize {
        self.pending.len()
    }

    /// Packets currently queued across all pending PDUs.
    pub fn queued_packets(&self) -> usize {
        self.pending.iter().map(|pdu| pdu.packets.len()).sum()
    }

    /// Drop all queued PDUs and forget the last label.
    pub fn reset(&mut self) {
        if !self.pending.is_empty() {
            debug!(
                channel = self.index,
                dropped = self.pending.len(),
                "TX channel reset"
            );
        }
        self.pending.clear();
        self.last_label = None;
    }
}

/// Splits PDUs into packets, one independent queue per channel.
#[derive(Debug)]
pub struct Encapsulator {
    channels: Vec<TxChannel>,
}

impl Encapsulator {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let channels = (0..config.channels)
            .map(|index| TxChannel::new(index, config))
            .collect();
        Ok(Self { channels })
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, channel: usize) -> Result<&TxChannel> {
        let channels = self.channels.len();
        self.channels
            .get(channel)
            .ok_or(EngineError::ChannelOutOfRange { channel, channels })
    }

    pub fn channel_mut(&mut self, channel: usize) -> Result<&mut TxChannel> {
        let channels = self.channels.len();
        self.channels
            .get_mut(channel)
            .ok_or(EngineError::ChannelOutOfRange { channel, channels })
    }

    /// All channels, for driving several of them from different threads.
    pub fn channels_mut(&mut self) -> &mut [TxChannel] {
        &mut self.channels
    }

    /// Copy `bytes` in as a PDU with a 6-byte label.
    pub fn push_pdu(
        &mut self,
        bytes: &[u8],
        channel: usize,
        label: &[u8],
        protocol_type: u16,
    ) -> Result<()> {
        let tx = self.channel_mut(channel)?;
        let label: [u8; LABEL_LEN] = label.try_into().map_err(|_| {
            EngineError::InvalidLabel(format!(
                "expected {LABEL_LEN}-byte label, got {} bytes",
                label.len()
            ))
        })?;
        tx.push(Pdu::new(label, protocol_type, Bytes::copy_from_slice(bytes)))
    }

    pub fn push(&mut self, channel: usize, pdu: Pdu) -> Result<()> {
        self.channel_mut(channel)?.push(pdu)
    }

    pub fn pop_packet(&mut self, channel: usize, max_bytes: usize) -> Result<Option<Bytes>> {
        self.channel_mut(channel)?.pop_packet(max_bytes)
    }

    pub fn pop_burst(&mut self, channel: usize, burst_len: usize) -> Result<Option<Bytes>> {
        self.channel_mut(channel)?.pop_burst(burst_len)
    }

    pub fn set_packet_budget(&mut self, channel: usize, budget: usize) -> Result<()> {
        self.channel_mut(channel)?.set_packet_budget(budget);
        Ok(())
    }

    pub fn pending_pdus(&self, channel: usize) -> Result<usize> {
        Ok(self.channel(channel)?.pending_pdus())
    }

    pub fn queued_packets(&self, channel: usize) -> Result<usize> {
        Ok(self.channel(channel)?.queued_packets())
    }

    pub fn reset_channel(&mut self, channel: usize) -> Result<()> {
        self.channel_mut(channel)?.reset();
        Ok(())
    }
}
