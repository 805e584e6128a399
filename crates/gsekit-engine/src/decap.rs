use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use gsekit_packet::{
    announced_total_length, decode_header, is_padding, packet_len, DecodingError, FragmentKind,
    Label, PacketHeader,
};
use tracing::{debug, trace, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::pdu::Pdu;

/// Reassembly state of a receive channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No PDU in progress.
    Idle,
    /// A start fragment was accepted and the end fragment is outstanding.
    Assembling,
}

/// Per-channel receive counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxStats {
    /// Packets offered to the channel, including rejected ones.
    pub packets: u64,
    /// PDUs placed on the completed queue.
    pub completed: u64,
    /// PDUs lost to sequence, length or queue errors.
    pub discarded: u64,
}

#[derive(Debug)]
struct Reassembly {
    frag_id: u8,
    label: Label,
    protocol_type: u16,
    total_length: usize,
}

/// Receive-side state of one channel.
#[derive(Debug)]
pub struct RxChannel {
    index: usize,
    assembly: Option<Reassembly>,
    buf: BytesMut,
    last_label: Option<Label>,
    completed: VecDeque<Pdu>,
    capacity: usize,
    stats: RxStats,
}

impl RxChannel {
    pub(crate) fn new(index: usize, config: &EngineConfig) -> Self {
        Self {
            index,
            assembly: None,
            buf: BytesMut::new(),
            last_label: None,
            completed: VecDeque::new(),
            capacity: config.rx_queue_capacity,
            stats: RxStats::default(),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Feed one received packet. Bytes past its declared length are ignored.
    ///
    /// On any error the PDU in progress, if any, is discarded and the channel
    /// is left idle.
    pub fn push_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.stats.packets += 1;

        let desc = match decode_header(packet) {
            Ok(desc) => desc,
            Err(err) => {
                self.discard("undecodable packet");
                return Err(err.into());
            }
        };
        let header = &desc.header;
        let payload = desc.payload(packet);
        trace!(
            channel = self.index,
            kind = ?desc.kind(),
            len = desc.packet_len(),
            "packet received"
        );

        match desc.kind() {
            FragmentKind::Complete | FragmentKind::First => self.on_start(header, payload),
            FragmentKind::Middle | FragmentKind::Last => self.on_continuation(header, payload),
        }
    }

    fn on_start(&mut self, header: &PacketHeader, payload: &[u8]) -> Result<()> {
        let Some((protocol_type, wire_label)) = header.start_fields() else {
            return Err(self.missing_field("protocol type"));
        };
        let fragmented = if header.end {
            None
        } else {
            match header.frag_id.zip(header.total_length) {
                Some((frag_id, field)) => Some((frag_id, announced_total_length(field))),
                None => return Err(self.missing_field("total length")),
            }
        };

        if self.assembly.is_some() {
            self.discard("start fragment replaced incomplete PDU");
        }

        let label = match wire_label {
            Label::Reuse => match self.last_label {
                Some(label) => label,
                None => {
                    self.stats.discarded += 1;
                    warn!(channel = self.index, "label reuse before any label seen");
                    return Err(EngineError::NoPreviousLabel(self.index));
                }
            },
            Label::Six(_) | Label::Three(_) => {
                self.last_label = Some(wire_label);
                wire_label
            }
            Label::Broadcast => Label::Broadcast,
        };

        let Some((frag_id, total_length)) = fragmented else {
            return self.complete(Pdu {
                label,
                protocol_type,
                payload: Bytes::copy_from_slice(payload),
            });
        };

        if payload.len() > total_length {
            self.stats.discarded += 1;
            warn!(
                channel = self.index,
                total_length,
                got = payload.len(),
                "first fragment exceeds announced length"
            );
            return Err(EngineError::LengthMismatch {
                channel: self.index,
                expected: total_length,
                actual: payload.len(),
            });
        }

        self.buf.clear();
        self.buf.reserve(total_length);
        self.buf.extend_from_slice(payload);
        self.assembly = Some(Reassembly {
            frag_id,
            label,
            protocol_type,
            total_length,
        });
        debug!(
            channel = self.index,
            frag_id, total_length, "reassembly started"
        );
        Ok(())
    }

    fn on_continuation(&mut self, header: &PacketHeader, payload: &[u8]) -> Result<()> {
        let Some(got) = header.frag_id else {
            return Err(self.missing_field("fragment id"));
        };
        let end = header.end;
        let Some(assembly) = self.assembly.as_ref() else {
            warn!(channel = self.index, frag_id = got, "continuation without start fragment");
            return Err(EngineError::FragmentSequence {
                channel: self.index,
                expected: None,
                got,
            });
        };

        if assembly.frag_id != got {
            let expected = assembly.frag_id;
            self.discard("fragment id mismatch");
            return Err(EngineError::FragmentSequence {
                channel: self.index,
                expected: Some(expected),
                got,
            });
        }

        let expected = assembly.total_length;
        let actual = self.buf.len() + payload.len();
        if actual > expected || (end && actual < expected) {
            self.discard("reassembled length mismatch");
            return Err(EngineError::LengthMismatch {
                channel: self.index,
                expected,
                actual,
            });
        }

        self.buf.extend_from_slice(payload);
        if !end {
            return Ok(());
        }

        let Some(assembly) = self.assembly.take() else {
            return Ok(());
        };
        let payload = self.buf.split().freeze();
        self.complete(Pdu {
            label: assembly.label,
            protocol_type: assembly.protocol_type,
            payload,
        })
    }

    fn complete(&mut self, pdu: Pdu) -> Result<()> {
        if self.completed.len() >= self.capacity {
            self.stats.discarded += 1;
            warn!(
                channel = self.index,
                capacity = self.capacity,
                "completed queue full, PDU dropped"
            );
            return Err(EngineError::QueueFull {
                channel: self.index,
                capacity: self.capacity,
            });
        }
        debug!(
            channel = self.index,
            len = pdu.len(),
            protocol_type = pdu.protocol_type,
            "PDU reassembled"
        );
        self.stats.completed += 1;
        self.completed.push_back(pdu);
        Ok(())
    }

    fn missing_field(&mut self, field: &'static str) -> EngineError {
        self.discard("header missing required field");
        DecodingError::MissingField(field).into()
    }

    fn discard(&mut self, reason: &'static str) {
        if let Some(assembly) = self.assembly.take() {
            self.stats.discarded += 1;
            warn!(
                channel = self.index,
                frag_id = assembly.frag_id,
                buffered = self.buf.len(),
                reason,
                "in-progress PDU discarded"
            );
        }
        self.buf.clear();
    }

    /// Feed every packet of one burst, stopping at padding.
    ///
    /// Errors that cost a single PDU are logged and skipped; a header that
    /// cannot be decoded ends the burst with an error. Returns the number of
    /// packets consumed.
    pub fn push_burst(&mut self, burst: &[u8]) -> Result<usize> {
        let mut offset = 0;
        let mut consumed = 0;
        while offset < burst.len() {
            let rest = &burst[offset..];
            if is_padding(rest) {
                break;
            }
            let len = packet_len(rest).unwrap_or(rest.len()).min(rest.len());
            match self.push_packet(&rest[..len]) {
                Ok(()) => {}
                Err(err) if err.is_recoverable() => {
                    warn!(channel = self.index, error = %err, "packet in burst dropped a PDU");
                }
                Err(err) => return Err(err),
            }
            offset += len;
            consumed += 1;
        }
        Ok(consumed)
    }

    /// Oldest completed PDU, if any.
    pub fn pop_pdu(&mut self) -> Option<Pdu> {
        self.completed.pop_front()
    }

    pub fn state(&self) -> ChannelState {
        if self.assembly.is_some() {
            ChannelState::Assembling
        } else {
            ChannelState::Idle
        }
    }

    /// Completed PDUs awaiting collection.
    pub fn pending_pdus(&self) -> usize {
        self.completed.len()
    }

    pub fn stats(&self) -> RxStats {
        self.stats
    }

    /// Drop the PDU in progress, the completed queue and the remembered label.
    pub fn reset(&mut self) {
        self.discard("channel reset");
        self.completed.clear();
        self.last_label = None;
    }
}

/// Rebuilds PDUs from packets, one independent reassembly per channel.
#[derive(Debug)]
pub struct Decapsulator {
    channels: Vec<RxChannel>,
}

impl Decapsulator {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let channels = (0..config.channels)
            .map(|index| RxChannel::new(index, config))
            .collect();
        Ok(Self { channels })
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, channel: usize) -> Result<&RxChannel> {
        let channels = self.channels.len();
        self.channels
            .get(channel)
            .ok_or(EngineError::ChannelOutOfRange { channel, channels })
    }

    pub fn channel_mut(&mut self, channel: usize) -> Result<&mut RxChannel> {
        let channels = self.channels.len();
        self.channels
            .get_mut(channel)
            .ok_or(EngineError::ChannelOutOfRange { channel, channels })
    }

    /// All channels, for driving several of them from different threads.
    pub fn channels_mut(&mut self) -> &mut [RxChannel] {
        &mut self.channels
    }

    pub fn push_packet(&mut self, bytes: &[u8], channel: usize) -> Result<()> {
        self.channel_mut(channel)?.push_packet(bytes)
    }

    pub fn push_burst(&mut self, burst: &[u8], channel: usize) -> Result<usize> {
        self.channel_mut(channel)?.push_burst(burst)
    }

    pub fn pop_pdu(&mut self, channel: usize) -> Result<Option<Pdu>> {
        Ok(self.channel_mut(channel)?.pop_pdu())
    }

    pub fn channel_state(&self, channel: usize) -> Result<ChannelState> {
        Ok(self.channel(channel)?.state())
    }

    pub fn pending_pdus(&self, channel: usize) -> Result<usize> {
        Ok(self.channel(channel)?.pending_pdus())
    }

    pub fn stats(&self, channel: usize) -> Result<RxStats> {
        Ok(self.channel(channel)?.stats())
    }

    pub fn reset_channel(&mut self, channel: usize) -> Result<()> {
        self.channel_mut(channel)?.reset();
        Ok(())
    }
}
