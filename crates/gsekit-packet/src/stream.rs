use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_header, is_padding, packet_len, BASE_HEADER_LEN, MIN_PACKET_LEN};
use crate::error::StreamError;

/// `tokio_util` codec for packets carried on a byte stream.
///
/// Packet boundaries come from the length field. Each item is one complete,
/// header-validated packet.
///
/// A codec from [`GseCodec::new`] expects packets back to back with no
/// padding; zero bytes where a header should start fail to decode. One from
/// [`GseCodec::with_burst_len`] reads the stream as fixed-size bursts and
/// skips the zero padding that closes each burst. Its encoder pads a burst
/// whenever the next packet does not fit in what is left of it.
#[derive(Debug, Clone, Copy, Default)]
pub struct GseCodec {
    burst_len: Option<usize>,
    rx_offset: usize,
    rx_padding: bool,
    tx_offset: usize,
}

impl GseCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Codec for a stream cut into bursts of `burst_len` bytes.
    pub fn with_burst_len(burst_len: usize) -> Result<Self, StreamError> {
        if burst_len < MIN_PACKET_LEN {
            return Err(StreamError::InvalidBurstLen {
                burst_len,
                min: MIN_PACKET_LEN,
            });
        }
        Ok(Self {
            burst_len: Some(burst_len),
            ..Self::default()
        })
    }

    pub fn burst_len(&self) -> Option<usize> {
        self.burst_len
    }

    /// Consume padding up to the end of the current burst.
    ///
    /// Returns `false` while more bytes are needed to tell padding from the
    /// next packet.
    fn skip_padding(&mut self, burst_len: usize, src: &mut BytesMut) -> bool {
        loop {
            if self.rx_offset == burst_len {
                self.rx_offset = 0;
                self.rx_padding = false;
            }
            let remaining = burst_len - self.rx_offset;
            if !self.rx_padding {
                // Fewer than two bytes left cannot hold a header.
                if remaining >= BASE_HEADER_LEN {
                    if src.len() < BASE_HEADER_LEN {
                        return false;
                    }
                    if !is_padding(src) {
                        return true;
                    }
                }
                self.rx_padding = true;
            }
            let n = remaining.min(src.len());
            if n == 0 {
                return false;
            }
            src.advance(n);
            self.rx_offset += n;
        }
    }
}

impl Decoder for GseCodec {
    type Item = Bytes;
    type Error = StreamError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(burst_len) = self.burst_len {
            if !self.skip_padding(burst_len, src) {
                return Ok(None);
            }
        }
        let Some(len) = packet_len(src) else {
            return Ok(None);
        };
        if let Some(burst_len) = self.burst_len {
            let remaining = burst_len - self.rx_offset;
            if len > remaining {
                return Err(StreamError::BurstOverrun { len, remaining });
            }
        }
        if src.len() < len {
            src.reserve(len - src.len());
            return Ok(None);
        }
        decode_header(&src[..len])?;
        if self.burst_len.is_some() {
            self.rx_offset += len;
        }
        Ok(Some(src.split_to(len).freeze()))
    }
}

impl Encoder<Bytes> for GseCodec {
    type Error = StreamError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let desc = decode_header(&item)?;
        let len = desc.packet_len();
        if let Some(burst_len) = self.burst_len {
            if len > burst_len {
                return Err(StreamError::BurstOverrun {
                    len,
                    remaining: burst_len,
                });
            }
            let remaining = burst_len - self.tx_offset;
            if len > remaining {
                dst.put_bytes(0, remaining);
                self.tx_offset = 0;
            }
            self.tx_offset = (self.tx_offset + len) % burst_len;
        }
        dst.extend_from_slice(&item[..len]);
        Ok(())
    }
}
