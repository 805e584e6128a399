use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::decap::Decapsulator;
use crate::error::{EngineError, Result};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads fixed-size bursts from any `Read` stream.
///
/// Partial reads are handled internally; callers always get whole bursts.
pub struct BurstReader<R> {
    inner: R,
    buf: BytesMut,
    burst_len: usize,
}

impl<R: Read> BurstReader<R> {
    /// Create a reader for bursts of `burst_len` bytes.
    pub fn new(inner: R, burst_len: usize) -> Result<Self> {
        if burst_len == 0 {
            return Err(EngineError::InvalidConfig(
                "burst_len must be at least 1".into(),
            ));
        }
        Ok(Self {
            inner,
            buf: BytesMut::with_capacity(burst_len.max(READ_CHUNK_SIZE)),
            burst_len,
        })
    }

    /// Read the next complete burst (blocking).
    ///
    /// Returns `Err(EngineError::ConnectionClosed)` when EOF is reached, also
    /// when it cuts a burst short.
    pub fn read_burst(&mut self) -> Result<Bytes> {
        loop {
            if self.buf.len() >= self.burst_len {
                return Ok(self.buf.split_to(self.burst_len).freeze());
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(EngineError::Io(err)),
            };

            if read == 0 {
                return Err(EngineError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Read one burst and feed it to `channel` of the decapsulator.
    ///
    /// Returns the number of packets the burst carried.
    pub fn pump(&mut self, decap: &mut Decapsulator, channel: usize) -> Result<usize> {
        let burst = self.read_burst()?;
        let packets = decap.push_burst(&burst, channel)?;
        trace!(channel, packets, "burst received");
        Ok(packets)
    }

    pub fn burst_len(&self) -> usize {
        self.burst_len
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> R {
        self.inner
    }
}
