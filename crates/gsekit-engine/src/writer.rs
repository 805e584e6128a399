use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use tracing::debug;

use crate::encap::Encapsulator;
use crate::error::{EngineError, Result};

/// Writes fixed-size, zero-padded bursts to any `Write` stream.
pub struct BurstWriter<W> {
    inner: W,
    buf: BytesMut,
    burst_len: usize,
}

impl<W: Write> BurstWriter<W> {
    /// Create a writer for bursts of `burst_len` bytes.
    pub fn new(inner: W, burst_len: usize) -> Result<Self> {
        if burst_len == 0 {
            return Err(EngineError::InvalidConfig(
                "burst_len must be at least 1".into(),
            ));
        }
        Ok(Self {
            inner,
            buf: BytesMut::with_capacity(burst_len),
            burst_len,
        })
    }

    /// Write one burst (blocking), zero-padding it to the burst length.
    pub fn write_burst(&mut self, burst: &[u8]) -> Result<()> {
        if burst.len() > self.burst_len {
            return Err(EngineError::PacketTooSmall {
                budget: self.burst_len,
                required: burst.len(),
            });
        }

        self.buf.clear();
        self.buf.extend_from_slice(burst);
        self.buf.resize(self.burst_len, 0);

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(EngineError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(EngineError::Io(err)),
            }
        }

        self.flush()
    }

    /// Pop and write bursts from `channel` until it has nothing left that fits.
    ///
    /// Returns the number of bursts written.
    pub fn drain(&mut self, encap: &mut Encapsulator, channel: usize) -> Result<usize> {
        let mut written = 0;
        while let Some(burst) = encap.pop_burst(channel, self.burst_len)? {
            self.write_burst(&burst)?;
            written += 1;
        }
        if written > 0 {
            debug!(channel, bursts = written, burst_len = self.burst_len, "channel drained");
        }
        Ok(written)
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(EngineError::Io(err)),
            }
        }
    }

    pub fn burst_len(&self) -> usize {
        self.burst_len
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use gsekit_packet::{decode_header, is_padding, packet_len};

    use super::*;
    use crate::config::EngineConfig;
    use crate::decap::Decapsulator;
    use crate::reader::BurstReader;

    const LABEL: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];

    #[test]
    fn short_burst_is_zero_padded() {
        let mut writer = BurstWriter::new(Cursor::new(Vec::<u8>::new()), 16).unwrap();
        writer.write_burst(b"abc").unwrap();

        let wire = writer.into_inner().into_inner();
        assert_eq!(wire.len(), 16);
        assert_eq!(&wire[..3], b"abc");
        assert!(wire[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn oversized_burst_rejected() {
        let mut writer = BurstWriter::new(Cursor::new(Vec::<u8>::new()), 4).unwrap();
        let err = writer.write_burst(b"oversized").unwrap_err();
        assert!(matches!(
            err,
            EngineError::PacketTooSmall {
                budget: 4,
                required: 9
            }
        ));
    }

    #[test]
    fn drain_empties_channel() {
        let mut encap = Encapsulator::new(&EngineConfig::default()).unwrap();
        encap.push_pdu(&[0x11; 150], 0, &LABEL, 0x0800).unwrap();
        encap.push_pdu(b"tail", 0, &LABEL, 0x0800).unwrap();

        let mut writer = BurstWriter::new(Cursor::new(Vec::<u8>::new()), 64).unwrap();
        let bursts = writer.drain(&mut encap, 0).unwrap();
        assert_eq!(encap.pending_pdus(0).unwrap(), 0);
        assert_eq!(writer.drain(&mut encap, 0).unwrap(), 0);

        let wire = writer.into_inner().into_inner();
        assert_eq!(wire.len(), bursts * 64);

        let mut packets = 0;
        for burst in wire.chunks(64) {
            let mut rest = burst;
            while !rest.is_empty() && !is_padding(rest) {
                let len = packet_len(rest).unwrap();
                decode_header(&rest[..len]).unwrap();
                rest = &rest[len..];
                packets += 1;
            }
        }
        assert!(packets >= 4);
    }

    #[test]
    fn flush_propagates() {
        let sink = FlushTrackingWriter::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = BurstWriter::new(sink, 8).unwrap();

        writer.write_burst(b"x").unwrap();

        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn accessors_and_into_inner() {
        let cursor = Cursor::new(Vec::<u8>::new());
        let mut writer = BurstWriter::new(cursor, 8).unwrap();

        assert_eq!(writer.burst_len(), 8);
        let _ = writer.get_ref();
        let _ = writer.get_mut();
        let _inner = writer.into_inner();
    }

    #[test]
    fn handles_interrupted_write_and_flush() {
        let sink = FlakyWriter::new(ErrorKind::Interrupted);
        let mut writer = BurstWriter::new(sink, 12).unwrap();
        writer.write_burst(b"retry").unwrap();

        assert_eq!(writer.into_inner().data.len(), 12);
    }

    #[test]
    fn handles_would_block_write_and_flush() {
        let sink = FlakyWriter::new(ErrorKind::WouldBlock);
        let mut writer = BurstWriter::new(sink, 12).unwrap();
        writer.write_burst(b"retry").unwrap();

        assert_eq!(writer.into_inner().data.len(), 12);
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let mut writer = BurstWriter::new(ZeroWriter, 8).unwrap();
        let err = writer.write_burst(b"x").unwrap_err();
        assert!(matches!(err, EngineError::ConnectionClosed));
    }

    #[test]
    fn written_bursts_decode() {
        let mut encap = Encapsulator::new(&EngineConfig::default()).unwrap();
        encap.push_pdu(b"z", 0, &LABEL, 3).unwrap();

        let mut writer = BurstWriter::new(Cursor::new(Vec::<u8>::new()), 32).unwrap();
        writer.drain(&mut encap, 0).unwrap();

        let wire = writer.into_inner().into_inner();
        let mut reader = BurstReader::new(Cursor::new(wire), 32).unwrap();
        let mut decap = Decapsulator::new(&EngineConfig::default()).unwrap();
        reader.pump(&mut decap, 0).unwrap();

        let pdu = decap.pop_pdu(0).unwrap().unwrap();
        assert_eq!(pdu.protocol_type, 3);
        assert_eq!(pdu.payload.as_ref(), b"z");
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        flushed: Arc<AtomicBool>,
        data: Vec<u8>,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FlakyWriter {
        failure: ErrorKind,
        write_failed: bool,
        flush_failed: bool,
        data: Vec<u8>,
    }

    impl FlakyWriter {
        fn new(failure: ErrorKind) -> Self {
            Self {
                failure,
                write_failed: false,
                flush_failed: false,
                data: Vec::new(),
            }
        }
    }

    impl Write for FlakyWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.write_failed {
                self.write_failed = true;
                return Err(std::io::Error::from(self.failure));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if !self.flush_failed {
                self.flush_failed = true;
                return Err(std::io::Error::from(self.failure));
            }
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
