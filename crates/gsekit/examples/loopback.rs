//! Loopback example: encapsulate PDUs on two channels, carry them in fixed
//! bursts over a socket pair, and reassemble them on the other side.
//!
//! Run with:
//!   cargo run -p gsekit --example loopback --features logging
//!
//! Set `GSEKIT_LOG=json` for JSON logs, `GSEKIT_LEVEL=trace` for packet detail.

use std::os::unix::net::UnixStream;
use std::thread;

use gsekit::engine::{BurstReader, BurstWriter, Decapsulator, Encapsulator, EngineConfig, Pdu};
use gsekit::logging::{init_logging, LogFormat, LogLevel};
use gsekit::packet::Label;

const BURST_LEN: usize = 188;
const CHANNELS: usize = 2;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let format: LogFormat = std::env::var("GSEKIT_LOG")
        .unwrap_or_else(|_| "text".into())
        .parse()?;
    let level: LogLevel = std::env::var("GSEKIT_LEVEL")
        .unwrap_or_else(|_| "debug".into())
        .parse()?;
    init_logging(format, level);

    let config = EngineConfig {
        channels: CHANNELS,
        label_reuse: true,
        ..EngineConfig::default()
    };

    let mut encap = Encapsulator::new(&config)?;
    let pdus = [
        Pdu::new([0x02, 0, 0, 0, 0, 0x01], 0x0800, vec![0x45; 600]),
        Pdu::new([0x02, 0, 0, 0, 0, 0x01], 0x0800, b"short ping".to_vec()),
        Pdu::new(Label::Broadcast, 0x0806, vec![0xFF; 42]),
        Pdu::new([0xAA, 0xBB, 0xCC], 0x86DD, vec![0x60; 1500]),
    ];
    for (i, pdu) in pdus.iter().enumerate() {
        encap.push(i % CHANNELS, pdu.clone())?;
    }

    let (left, right) = UnixStream::pair()?;
    let receiver = thread::spawn(
        move || -> Result<Vec<(usize, Pdu)>, Box<dyn std::error::Error + Send + Sync>> {
            let mut decap = Decapsulator::new(&config)?;
            let mut reader = BurstReader::new(right, BURST_LEN)?;
            let mut received = Vec::new();
            // Bursts alternate channels in the order the sender drained them.
            let mut channel = 0;
            loop {
                match reader.pump(&mut decap, channel) {
                    Ok(_) => {}
                    Err(gsekit::engine::EngineError::ConnectionClosed) => break,
                    Err(err) => return Err(err.into()),
                }
                while let Some(pdu) = decap.pop_pdu(channel)? {
                    received.push((channel, pdu));
                }
                channel = (channel + 1) % CHANNELS;
            }
            Ok(received)
        },
    );

    let mut writer = BurstWriter::new(left, BURST_LEN)?;
    loop {
        let mut idle = true;
        for channel in 0..CHANNELS {
            if let Some(burst) = encap.pop_burst(channel, BURST_LEN)? {
                writer.write_burst(&burst)?;
                idle = false;
            } else {
                // Keep the receiver's channel rotation in step.
                writer.write_burst(&[])?;
            }
        }
        if idle {
            break;
        }
    }
    drop(writer);

    let received = receiver
        .join()
        .map_err(|_| "receiver thread panicked")?
        .map_err(|err| err.to_string())?;
    for (channel, pdu) in &received {
        eprintln!(
            "[rx] channel={channel} protocol=0x{:04x} label={:?} len={}",
            pdu.protocol_type,
            pdu.label,
            pdu.len()
        );
    }
    assert_eq!(received.len(), pdus.len());
    Ok(())
}
