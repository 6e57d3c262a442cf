use std::time::SystemTime;

use anyhow::Result;
use log::{debug, info};

use crate::decode::DecodedFrame;

/// Receives every decoded frame, in capture order, on the consumer thread.
///
/// An error from `accept` is logged and counted; delivery continues with the next frame.
pub trait Sink: Send {
    fn accept(&mut self, timestamp: SystemTime, frame: &DecodedFrame<'_>) -> Result<()>;

    /// Called once after the last frame has been delivered.
    fn finish(&mut self) {}
}

/// Logs one line per frame, optionally followed by a hex dump of the payload.
#[derive(Debug, Default)]
pub struct LogSink {
    log_payload: bool,
    frames: u64,
}

impl LogSink {
    pub fn new(log_payload: bool) -> Self {
        LogSink {
            log_payload,
            frames: 0,
        }
    }
}

impl Sink for LogSink {
    fn accept(&mut self, timestamp: SystemTime, frame: &DecodedFrame<'_>) -> Result<()> {
        let since_epoch = timestamp.duration_since(SystemTime::UNIX_EPOCH)?;
        info!(
            "Packet at {}.{:06}: {}",
            since_epoch.as_secs(),
            since_epoch.subsec_micros(),
            frame
        );
        if self.log_payload && !frame.payload.is_empty() {
            info!("Payload:\n{}", hex_dump(frame.payload));
        }
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) {
        debug!("Log sink saw {} frames", self.frames);
    }
}

/// Offset, hex and ASCII columns, 16 bytes per line.
pub fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .chunks(16)
        .enumerate()
        .map(|(line, chunk)| {
            let encoded = hex::encode(chunk);
            let columns: Vec<&str> = (0..encoded.len())
                .step_by(2)
                .map(|i| &encoded[i..i + 2])
                .collect();
            let ascii: String = chunk
                .iter()
                .map(|&b| {
                    if b.is_ascii_graphic() || b == b' ' {
                        b as char
                    } else {
                        '.'
                    }
                })
                .collect();
            format!("{:04x}  {:<48} {}", line * 16, columns.join(" "), ascii)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
