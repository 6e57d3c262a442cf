use envconfig::Envconfig;

use crate::error::PipelineError;

/// Capture and buffering options, read from the environment by the binary.
#[derive(Envconfig, Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    #[envconfig(from = "PCAP_SNAPLEN", default = "65536")]
    pub snapshot_length: i32,

    #[envconfig(from = "PCAP_PROMISC", default = "true")]
    pub promiscuous: bool,

    /// Upper bound on a single device read, so a stop request is noticed promptly.
    #[envconfig(from = "PCAP_TIMEOUT_MS", default = "10")]
    pub read_timeout_ms: i32,

    /// Kernel buffer size in bytes; 0 keeps the libpcap default.
    #[envconfig(from = "PCAP_BUFFER_SIZE", default = "0")]
    pub buffer_size: i32,

    #[envconfig(from = "RING_CAPACITY", default = "4096")]
    pub ring_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            snapshot_length: 65536,
            promiscuous: true,
            read_timeout_ms: 10,
            buffer_size: 0,
            ring_capacity: 4096,
        }
    }
}

impl CaptureConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.ring_capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "ring capacity must be at least one slot".into(),
            ));
        }
        if self.snapshot_length <= 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "snapshot length must be positive, got {}",
                self.snapshot_length
            )));
        }
        // libpcap treats 0 as "wait forever", which would make stop() hang on an idle link
        if self.read_timeout_ms <= 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "read timeout must be positive, got {} ms",
                self.read_timeout_ms
            )));
        }
        if self.buffer_size < 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "buffer size cannot be negative, got {}",
                self.buffer_size
            )));
        }
        Ok(())
    }
}
