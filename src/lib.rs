//! Live packet capture with a bounded drop-oldest ring between the capture thread and a
//! decoding thread, and a minimal Ethernet/IP/TCP/UDP frame decoder.

pub mod config;
pub mod decode;
pub mod error;
pub mod interface;
pub mod pipeline;
pub mod record;
pub mod ring;
pub mod sink;
pub mod source;
pub mod stats;

pub use config::CaptureConfig;
pub use decode::{decode, DecodedFrame};
pub use error::{DeviceError, PipelineError};
pub use pipeline::{Pipeline, PipelineState};
pub use record::CapturedRecord;
pub use ring::RingBuffer;
pub use sink::{LogSink, Sink};
pub use source::{CaptureSource, NextRecord, SourceOpener};
pub use stats::{CaptureStats, DeviceStats};
