//! Capture sources: where records come from.
//!
//! A source is opened once, read until it reports [`NextRecord::EndOfCapture`] or fails,
//! and then closed. It cannot be restarted.

pub mod live;
pub mod replay;

use crate::config::CaptureConfig;
use crate::error::DeviceError;
use crate::record::CapturedRecord;
use crate::stats::DeviceStats;

pub use live::{LiveDevice, LiveSource, RecordCodec};
pub use replay::{ReplayOpener, ReplaySource};

/// Outcome of one read on a capture source.
#[derive(Debug)]
pub enum NextRecord {
    Record(CapturedRecord),
    /// The read timeout expired without a packet.
    Idle,
    EndOfCapture,
}

pub trait CaptureSource: Send {
    /// Blocks for at most the configured read timeout.
    fn next_record(&mut self) -> Result<NextRecord, DeviceError>;

    /// Cumulative device counters, if the source has any.
    fn device_stats(&mut self) -> Option<DeviceStats>;

    fn close(&mut self) {}
}

/// Opens a [`CaptureSource`] for an interface.
pub trait SourceOpener: Send + Sync {
    fn open(
        &self,
        interface: &str,
        config: &CaptureConfig,
    ) -> Result<Box<dyn CaptureSource>, DeviceError>;
}
