use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, SystemTime};

use log::debug;

use super::{CaptureSource, NextRecord, SourceOpener};
use crate::config::CaptureConfig;
use crate::error::DeviceError;
use crate::record::CapturedRecord;
use crate::stats::DeviceStats;

/// Plays back a fixed list of records, then ends.
///
/// Used for tests and dry runs where no device or capture privileges are available.
#[derive(Debug, Default)]
pub struct ReplaySource {
    records: VecDeque<CapturedRecord>,
    device: Option<DeviceStats>,
    failure: Option<String>,
    hold_open: bool,
    idle_delay: Duration,
    delivered: u64,
}

impl ReplaySource {
    pub fn new(records: impl IntoIterator<Item = CapturedRecord>) -> Self {
        ReplaySource {
            records: records.into_iter().collect(),
            idle_delay: Duration::from_millis(1),
            ..ReplaySource::default()
        }
    }

    /// Records stamped one millisecond apart, starting at the Unix epoch.
    pub fn from_frames<F>(frames: impl IntoIterator<Item = F>) -> Self
    where
        F: Into<Box<[u8]>>,
    {
        Self::new(frames.into_iter().enumerate().map(|(i, frame)| {
            let ts = SystemTime::UNIX_EPOCH + Duration::from_millis(i as u64);
            CapturedRecord::complete(ts, frame)
        }))
    }

    /// Reports these counters as the device's own statistics.
    pub fn with_device_stats(mut self, stats: DeviceStats) -> Self {
        self.device = Some(stats);
        self
    }

    /// After the last record, fail the read instead of ending the capture.
    pub fn fail_after_records(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// After the last record, keep reporting idle reads like a quiet live interface.
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    pub fn into_opener(self) -> ReplayOpener {
        ReplayOpener {
            source: Mutex::new(Some(self)),
        }
    }
}

impl CaptureSource for ReplaySource {
    fn next_record(&mut self) -> Result<NextRecord, DeviceError> {
        if let Some(record) = self.records.pop_front() {
            self.delivered += 1;
            return Ok(NextRecord::Record(record));
        }
        if let Some(message) = self.failure.take() {
            return Err(DeviceError::Read(pcap::Error::PcapError(message)));
        }
        if self.hold_open {
            thread::sleep(self.idle_delay);
            return Ok(NextRecord::Idle);
        }
        Ok(NextRecord::EndOfCapture)
    }

    fn device_stats(&mut self) -> Option<DeviceStats> {
        self.device.map(|stats| DeviceStats {
            received: stats.received.max(self.delivered),
            ..stats
        })
    }

    fn close(&mut self) {
        debug!(
            "Replay closed after {} records, {} left unread",
            self.delivered,
            self.records.len()
        );
        self.records.clear();
    }
}

/// Hands out its [`ReplaySource`] to the first `open` call; later calls fail.
#[derive(Debug)]
pub struct ReplayOpener {
    source: Mutex<Option<ReplaySource>>,
}

impl SourceOpener for ReplayOpener {
    fn open(
        &self,
        interface: &str,
        _config: &CaptureConfig,
    ) -> Result<Box<dyn CaptureSource>, DeviceError> {
        let source = self
            .source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| DeviceError::NotFound(interface.to_string()))?;
        debug!("Replaying {} records as {}", source.records.len(), interface);
        Ok(Box::new(source))
    }
}
