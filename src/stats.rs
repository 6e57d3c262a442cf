use std::sync::atomic::{AtomicU64, Ordering};

use serde_derive::Serialize;

/// Point-in-time view of the pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CaptureStats {
    /// Records read from the capture source.
    pub received: u64,
    /// Records evicted from the full ring before the consumer reached them.
    pub dropped_by_ring: u64,
    /// Packets the device itself dropped (kernel buffer plus interface drops).
    pub dropped_by_device: u64,
    /// Frames delivered with a truncated or invalid layer.
    pub decode_errors: u64,
    /// Frames delivered fully decoded.
    pub decoded: u64,
    /// Deliveries the sink rejected or panicked on.
    pub sink_errors: u64,
}

impl CaptureStats {
    /// Frames handed to the sink.
    pub fn delivered(&self) -> u64 {
        self.decoded + self.decode_errors
    }

    /// Records received but not yet delivered or evicted.
    pub fn in_flight(&self) -> u64 {
        self.received
            .saturating_sub(self.dropped_by_ring + self.delivered())
    }
}

/// Counters reported by the capture device (`ps_recv`, `ps_drop`, `ps_ifdrop`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeviceStats {
    pub received: u64,
    pub dropped: u64,
    pub dropped_by_interface: u64,
}

/// Live counters shared between the workers. Every field has exactly one writing thread.
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    // producer
    received: AtomicU64,
    device_received: AtomicU64,
    device_dropped: AtomicU64,
    device_if_dropped: AtomicU64,
    // consumer
    decoded: AtomicU64,
    decode_errors: AtomicU64,
    sink_errors: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::SeqCst);
    }

    /// Device counters are cumulative; keep the largest value seen so snapshots never go back.
    pub(crate) fn record_device(&self, stats: DeviceStats) {
        self.device_received
            .fetch_max(stats.received, Ordering::SeqCst);
        self.device_dropped.fetch_max(stats.dropped, Ordering::SeqCst);
        self.device_if_dropped
            .fetch_max(stats.dropped_by_interface, Ordering::SeqCst);
    }

    pub(crate) fn record_frame(&self, complete: bool) {
        if complete {
            self.decoded.fetch_add(1, Ordering::SeqCst);
        } else {
            self.decode_errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub(crate) fn record_sink_error(&self) {
        self.sink_errors.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn device(&self) -> DeviceStats {
        DeviceStats {
            received: self.device_received.load(Ordering::SeqCst),
            dropped: self.device_dropped.load(Ordering::SeqCst),
            dropped_by_interface: self.device_if_dropped.load(Ordering::SeqCst),
        }
    }

    /// Downstream counters are read before `received` so a snapshot taken while running
    /// never shows more frames delivered than received.
    pub(crate) fn snapshot(&self, dropped_by_ring: impl FnOnce() -> u64) -> CaptureStats {
        let sink_errors = self.sink_errors.load(Ordering::SeqCst);
        let decoded = self.decoded.load(Ordering::SeqCst);
        let decode_errors = self.decode_errors.load(Ordering::SeqCst);
        let dropped_by_ring = dropped_by_ring();
        let device = self.device();
        let received = self.received.load(Ordering::SeqCst);
        CaptureStats {
            received,
            dropped_by_ring,
            dropped_by_device: device.dropped + device.dropped_by_interface,
            decode_errors,
            decoded,
            sink_errors,
        }
    }
}
