//! Error types for the capture pipeline.
//!
//! Only device-level failures and broken pipeline invariants are errors. Incomplete
//! frames, ring evictions and sink failures are counted in [`crate::CaptureStats`].

use thiserror::Error;

use crate::pipeline::PipelineState;

/// Failures talking to the capture device or the OS interface tables.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// No interface with this name is known to libpcap.
    #[error("interface {0} not found")]
    NotFound(String),

    /// The device exists but could not be activated (permissions, busy, bad options).
    #[error("cannot open capture on {interface}: {source}")]
    Open {
        interface: String,
        #[source]
        source: pcap::Error,
    },

    /// A read on an open handle failed.
    #[error("capture read failed: {0}")]
    Read(#[source] pcap::Error),

    /// Interface enumeration failed.
    #[error("cannot list capture devices: {0}")]
    Lookup(#[source] pcap::Error),
}

/// Errors surfaced by [`crate::Pipeline`] control operations.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("operation not allowed while pipeline is {0}")]
    InvalidState(PipelineState),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("cannot spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} thread panicked")]
    WorkerPanicked(&'static str),
}
