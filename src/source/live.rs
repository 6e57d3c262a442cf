use std::time::{Duration, SystemTime};

use log::{debug, info, warn};
use pcap::{Active, Capture, Linktype, Packet, PacketCodec};

use super::{CaptureSource, NextRecord, SourceOpener};
use crate::config::CaptureConfig;
use crate::error::DeviceError;
use crate::interface;
use crate::record::CapturedRecord;
use crate::stats::DeviceStats;

fn timestamp_from(ts: &libc::timeval) -> SystemTime {
    let secs = u64::try_from(ts.tv_sec).unwrap_or(0);
    let micros = u64::try_from(ts.tv_usec).unwrap_or(0);
    SystemTime::UNIX_EPOCH + Duration::from_secs(secs) + Duration::from_micros(micros)
}

// libpcap on musl/mips writes a 64-bit timeval while the crate expects the 32-bit layout
#[cfg(all(
    target_env = "musl",
    target_arch = "mips",
    target_os = "linux",
    target_endian = "little"
))]
pub fn record_from_packet(packet: Packet) -> CapturedRecord {
    #[repr(C)]
    struct ActualHeader {
        tv_sec: i64,
        tv_usec: i64,
        caplen: u32,
        len: u32,
    }

    let actual_header: &ActualHeader;
    let data: &[u8];

    unsafe {
        actual_header = &*(packet.header as *const _ as *const ActualHeader);
        data = std::slice::from_raw_parts(
            packet.data as *const _ as *const u8,
            actual_header.caplen as usize,
        );
    }

    let ts = libc::timeval {
        tv_sec: actual_header.tv_sec as libc::time_t,
        tv_usec: actual_header.tv_usec as libc::suseconds_t,
    };

    CapturedRecord::new(timestamp_from(&ts), data.into(), actual_header.len)
}

#[cfg(not(all(
    target_env = "musl",
    target_arch = "mips",
    target_os = "linux",
    target_endian = "little"
)))]
pub fn record_from_packet(packet: Packet) -> CapturedRecord {
    CapturedRecord::new(
        timestamp_from(&packet.header.ts),
        packet.data.into(),
        packet.header.len,
    )
}

/// Turns libpcap packets into owned [`CapturedRecord`]s.
pub struct RecordCodec;

impl PacketCodec for RecordCodec {
    type Item = CapturedRecord;
    fn decode(&mut self, packet: Packet) -> Self::Item {
        record_from_packet(packet)
    }
}

impl From<pcap::Stat> for DeviceStats {
    fn from(stat: pcap::Stat) -> Self {
        DeviceStats {
            received: u64::from(stat.received),
            dropped: u64::from(stat.dropped),
            dropped_by_interface: u64::from(stat.if_dropped),
        }
    }
}

/// A live libpcap handle on one interface.
pub struct LiveSource {
    interface: String,
    capture: Option<Capture<Active>>,
}

impl LiveSource {
    pub fn open(interface: &str, config: &CaptureConfig) -> Result<Self, DeviceError> {
        let device = interface::find_device(interface)?;
        debug!("Link layer addresses: {:?}", device.addresses);

        let open_error = |source| DeviceError::Open {
            interface: interface.to_string(),
            source,
        };
        let mut inactive = Capture::from_device(device)
            .map_err(open_error)?
            .promisc(config.promiscuous)
            .snaplen(config.snapshot_length)
            .timeout(config.read_timeout_ms)
            .immediate_mode(true);
        if config.buffer_size > 0 {
            inactive = inactive.buffer_size(config.buffer_size);
        }
        let mut capture = inactive.open().map_err(open_error)?;

        match capture.list_datalinks() {
            Ok(datalinks) => debug!("Datalinks: {:?}", datalinks),
            Err(e) => debug!("Cannot list datalinks on {}: {}", interface, e),
        }
        let datalink = capture.get_datalink();
        if datalink != Linktype::ETHERNET {
            warn!(
                "{} uses datalink {:?}, frames will not decode as Ethernet",
                interface, datalink
            );
        }

        info!(
            "Capturing on {} (snaplen {}, promiscuous {}, timeout {} ms)",
            interface, config.snapshot_length, config.promiscuous, config.read_timeout_ms
        );
        Ok(LiveSource {
            interface: interface.to_string(),
            capture: Some(capture),
        })
    }
}

impl CaptureSource for LiveSource {
    fn next_record(&mut self) -> Result<NextRecord, DeviceError> {
        let Some(capture) = self.capture.as_mut() else {
            return Ok(NextRecord::EndOfCapture);
        };
        match capture.next_packet() {
            Ok(packet) => Ok(NextRecord::Record(RecordCodec.decode(packet))),
            Err(pcap::Error::TimeoutExpired) => Ok(NextRecord::Idle),
            Err(pcap::Error::NoMorePackets) => Ok(NextRecord::EndOfCapture),
            Err(e) => Err(DeviceError::Read(e)),
        }
    }

    fn device_stats(&mut self) -> Option<DeviceStats> {
        let capture = self.capture.as_mut()?;
        match capture.stats() {
            Ok(stat) => Some(stat.into()),
            Err(e) => {
                debug!("Cannot read device stats on {}: {}", self.interface, e);
                None
            }
        }
    }

    fn close(&mut self) {
        if self.capture.take().is_some() {
            debug!("Closed capture on {}", self.interface);
        }
    }
}

/// Opens [`LiveSource`]s through libpcap.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveDevice;

impl SourceOpener for LiveDevice {
    fn open(
        &self,
        interface: &str,
        config: &CaptureConfig,
    ) -> Result<Box<dyn CaptureSource>, DeviceError> {
        Ok(Box::new(LiveSource::open(interface, config)?))
    }
}
