//! Interface metadata for diagnostics. Nothing here influences decoding.

use std::net::{IpAddr, Ipv4Addr};

use log::debug;
use pnet::datalink::{self, NetworkInterface};

use crate::error::DeviceError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAddress {
    pub address: IpAddr,
    /// IPv4 only; IPv6 has no broadcast.
    pub broadcast: Option<IpAddr>,
    pub prefix_length: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterfaceFlags {
    pub up: bool,
    pub multicast: bool,
    pub point_to_point: bool,
    pub loopback: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub name: String,
    pub display_name: String,
    pub addresses: Vec<InterfaceAddress>,
    pub hardware_address: Option<String>,
    pub flags: InterfaceFlags,
    pub sub_interfaces: Vec<String>,
}

impl InterfaceInfo {
    fn from_datalink(iface: &NetworkInterface, all: &[NetworkInterface]) -> Self {
        let addresses = iface
            .ips
            .iter()
            .map(|net| InterfaceAddress {
                address: net.ip(),
                broadcast: broadcast_for(net.ip(), net.mask()),
                prefix_length: net.prefix(),
            })
            .collect();
        let display_name = if iface.description.is_empty() {
            iface.name.clone()
        } else {
            iface.description.clone()
        };
        InterfaceInfo {
            name: iface.name.clone(),
            display_name,
            addresses,
            hardware_address: iface.mac.map(|mac| mac.to_string()),
            flags: InterfaceFlags {
                up: iface.is_up(),
                multicast: iface.is_multicast(),
                point_to_point: iface.is_point_to_point(),
                loopback: iface.is_loopback(),
            },
            sub_interfaces: all
                .iter()
                .filter(|other| is_sub_interface(&iface.name, &other.name))
                .map(|other| other.name.clone())
                .collect(),
        }
    }

    pub fn log_summary(&self) {
        debug!("Name: {}", self.name);
        debug!("Display name: {}", self.display_name);
        debug!("Interface addresses:");
        for address in &self.addresses {
            debug!("  Interface address: {}", address.address);
            match address.broadcast {
                Some(broadcast) => debug!("  Broadcast address: {}", broadcast),
                None => debug!("  Broadcast address: none"),
            }
            debug!("  Network prefix length: {}", address.prefix_length);
        }
        debug!(
            "Hardware address: {}",
            self.hardware_address.as_deref().unwrap_or("none")
        );
        debug!("Supports multicast: {}", self.flags.multicast);
        debug!("Is point-to-point: {}", self.flags.point_to_point);
        debug!("Up: {}", self.flags.up);
        for sub in &self.sub_interfaces {
            debug!("Sub interface: {}", sub);
        }
    }
}

/// Looks up OS metadata for `name`.
pub fn lookup(name: &str) -> Result<InterfaceInfo, DeviceError> {
    let all = datalink::interfaces();
    all.iter()
        .find(|iface| iface.name == name)
        .map(|iface| InterfaceInfo::from_datalink(iface, &all))
        .ok_or_else(|| DeviceError::NotFound(name.to_string()))
}

/// Finds the libpcap device called `name`.
pub fn find_device(name: &str) -> Result<pcap::Device, DeviceError> {
    pcap::Device::list()
        .map_err(DeviceError::Lookup)?
        .into_iter()
        .find(|d| d.name == name)
        .ok_or_else(|| DeviceError::NotFound(name.to_string()))
}

fn broadcast_for(address: IpAddr, mask: IpAddr) -> Option<IpAddr> {
    match (address, mask) {
        (IpAddr::V4(address), IpAddr::V4(mask)) => {
            let bits = u32::from(address) | !u32::from(mask);
            Some(IpAddr::V4(Ipv4Addr::from(bits)))
        }
        _ => None,
    }
}

/// Alias (`eth0:1`) and VLAN (`eth0.100`) interfaces belong to their parent.
fn is_sub_interface(parent: &str, candidate: &str) -> bool {
    candidate
        .strip_prefix(parent)
        .and_then(|rest| rest.strip_prefix(':').or_else(|| rest.strip_prefix('.')))
        .map_or(false, |suffix| !suffix.is_empty())
}
