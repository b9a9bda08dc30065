//! Facts about the local device that the transfer engine advertises.
//!
//! The engine only sees the [`DeviceInfo`] trait; [`HostDevice`] reads the
//! real machine and [`FixedDevice`] carries preset values.

mod host;

use std::net::Ipv4Addr;

use lanshare_protocol::Platform;

pub use host::{HostDevice, detect_platform, get_hostname, get_local_ipv4s};

/// Local device collaborator injected into the server and client.
pub trait DeviceInfo: Send + Sync {
    /// Name shown to peers (probe replies, transfer requests).
    fn display_name(&self) -> String;

    fn platform(&self) -> Platform;

    /// Address written into outgoing fixed headers.
    fn local_ipv4(&self) -> Ipv4Addr;
}

/// A device with preset values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedDevice {
    pub display_name: String,
    pub platform: Platform,
    pub ip: Ipv4Addr,
}

impl FixedDevice {
    pub fn new(display_name: impl Into<String>, platform: Platform, ip: Ipv4Addr) -> Self {
        Self {
            display_name: display_name.into(),
            platform,
            ip,
        }
    }
}

impl DeviceInfo for FixedDevice {
    fn display_name(&self) -> String {
        self.display_name.clone()
    }

    fn platform(&self) -> Platform {
        self.platform
    }

    fn local_ipv4(&self) -> Ipv4Addr {
        self.ip
    }
}
