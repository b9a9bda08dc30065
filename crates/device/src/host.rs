use std::net::{IpAddr, Ipv4Addr};

use lanshare_protocol::Platform;

use crate::DeviceInfo;

/// The machine this process runs on.
///
/// Values are looked up on every call, so a hostname change or a new
/// network interface is picked up without restarting.
#[derive(Debug, Clone, Default)]
pub struct HostDevice {
    name_override: Option<String>,
}

impl HostDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `name` instead of the hostname when it is non-empty.
    pub fn with_name(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            name_override: (!name.trim().is_empty()).then_some(name),
        }
    }
}

impl DeviceInfo for HostDevice {
    fn display_name(&self) -> String {
        self.name_override.clone().unwrap_or_else(get_hostname)
    }

    fn platform(&self) -> Platform {
        detect_platform()
    }

    fn local_ipv4(&self) -> Ipv4Addr {
        match get_local_ipv4s().first() {
            Some(ip) => *ip,
            None => {
                tracing::debug!("no non-loopback IPv4 interface, advertising 0.0.0.0");
                Ipv4Addr::UNSPECIFIED
            }
        }
    }
}

/// Platform this binary was compiled for.
pub fn detect_platform() -> Platform {
    if cfg!(target_os = "android") {
        Platform::Android
    } else if cfg!(target_os = "ios") {
        Platform::Ios
    } else if cfg!(target_os = "linux") {
        Platform::Linux
    } else if cfg!(target_os = "macos") {
        Platform::Macos
    } else if cfg!(target_os = "windows") {
        Platform::Windows
    } else {
        Platform::Unknown
    }
}

/// Short hostname, without any `.local` suffix.
pub fn get_hostname() -> String {
    let name = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".into());
    let name = name.trim_end_matches('.');
    name.strip_suffix(".local").unwrap_or(name).to_string()
}

/// Local non-loopback IPv4 addresses, excluding link-local (169.254.x.x).
pub fn get_local_ipv4s() -> Vec<Ipv4Addr> {
    let interfaces = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            tracing::warn!(error = %e, "failed to list network interfaces");
            return Vec::new();
        }
    };

    interfaces
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .filter_map(|iface| match iface.ip() {
            IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_link_local() => Some(ip),
            _ => None,
        })
        .collect()
}
