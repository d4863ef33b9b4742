//! Read-mostly system diagnostics.
//!
//! Written only from the provisioning poll context; the portal reads it to
//! build `/state` and `/wifi/status` responses. Single-writer, so no lock.

use core::net::Ipv4Addr;

/// Snapshot of subsystem readiness and addressing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemStatus {
    /// Address of the setup access point (fixed once the AP is up).
    pub ap_ip: Ipv4Addr,
    /// Station address, present only while associated.
    pub sta_ip: Option<Ipv4Addr>,
    /// True while the station link is up.
    pub sta_connected: bool,
    /// WiFi driver initialised.
    pub wifi_ready: bool,
    /// mDNS advertisement active.
    pub mdns_ready: bool,
    /// Captive DNS responder active.
    pub dns_ready: bool,
}

impl Default for SystemStatus {
    fn default() -> Self {
        Self {
            ap_ip: Ipv4Addr::new(192, 168, 4, 1),
            sta_ip: None,
            sta_connected: false,
            wifi_ready: false,
            mdns_ready: false,
            dns_ready: false,
        }
    }
}

impl SystemStatus {
    /// Called when the station link comes up.
    pub fn station_up(&mut self, ip: Ipv4Addr) {
        self.sta_ip = Some(ip);
        self.sta_connected = true;
    }

    /// Called when the station link drops or an attempt fails.
    pub fn station_down(&mut self) {
        self.sta_ip = None;
        self.sta_connected = false;
    }
}
