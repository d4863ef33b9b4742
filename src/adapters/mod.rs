//! Platform adapters implementing the port traits.
//!
//! Each adapter carries an ESP-IDF backend gated on
//! `target_os = "espidf"` and a simulation backend for host builds,
//! so the whole crate compiles and tests on the development machine.

pub mod dns;
pub mod mdns;
pub mod nvs;
pub mod time;
pub mod wifi;

use core::net::Ipv4Addr;

use crate::app::ports::NameServicePort;

/// The two name-resolution services bundled behind one port: mDNS
/// advertisement and the captive-portal DNS responder.
pub struct NameServices {
    mdns: mdns::MdnsAdapter,
    dns: dns::CaptiveDns,
}

impl NameServices {
    pub fn new(hostname: heapless::String<24>, ap_ip: Ipv4Addr) -> Self {
        Self {
            mdns: mdns::MdnsAdapter::new(hostname),
            dns: dns::CaptiveDns::new(ap_ip),
        }
    }

    pub fn mdns_active(&self) -> bool {
        self.mdns.is_active()
    }

    pub fn dns_running(&self) -> bool {
        self.dns.is_running()
    }
}

impl NameServicePort for NameServices {
    fn restart_mdns(&mut self) {
        self.mdns.restart();
    }

    fn start_captive_dns(&mut self) {
        self.dns.start();
    }

    fn stop_captive_dns(&mut self) {
        self.dns.stop();
    }
}
