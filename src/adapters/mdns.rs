//! mDNS advertisement adapter.
//!
//! Advertises `_http._tcp` on port 80 under the device hostname so the
//! control page is reachable as `<hostname>.local`. Uses the ESP-IDF
//! mDNS component on device and logs only on simulation targets.
//!
//! Restarted whenever the active interface changes (station connect,
//! reset back to AP).

use log::info;

const MDNS_SERVICE_TYPE: &str = "_http";
#[allow(dead_code)]
const MDNS_SERVICE_PROTO: &str = "_tcp";
const MDNS_SERVICE_PORT: u16 = 80;

pub struct MdnsAdapter {
    hostname: heapless::String<24>,
    active: bool,
}

impl MdnsAdapter {
    pub fn new(hostname: heapless::String<24>) -> Self {
        Self {
            hostname,
            active: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Start advertising. Idempotent.
    pub fn start(&mut self) {
        if self.active {
            return;
        }
        self.platform_start();
        self.active = true;
        info!(
            "mDNS: advertising {}.local → {}:{}",
            self.hostname, MDNS_SERVICE_TYPE, MDNS_SERVICE_PORT
        );
    }

    /// Stop advertising. Idempotent.
    pub fn stop(&mut self) {
        if !self.active {
            return;
        }
        self.platform_stop();
        self.active = false;
        info!("mDNS: stopped");
    }

    /// Re-home the advertisement onto the currently active interface.
    pub fn restart(&mut self) {
        self.stop();
        self.start();
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_start(&self) {
        use esp_idf_svc::sys::*;
        unsafe {
            let ret = mdns_init();
            if ret != ESP_OK {
                log::error!("mDNS: mdns_init failed ({})", ret);
                return;
            }

            let mut hostname_buf = [0u8; 32];
            let hb = self.hostname.as_bytes();
            let hl = hb.len().min(31);
            hostname_buf[..hl].copy_from_slice(&hb[..hl]);
            mdns_hostname_set(hostname_buf.as_ptr() as *const _);
            mdns_instance_name_set(b"VizBot\0".as_ptr() as *const _);

            mdns_service_add(
                b"VizBot\0".as_ptr() as *const _,
                b"_http\0".as_ptr() as *const _,
                b"_tcp\0".as_ptr() as *const _,
                MDNS_SERVICE_PORT,
                core::ptr::null_mut(),
                0,
            );
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start(&self) {
        info!(
            "mDNS(sim): registered {}.local {}:{}",
            self.hostname, MDNS_SERVICE_TYPE, MDNS_SERVICE_PORT
        );
    }

    #[cfg(target_os = "espidf")]
    fn platform_stop(&self) {
        unsafe {
            esp_idf_svc::sys::mdns_free();
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_stop(&self) {
        info!("mDNS(sim): unregistered");
    }
}
