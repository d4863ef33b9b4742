//! System configuration parameters
//!
//! All tunable parameters for the VizBot device. Values can be overridden
//! via NVS; the compiled-in defaults match the shipped hardware.

use serde::{Deserialize, Serialize};

/// Depth of the render command queue. Commands beyond this are dropped
/// (the next control-surface write supersedes them).
pub const CMD_QUEUE_DEPTH: usize = 8;

/// Maximum networks kept from one scan.
pub const MAX_SCAN_RESULTS: usize = 15;

/// Number of face expressions the renderer knows.
pub const NUM_EXPRESSIONS: u8 = 20;

/// Number of background rendering styles.
pub const NUM_BG_STYLES: u8 = 5;

/// Inclusive brightness range accepted by the output driver.
pub const BRIGHTNESS_MIN: u8 = 1;
pub const BRIGHTNESS_MAX: u8 = 50;

/// Inclusive say-text duration range (ms) and the default when unspecified.
pub const SAY_DURATION_MIN_MS: u16 = 1000;
pub const SAY_DURATION_MAX_MS: u16 = 10_000;
pub const SAY_DURATION_DEFAULT_MS: u16 = 4000;

/// RGB565 face colours selectable from the control page:
/// white, cyan, green, pink, yellow.
pub const FACE_PALETTE: [u16; 5] = [0xFFFF, 0x07FF, 0x07E0, 0xF81F, 0xFFE0];

/// Core system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    // --- Identity ---
    /// SSID of the device's own setup access point.
    pub ap_ssid: heapless::String<32>,
    /// Password of the setup access point (WPA2; >= 8 chars).
    pub ap_password: heapless::String<63>,
    /// mDNS hostname (`<hostname>.local`).
    pub hostname: heapless::String<24>,

    // --- Rendering ---
    /// Startup brightness level.
    pub brightness_default: u8,
    /// Render loop frame interval (milliseconds).
    pub frame_interval_ms: u32,

    // --- WiFi provisioning ---
    /// Station connect attempt timeout (milliseconds).
    pub connect_timeout_ms: u32,
    /// How long the AP stays up after a successful station connect.
    pub ap_linger_ms: u32,

    // --- Shared bus ---
    /// Bus mutex acquisition timeout (milliseconds). Short so a stuck
    /// transaction cannot stall the render loop.
    pub bus_timeout_ms: u32,
}

impl Default for SystemConfig {
    fn default() -> Self {
        let mut ap_ssid = heapless::String::new();
        ap_ssid.push_str("VizBot-Setup").ok();
        let mut ap_password = heapless::String::new();
        ap_password.push_str("vizbot123").ok();
        let mut hostname = heapless::String::new();
        hostname.push_str("vizbot").ok();

        Self {
            ap_ssid,
            ap_password,
            hostname,

            brightness_default: 15,
            frame_interval_ms: 20, // 50 fps

            connect_timeout_ms: 15_000,
            ap_linger_ms: 120_000, // 2 min for the phone to observe success

            bus_timeout_ms: 50,
        }
    }
}
