//! Port traits — the hexagonal boundary between the coordination core and
//! the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Provisioner / render loop (domain)
//! ```
//!
//! Driven adapters (radio, NVS, mDNS/DNS, display driver, clock) implement
//! these traits. The provisioning state machine and the command consumer
//! take them via generics, so the core never touches hardware directly and
//! every multi-step protocol is testable with fakes.

use core::net::Ipv4Addr;

use crate::config::{MAX_SCAN_RESULTS, SystemConfig};
use crate::error::{RadioError, StorageError};

// ───────────────────────────────────────────────────────────────
// Radio control port (driven adapter: domain → WiFi driver)
// ───────────────────────────────────────────────────────────────

/// Interface operating mode of the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioMode {
    /// Setup access point only.
    ApOnly,
    /// Access point kept alive while a station attempt runs.
    ApSta,
}

/// Observable state of the station link.
///
/// `NoApFound` and `AuthFailed` are kept distinct from a generic stall
/// because the failure classification is surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    NoApFound,
    AuthFailed,
}

/// One network seen by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub ssid: heapless::String<32>,
    pub rssi: i8,
    /// True when no password is required.
    pub open: bool,
}

/// Progress of an asynchronous scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanStatus {
    /// No scan was requested.
    Idle,
    /// Scan still running.
    Running,
    /// Scan finished; results are capped at [`MAX_SCAN_RESULTS`].
    Done(heapless::Vec<NetworkInfo, MAX_SCAN_RESULTS>),
    /// Driver reported a scan error (treated as zero results upstream).
    Failed,
}

/// Control port over the WiFi driver.
///
/// Mode switches are explicit, ordered steps rather than one opaque
/// "connect" call: the provisioning state machine owns the sequence
/// (disconnect → AP+STA → AP re-establish → station begin) and a fake
/// radio can record and replay it deterministically.
pub trait RadioPort {
    /// Drop any station association. Idempotent.
    fn disconnect(&mut self);

    /// Switch the interface operating mode. A mode switch drops the
    /// access point; callers must re-establish it afterwards.
    fn set_mode(&mut self, mode: RadioMode);

    /// Bring up the setup access point.
    fn start_access_point(&mut self, ssid: &str, password: &str) -> Result<(), RadioError>;

    /// Tear down the access point (station link, if any, survives).
    fn stop_access_point(&mut self);

    /// Start a station association attempt. Non-blocking; progress is
    /// observed via [`link_state`](Self::link_state).
    fn begin_station(&mut self, ssid: &str, password: &str) -> Result<(), RadioError>;

    /// Start an asynchronous network scan.
    fn start_scan(&mut self) -> Result<(), RadioError>;

    /// Check scan progress. `Done` results are consumed by the call.
    fn poll_scan(&mut self) -> ScanStatus;

    /// Current station link state.
    fn link_state(&self) -> LinkState;

    /// Station interface address once connected.
    fn sta_ip(&self) -> Option<Ipv4Addr>;

    /// Address of the setup access point interface.
    fn ap_ip(&self) -> Ipv4Addr;
}

// ───────────────────────────────────────────────────────────────
// Name resolution port (driven adapter: domain → mDNS + captive DNS)
// ───────────────────────────────────────────────────────────────

/// Local name resolution control: mDNS advertisement and the wildcard
/// captive-portal DNS responder.
pub trait NameServicePort {
    /// Re-home mDNS onto the currently active interface (stop + start).
    fn restart_mdns(&mut self);

    /// Start the wildcard DNS responder on the access-point interface.
    fn start_captive_dns(&mut self);

    /// Stop the wildcard DNS responder.
    fn stop_captive_dns(&mut self);
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage for credentials and config blobs.
///
/// - Keys are namespaced to prevent collisions between subsystems.
/// - Write operations MUST be atomic — no partial writes on power loss.
///   The ESP-IDF NVS API guarantees this natively; the in-memory
///   simulation achieves it trivially.
pub trait StoragePort {
    /// Read a value. Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key. Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists system configuration.
///
/// Implementations MUST validate before persisting; invalid ranges are
/// rejected rather than silently clamped.
pub trait ConfigPort {
    /// Load configuration, falling back to [`SystemConfig::default`] when
    /// nothing is stored.
    fn load(&self) -> Result<SystemConfig, crate::error::Error>;

    /// Validate and persist configuration.
    fn save(&self, config: &SystemConfig) -> Result<(), crate::error::Error>;
}

// ───────────────────────────────────────────────────────────────
// Display port (driven adapter: domain → LED output driver)
// ───────────────────────────────────────────────────────────────

/// The slice of the output driver the command consumer needs: brightness
/// is pushed immediately, everything else is read from
/// [`RenderState`](crate::render::RenderState) by the renderer each frame.
pub trait DisplayPort {
    fn set_brightness(&mut self, level: u8);
}

// ───────────────────────────────────────────────────────────────
// Clock port (driven adapter: domain → monotonic time)
// ───────────────────────────────────────────────────────────────

/// Monotonic time source, injectable so timeout and linger logic can be
/// tested without sleeping.
pub trait ClockPort {
    /// Milliseconds since boot.
    fn now_ms(&self) -> u64;

    /// Block the calling context. Only the boot-time auto-connect path
    /// uses this; everything else must stay non-blocking.
    fn delay_ms(&self, ms: u32);
}
