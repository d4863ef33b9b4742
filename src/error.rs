//! Unified error types for the VizBot firmware.
//!
//! Follows embedded best practice: a single `Error` enum that every subsystem
//! can convert into, keeping the top-level loop's error handling uniform.
//! Every failure in the coordination core is recovered locally — a dropped
//! side effect, a skipped cycle, or a state-machine transition — so these
//! types exist for logging and the control surface, never for unwinding.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Persistent storage operation failed.
    Storage(StorageError),
    /// Radio capability call failed.
    Radio(RadioError),
    /// A station connection attempt failed (classified).
    Connect(ConnectFailure),
    /// Primitive or peripheral initialisation failed at boot.
    Init(&'static str),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Radio(e) => write!(f, "radio: {e}"),
            Self::Connect(e) => write!(f, "connect: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error from the backend.
    IoError,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Radio errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    /// SSID empty, too long, or not printable ASCII.
    InvalidSsid,
    /// Password longer than the WPA2 limit.
    InvalidPassword,
    /// Driver rejected a scan request.
    ScanFailed,
    /// Driver rejected a mode switch or AP bring-up.
    ModeSwitchFailed,
}

impl fmt::Display for RadioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => write!(f, "password invalid (must be 0-63 bytes)"),
            Self::ScanFailed => write!(f, "scan request failed"),
            Self::ModeSwitchFailed => write!(f, "mode switch failed"),
        }
    }
}

impl From<RadioError> for Error {
    fn from(e: RadioError) -> Self {
        Self::Radio(e)
    }
}

// ---------------------------------------------------------------------------
// Connection failure classification
// ---------------------------------------------------------------------------

/// Why a station connection attempt failed.
///
/// The classification is surfaced verbatim in the `/wifi/status` JSON, so
/// the display strings are part of the control-surface contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectFailure {
    /// No access point with the requested SSID was seen.
    NetworkNotFound,
    /// The access point rejected authentication (bad password or handshake).
    AuthRejected,
    /// No definitive status within the connect timeout.
    TimedOut,
}

impl ConnectFailure {
    /// The user-facing reason string.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NetworkNotFound => "Network not found",
            Self::AuthRejected => "Authentication rejected",
            Self::TimedOut => "Connection timed out",
        }
    }
}

impl fmt::Display for ConnectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ConnectFailure> for Error {
    fn from(e: ConnectFailure) -> Self {
        Self::Connect(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
