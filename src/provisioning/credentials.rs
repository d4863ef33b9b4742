//! Durable WiFi credential record.
//!
//! One record per device, in the `wifi` storage namespace under the keys
//! `ssid`, `pass` and `verified`. The verified flag gates boot-time
//! auto-connect: credentials are written unverified the moment a connect
//! request arrives, promoted once a connection is confirmed, and cleared
//! on confirmed failure or reset. An unverified record is therefore never
//! auto-retried after a crash mid-attempt.

use log::{info, warn};

use crate::app::ports::StoragePort;
use crate::error::StorageError;

pub const NAMESPACE: &str = "wifi";
const KEY_SSID: &str = "ssid";
const KEY_PASS: &str = "pass";
const KEY_VERIFIED: &str = "verified";

/// A saved network name and secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub ssid: heapless::String<32>,
    pub pass: heapless::String<63>,
}

/// Persist a credential pair with `verified = false`.
pub fn save_unverified<S: StoragePort>(
    store: &mut S,
    ssid: &str,
    pass: &str,
) -> Result<(), StorageError> {
    store.write(NAMESPACE, KEY_SSID, ssid.as_bytes())?;
    store.write(NAMESPACE, KEY_PASS, pass.as_bytes())?;
    store.write(NAMESPACE, KEY_VERIFIED, &[0])?;
    Ok(())
}

/// Promote the stored record to verified.
pub fn mark_verified<S: StoragePort>(store: &mut S) -> Result<(), StorageError> {
    store.write(NAMESPACE, KEY_VERIFIED, &[1])?;
    info!("credentials marked verified");
    Ok(())
}

/// Remove the record entirely.
pub fn clear<S: StoragePort>(store: &mut S) -> Result<(), StorageError> {
    store.delete(NAMESPACE, KEY_SSID)?;
    store.delete(NAMESPACE, KEY_PASS)?;
    store.delete(NAMESPACE, KEY_VERIFIED)?;
    Ok(())
}

/// True when a verified record exists.
pub fn has_verified<S: StoragePort>(store: &S) -> bool {
    let mut flag = [0u8; 1];
    matches!(store.read(NAMESPACE, KEY_VERIFIED, &mut flag), Ok(1) if flag[0] == 1)
}

/// Load the saved record, but only when it is verified. An unverified or
/// partially written record reads as "no usable saved network".
pub fn load_verified<S: StoragePort>(store: &S) -> Option<Credentials> {
    if !has_verified(store) {
        return None;
    }

    let mut ssid_buf = [0u8; 32];
    let mut pass_buf = [0u8; 63];
    let ssid_len = match store.read(NAMESPACE, KEY_SSID, &mut ssid_buf) {
        Ok(n) => n,
        Err(e) => {
            warn!("verified flag set but ssid unreadable: {e}");
            return None;
        }
    };
    let pass_len = store.read(NAMESPACE, KEY_PASS, &mut pass_buf).unwrap_or(0);

    let ssid = core::str::from_utf8(&ssid_buf[..ssid_len]).ok()?;
    let pass = core::str::from_utf8(&pass_buf[..pass_len]).ok()?;
    if ssid.is_empty() {
        return None;
    }

    let mut record = Credentials {
        ssid: heapless::String::new(),
        pass: heapless::String::new(),
    };
    record.ssid.push_str(ssid).ok()?;
    record.pass.push_str(pass).ok()?;
    Some(record)
}
