//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`StoragePort`] for the credential record and [`ConfigPort`]
//! for the system configuration blob (postcard-encoded).
//!
//! - Namespace isolation: credentials live in `wifi`, config in `sys`.
//! - Atomic writes: ESP-IDF NVS commits are atomic per `nvs_commit()`.
//! - The simulation backend is an in-memory map for host tests.

use log::{info, warn};

use crate::app::ports::{ConfigPort, StoragePort};
use crate::config::{BRIGHTNESS_MAX, BRIGHTNESS_MIN, SystemConfig};
use crate::error::{Error, StorageError};

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const CONFIG_NAMESPACE: &str = "sys";
const CONFIG_KEY: &str = "syscfg";
#[allow(dead_code)]
const MAX_BLOB_SIZE: usize = 1024;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: std::cell::RefCell<HashMap<String, Vec<u8>>>,
}

impl NvsAdapter {
    /// Create the adapter and initialise NVS flash.
    ///
    /// On first boot or after an NVS version bump the partition is
    /// erased and re-initialised automatically.
    pub fn new() -> crate::error::Result<Self> {
        #[cfg(target_os = "espidf")]
        {
            // Called from the main task before any concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(Error::Init("nvs_flash_erase failed"));
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(Error::Init("nvs_flash_init failed"));
                }
            } else if ret != ESP_OK {
                return Err(Error::Init("nvs_flash_init failed"));
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
        }

        #[cfg(not(target_os = "espidf"))]
        info!("NvsAdapter: simulation backend");

        Ok(Self {
            #[cfg(not(target_os = "espidf"))]
            store: std::cell::RefCell::new(HashMap::new()),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    /// Open an NVS namespace, run a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let mut ns_buf = [0u8; 16];
        let ns_bytes = namespace.as_bytes();
        let len = ns_bytes.len().min(15);
        ns_buf[..len].copy_from_slice(&ns_bytes[..len]);

        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        let ret = unsafe { nvs_open(ns_buf.as_ptr() as *const _, mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        unsafe {
            nvs_close(handle);
        }
        result
    }

    #[cfg(target_os = "espidf")]
    fn key_buf(key: &str) -> [u8; 16] {
        let mut buf = [0u8; 16];
        let kb = key.as_bytes();
        let kl = kb.len().min(15);
        buf[..kl].copy_from_slice(&kb[..kl]);
        buf
    }
}

fn validate_config(cfg: &SystemConfig) -> Result<(), Error> {
    if cfg.ap_ssid.is_empty() {
        return Err(Error::Config("ap_ssid must not be empty"));
    }
    if cfg.ap_password.len() < 8 {
        return Err(Error::Config("ap_password must be >= 8 chars (WPA2)"));
    }
    if cfg.hostname.is_empty() {
        return Err(Error::Config("hostname must not be empty"));
    }
    if !(BRIGHTNESS_MIN..=BRIGHTNESS_MAX).contains(&cfg.brightness_default) {
        return Err(Error::Config("brightness_default must be 1–50"));
    }
    if !(5..=1000).contains(&cfg.frame_interval_ms) {
        return Err(Error::Config("frame_interval_ms must be 5–1000"));
    }
    if !(1000..=60_000).contains(&cfg.connect_timeout_ms) {
        return Err(Error::Config("connect_timeout_ms must be 1000–60000"));
    }
    if cfg.ap_linger_ms < cfg.connect_timeout_ms {
        return Err(Error::Config("ap_linger_ms must be >= connect_timeout_ms"));
    }
    if !(1..=1000).contains(&cfg.bus_timeout_ms) {
        return Err(Error::Config("bus_timeout_ms must be 1–1000"));
    }
    Ok(())
}

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<SystemConfig, Error> {
        #[cfg(not(target_os = "espidf"))]
        {
            let key = Self::composite_key(CONFIG_NAMESPACE, CONFIG_KEY);
            if let Some(bytes) = self.store.borrow().get(&key) {
                match postcard::from_bytes(bytes) {
                    Ok(cfg) => {
                        info!("NvsAdapter: loaded config from store");
                        Ok(cfg)
                    }
                    Err(_) => {
                        warn!("NvsAdapter: stored config corrupted, using defaults");
                        Ok(SystemConfig::default())
                    }
                }
            } else {
                info!("NvsAdapter: no stored config, using defaults");
                Ok(SystemConfig::default())
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(CONFIG_NAMESPACE, false, |handle| {
                let key = Self::key_buf(CONFIG_KEY);
                let mut size: usize = 0;

                // First call sizes the blob.
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key.as_ptr() as *const _,
                        core::ptr::null_mut(),
                        &mut size,
                    )
                };
                if ret != ESP_OK || size == 0 || size > MAX_BLOB_SIZE {
                    return Err(ret);
                }

                let mut buf = vec![0u8; size];
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(buf)
            });

            match result {
                Ok(bytes) => match postcard::from_bytes(&bytes) {
                    Ok(cfg) => {
                        info!("NvsAdapter: loaded config from NVS ({} bytes)", bytes.len());
                        Ok(cfg)
                    }
                    Err(_) => {
                        warn!("NvsAdapter: stored config corrupted, using defaults");
                        Ok(SystemConfig::default())
                    }
                },
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => {
                    info!("NvsAdapter: no stored config, using defaults");
                    Ok(SystemConfig::default())
                }
                Err(e) => {
                    warn!("NvsAdapter: NVS read error {}, using defaults", e);
                    Ok(SystemConfig::default())
                }
            }
        }
    }

    fn save(&self, config: &SystemConfig) -> Result<(), Error> {
        validate_config(config)?;

        #[cfg(not(target_os = "espidf"))]
        {
            let key = Self::composite_key(CONFIG_NAMESPACE, CONFIG_KEY);
            let bytes =
                postcard::to_allocvec(config).map_err(|_| Error::Config("encode failed"))?;
            self.store.borrow_mut().insert(key, bytes);
            info!("NvsAdapter: config saved (simulation)");
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let bytes =
                postcard::to_allocvec(config).map_err(|_| Error::Config("encode failed"))?;
            let result = Self::with_nvs_handle(CONFIG_NAMESPACE, true, |handle| {
                let key = Self::key_buf(CONFIG_KEY);
                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        key.as_ptr() as *const _,
                        bytes.as_ptr() as *const _,
                        bytes.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            match result {
                Ok(()) => {
                    info!("NvsAdapter: config saved to NVS ({} bytes)", bytes.len());
                    Ok(())
                }
                Err(e) => {
                    warn!("NvsAdapter: NVS write error {}", e);
                    Err(Error::Storage(StorageError::IoError))
                }
            }
        }
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            match self.store.borrow().get(&composite) {
                Some(data) => {
                    let len = data.len().min(buf.len());
                    buf[..len].copy_from_slice(&data[..len]);
                    Ok(len)
                }
                None => Err(StorageError::NotFound),
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let key = Self::key_buf(key);
                let mut size = buf.len();
                let ret = unsafe {
                    nvs_get_blob(
                        handle,
                        key.as_ptr() as *const _,
                        buf.as_mut_ptr() as *mut _,
                        &mut size,
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(size)
            });
            match result {
                Ok(size) => Ok(size),
                Err(e) if e == ESP_ERR_NVS_NOT_FOUND => Err(StorageError::NotFound),
                Err(_) => Err(StorageError::IoError),
            }
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow_mut().insert(composite, data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let key = Self::key_buf(key);
                let ret = unsafe {
                    nvs_set_blob(
                        handle,
                        key.as_ptr() as *const _,
                        data.as_ptr() as *const _,
                        data.len(),
                    )
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|_| StorageError::IoError)
        }
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow_mut().remove(&composite);
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                let key = Self::key_buf(key);
                let ret = unsafe { nvs_erase_key(handle, key.as_ptr() as *const _) };
                if ret != ESP_OK && ret != ESP_ERR_NVS_NOT_FOUND {
                    return Err(ret);
                }
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(|_| StorageError::IoError)
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        #[cfg(not(target_os = "espidf"))]
        {
            let composite = Self::composite_key(namespace, key);
            self.store.borrow().contains_key(&composite)
        }

        #[cfg(target_os = "espidf")]
        {
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let key = Self::key_buf(key);
                let ret = unsafe {
                    nvs_find_key(handle, key.as_ptr() as *const _, core::ptr::null_mut())
                };
                Ok(ret == ESP_OK)
            });
            result.unwrap_or(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_passes_validation() {
        assert!(validate_config(&SystemConfig::default()).is_ok());
    }

    #[test]
    fn rejects_short_ap_password() {
        let cfg = SystemConfig {
            ap_password: heapless::String::try_from("short").unwrap(),
            ..Default::default()
        };
        assert!(matches!(validate_config(&cfg), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_out_of_range_brightness() {
        let cfg = SystemConfig {
            brightness_default: 0,
            ..Default::default()
        };
        assert!(matches!(validate_config(&cfg), Err(Error::Config(_))));
    }

    #[test]
    fn rejects_linger_shorter_than_timeout() {
        let cfg = SystemConfig {
            ap_linger_ms: 1000,
            connect_timeout_ms: 15_000,
            ..Default::default()
        };
        assert!(matches!(validate_config(&cfg), Err(Error::Config(_))));
    }

    #[test]
    fn config_round_trip() {
        let nvs = NvsAdapter::new().unwrap();
        let mut cfg = SystemConfig::default();
        cfg.brightness_default = 30;
        nvs.save(&cfg).unwrap();

        let loaded = nvs.load().unwrap();
        assert_eq!(loaded.brightness_default, 30);
    }

    #[test]
    fn load_without_save_yields_defaults() {
        let nvs = NvsAdapter::new().unwrap();
        let cfg = nvs.load().unwrap();
        assert_eq!(cfg.brightness_default, SystemConfig::default().brightness_default);
    }

    #[test]
    fn storage_round_trip() {
        let mut nvs = NvsAdapter::new().unwrap();
        nvs.write("test_ns", "greeting", b"hello NVS").unwrap();
        assert!(nvs.exists("test_ns", "greeting"));

        let mut buf = [0u8; 64];
        let len = nvs.read("test_ns", "greeting", &mut buf).unwrap();
        assert_eq!(&buf[..len], b"hello NVS");

        nvs.delete("test_ns", "greeting").unwrap();
        assert!(!nvs.exists("test_ns", "greeting"));
    }

    #[test]
    fn storage_read_missing_key() {
        let nvs = NvsAdapter::new().unwrap();
        let mut buf = [0u8; 64];
        assert!(matches!(
            nvs.read("ns", "nope", &mut buf),
            Err(StorageError::NotFound)
        ));
    }

    #[test]
    fn namespace_isolation() {
        let mut nvs = NvsAdapter::new().unwrap();
        nvs.write("ns_a", "key", b"alpha").unwrap();
        nvs.write("ns_b", "key", b"bravo").unwrap();

        let mut buf = [0u8; 64];
        let len = nvs.read("ns_a", "key", &mut buf).unwrap();
        assert_eq!(&buf[..len], b"alpha");
        let len = nvs.read("ns_b", "key", &mut buf).unwrap();
        assert_eq!(&buf[..len], b"bravo");
    }
}
