//! Timeout-bounded mutual exclusion for the shared sensor bus.
//!
//! Two concurrent contexts (render loop and sensor poller) share one I2C
//! bus. Acquisition is always bounded: a caller that cannot get the bus
//! within its timeout skips the cycle instead of stalling the frame clock.
//!
//! If the underlying primitive cannot be created at boot, the mutex fails
//! open: every acquire succeeds immediately. The device keeps rendering
//! with a small risk of interleaved bus transactions rather than bricking.

use log::warn;

/// Default acquisition timeout used by sensor reads.
pub const BUS_TIMEOUT_DEFAULT_MS: u32 = 50;

/// Bounded, non-reentrant mutex over the shared bus.
///
/// Not reentrant: a context that acquires twice without releasing will
/// deadlock until its timeout expires.
pub struct BusMutex {
    inner: Option<backend::RawMutex>,
}

impl BusMutex {
    /// Create the mutex. On creation failure the instance is fail-open
    /// and a warning is logged once.
    pub fn new() -> Self {
        let inner = backend::RawMutex::new();
        if inner.is_none() {
            warn!("bus mutex creation failed; running fail-open");
        }
        Self { inner }
    }

    /// Try to acquire the bus, waiting at most `timeout_ms`.
    ///
    /// Returns `true` on acquisition (caller must [`release`](Self::release))
    /// and `false` on timeout. Fail-open instances always return `true`.
    pub fn acquire(&self, timeout_ms: u32) -> bool {
        match &self.inner {
            Some(raw) => raw.take(timeout_ms),
            None => true,
        }
    }

    /// Release the bus. Must only be called after a successful
    /// [`acquire`](Self::acquire); a release without a hold is ignored.
    pub fn release(&self) {
        if let Some(raw) = &self.inner {
            raw.give();
        }
    }

    /// True when the primitive failed to initialise and the mutex no
    /// longer provides exclusion.
    pub fn is_fail_open(&self) -> bool {
        self.inner.is_none()
    }
}

impl Default for BusMutex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "espidf")]
mod backend {
    use esp_idf_svc::sys::{
        QueueHandle_t, configTICK_RATE_HZ, queueQUEUE_TYPE_MUTEX, queueSEND_TO_BACK,
        xQueueCreateMutex, xQueueGenericSend, xQueueSemaphoreTake,
    };

    /// FreeRTOS mutex handle. The handle is only touched through the
    /// FreeRTOS API, which is safe to call from any task.
    pub struct RawMutex(QueueHandle_t);

    unsafe impl Send for RawMutex {}
    unsafe impl Sync for RawMutex {}

    impl RawMutex {
        pub fn new() -> Option<Self> {
            let handle = unsafe { xQueueCreateMutex(queueQUEUE_TYPE_MUTEX as u8) };
            if handle.is_null() {
                None
            } else {
                Some(Self(handle))
            }
        }

        pub fn take(&self, timeout_ms: u32) -> bool {
            let ticks = timeout_ms.saturating_mul(configTICK_RATE_HZ) / 1000;
            unsafe { xQueueSemaphoreTake(self.0, ticks) != 0 }
        }

        pub fn give(&self) {
            unsafe {
                xQueueGenericSend(self.0, core::ptr::null(), 0, queueSEND_TO_BACK as i32);
            }
        }
    }
}

#[cfg(not(target_os = "espidf"))]
mod backend {
    use std::sync::{Condvar, Mutex};
    use std::time::{Duration, Instant};

    /// Host simulation: a boolean guarded by a mutex and condvar, with
    /// the same bounded-wait semantics as the FreeRTOS primitive.
    pub struct RawMutex {
        held: Mutex<bool>,
        freed: Condvar,
    }

    impl RawMutex {
        pub fn new() -> Option<Self> {
            Some(Self {
                held: Mutex::new(false),
                freed: Condvar::new(),
            })
        }

        pub fn take(&self, timeout_ms: u32) -> bool {
            let deadline = Instant::now() + Duration::from_millis(u64::from(timeout_ms));
            let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
            while *held {
                let now = Instant::now();
                if now >= deadline {
                    return false;
                }
                let (guard, timed_out) = self
                    .freed
                    .wait_timeout(held, deadline - now)
                    .unwrap_or_else(|e| e.into_inner());
                held = guard;
                if timed_out.timed_out() && *held {
                    return false;
                }
            }
            *held = true;
            true
        }

        pub fn give(&self) {
            let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
            *held = false;
            self.freed.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[test]
    fn acquire_and_release() {
        let bus = BusMutex::new();
        assert!(bus.acquire(10));
        bus.release();
        assert!(bus.acquire(10));
        bus.release();
    }

    #[test]
    fn contended_acquire_times_out() {
        let bus = BusMutex::new();
        assert!(bus.acquire(10));

        let start = Instant::now();
        assert!(!bus.acquire(30));
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(25), "waited {waited:?}");
        // Bounded: nowhere near an unbounded block.
        assert!(waited < Duration::from_millis(500), "waited {waited:?}");

        bus.release();
        assert!(bus.acquire(10));
        bus.release();
    }

    #[test]
    fn release_wakes_a_waiter() {
        let bus = Arc::new(BusMutex::new());
        assert!(bus.acquire(10));

        let waiter = {
            let bus = Arc::clone(&bus);
            std::thread::spawn(move || {
                let ok = bus.acquire(1000);
                if ok {
                    bus.release();
                }
                ok
            })
        };

        std::thread::sleep(Duration::from_millis(20));
        bus.release();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn fail_open_never_blocks() {
        let bus = BusMutex { inner: None };
        assert!(bus.is_fail_open());
        assert!(bus.acquire(0));
        assert!(bus.acquire(0));
        bus.release();
    }
}
