//! Monotonic clock adapter.

use crate::app::ports::ClockPort;

/// Milliseconds-since-boot clock backed by `esp_timer` on device and
/// `Instant` on the host.
pub struct SystemClock {
    #[cfg(not(target_os = "espidf"))]
    epoch: std::time::Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            epoch: std::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockPort for SystemClock {
    fn now_ms(&self) -> u64 {
        #[cfg(target_os = "espidf")]
        {
            // Monotonic since boot, never negative.
            (unsafe { esp_idf_svc::sys::esp_timer_get_time() } / 1000) as u64
        }

        #[cfg(not(target_os = "espidf"))]
        {
            self.epoch.elapsed().as_millis() as u64
        }
    }

    fn delay_ms(&self, ms: u32) {
        #[cfg(target_os = "espidf")]
        esp_idf_svc::hal::delay::FreeRtos::delay_ms(ms);

        #[cfg(not(target_os = "espidf"))]
        std::thread::sleep(std::time::Duration::from_millis(u64::from(ms)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now_ms();
        clock.delay_ms(5);
        let b = clock.now_ms();
        assert!(b >= a + 5);
    }
}
