//! Guarded access to the shared sensor bus.
//!
//! The motion and touch sensors hang off one I2C bus, polled from
//! different contexts. Every transaction goes through
//! [`poll_guarded`], which enforces the acquire/release pairing and
//! the skip-on-timeout policy. Register-level protocols live in the
//! sensor drivers, not here.

use log::trace;

use crate::coordinator::BusMutex;

/// A sensor whose transactions need the shared bus.
pub trait BusSensor {
    type Reading;

    /// Perform one bus transaction. Only called while the bus is held.
    fn read(&mut self) -> Option<Self::Reading>;
}

/// Poll a sensor under the bus mutex.
///
/// Returns `None` when the bus could not be acquired within
/// `timeout_ms`; the caller treats that as "skip this cycle", never as
/// an error. The bus is always released after a successful acquire,
/// whatever `read` returns.
pub fn poll_guarded<S: BusSensor>(
    bus: &BusMutex,
    sensor: &mut S,
    timeout_ms: u32,
) -> Option<S::Reading> {
    if !bus.acquire(timeout_ms) {
        trace!("bus busy; skipping sensor read");
        return None;
    }
    let reading = sensor.read();
    bus.release();
    reading
}
