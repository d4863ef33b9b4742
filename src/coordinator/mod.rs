//! Shared-resource coordination: the command queue and the bus mutex.
//!
//! Both primitives live in one explicitly constructed [`Coordinator`]
//! that is built in `main()` and passed by reference to whoever needs
//! it. No global singletons.

pub mod bus;
pub mod queue;

pub use bus::BusMutex;
pub use queue::CommandQueue;

use crate::app::Command;

/// Owner of the cross-context coordination primitives.
pub struct Coordinator {
    bus: BusMutex,
    commands: CommandQueue,
}

impl Coordinator {
    pub fn new() -> Self {
        Self {
            bus: BusMutex::new(),
            commands: CommandQueue::new(),
        }
    }

    /// The shared sensor-bus mutex.
    pub fn bus(&self) -> &BusMutex {
        &self.bus
    }

    /// Enqueue a render command (any context, non-blocking).
    pub fn enqueue(&self, cmd: Command) -> bool {
        self.commands.enqueue(cmd)
    }

    /// Drain pending commands (consumer context only).
    pub fn drain<F: FnMut(Command)>(&self, apply: F) -> usize {
        self.commands.drain(apply)
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}
