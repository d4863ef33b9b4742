//! Application core: commands and the port traits the domain logic
//! depends on. Everything in here is platform-free and host-testable.

pub mod commands;
pub mod ports;

pub use commands::Command;
