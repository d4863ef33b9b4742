//! VizBot firmware library.
//!
//! The coordination core of the device: the command queue feeding the
//! render loop, the bus mutex arbitrating the shared sensor bus, and
//! the WiFi provisioning state machine. Exposed as a library so all of
//! it runs in host tests; ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod portal;
pub mod provisioning;
pub mod render;
pub mod sensors;
pub mod status;

pub mod adapters;
