//! Discovery registrar adapters.
//!
//! - **`udp`** – answers LAN discovery probes with the advertisement record.
//! - **`noop`** – accepts every call and publishes nothing.

pub mod noop;
pub mod udp;

pub use noop::NoopRegistrar;
pub use udp::{UdpDiscoveryRegistrar, DEFAULT_DISCOVERY_PORT};
