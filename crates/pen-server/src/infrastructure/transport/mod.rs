//! Listening-endpoint adapters.

pub mod tcp;

pub use tcp::{TcpTransport, TcpTransportListener};
