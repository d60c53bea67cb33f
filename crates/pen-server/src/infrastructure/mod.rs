//! Infrastructure layer for the Pen Remote server.
//!
//! Contains OS-facing adapters: the TCP listening endpoint, the UDP
//! discovery responder, platform input injection, configuration storage,
//! and the stdin/stdout control channel.
//!
//! **Dependency rule**: this layer may depend on `application` and `pen_core`,
//! but MUST NOT be imported by the `application` layer.

pub mod control;
pub mod discovery;
pub mod input_dispatch;
pub mod storage;
pub mod transport;
