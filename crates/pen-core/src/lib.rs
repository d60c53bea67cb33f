//! # pen-core
//!
//! Shared library for Pen Remote containing the line-delimited wire protocol,
//! the stream framer, and the domain types exchanged between the server and
//! its host process.
//!
//! This crate has zero dependencies on OS APIs, sockets, or async runtimes.
//!
//! # Architecture overview (for beginners)
//!
//! Pen Remote lets a companion "remote control" device drive the local mouse
//! pointer and a handful of keys over a short-range wireless link.  The remote
//! sends one small JSON object per line; the server turns each line into a
//! typed [`InputEvent`] and hands it to the platform input layer.
//!
//! - **`protocol`** – How bytes become events.  The [`LineFramer`] recovers
//!   complete lines from a byte stream, and [`decode_line`] turns one line
//!   into an [`InputEvent`].
//!
//! - **`domain`** – Plain data: input events, the service advertisement
//!   record, server state, and the notifications the server emits outward.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `pen_core::InputEvent` instead of `pen_core::domain::input::InputEvent`.
pub use domain::input::{InputEvent, KeySymbol, MouseButton};
pub use domain::service::{
    AdvertisementRecord, ConnectionId, ServerEvent, ServerState, ServiceDescriptor,
};
pub use protocol::codec::{decode_frame, decode_line, ProtocolError};
pub use protocol::framing::{FrameError, LineFramer};
