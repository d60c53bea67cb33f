//! Line-delimited wire protocol used by the remote control.
//!
//! - **`framing`** – recovers complete lines from a byte stream.
//! - **`wire`** – reads one line as a flat object of scalar fields.
//! - **`codec`** – turns that object into an [`crate::InputEvent`].

pub mod codec;
pub mod framing;
pub mod wire;

pub use codec::{decode_line, ProtocolError};
pub use framing::{FrameError, LineFramer};
pub use wire::WireMessage;
