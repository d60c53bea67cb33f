//! Domain types shared by every Pen Remote component.
//!
//! Nothing in here performs I/O.
//!
//! - **`input`** – The decoded input events and the key allow-list.
//! - **`service`** – Service advertisement record, lifecycle state, connection
//!   identifiers, and the outward notification enum.

pub mod input;
pub mod service;
