//! Application layer of the Pen Remote server.
//!
//! # What is the "application" layer? (for beginners)
//!
//! In Clean Architecture the *application* layer sits between the domain
//! (plain data in `pen-core`) and the infrastructure (sockets, OS input APIs,
//! files).  Code here:
//!
//! - **Orchestrates** the server: start, accept, read, decode, dispatch, stop.
//! - **Depends on abstractions** ([`transport::Transport`],
//!   [`dispatch::InputDispatcher`], [`advertise::DiscoveryRegistrar`]) so the
//!   infrastructure can be swapped without changing this code, and so tests
//!   can run against in-memory doubles.
//! - **Makes no OS calls** of its own.
//!
//! # Sub-modules
//!
//! - **`lifecycle`** – [`lifecycle::PenServer`], the Stopped/Running state
//!   machine.  The only component with externally visible state.
//! - **`accept`** – The accept loop: bounded-timeout waits, registration,
//!   one session task per connection.
//! - **`session`** – One connection's read → frame → decode → dispatch loop.
//! - **`registry`** – The set of live connections, guarded by one mutex.
//! - **`dispatch`** – The input dispatcher interface and the single worker
//!   that serialises dispatch calls from every session.
//! - **`advertise`** – The discovery registrar interface.
//! - **`transport`** – The listening-endpoint interface.
//! - **`events`** – The bounded sink for outward notifications.

pub mod accept;
pub mod advertise;
pub mod dispatch;
pub mod events;
pub mod lifecycle;
pub mod registry;
pub mod session;
pub mod transport;
