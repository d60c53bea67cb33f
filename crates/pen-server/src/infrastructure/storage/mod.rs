//! Persistent storage for the server's configuration.

pub mod config;
