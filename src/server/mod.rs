//! Server core functionality
//!
//! The connection acceptor: binds the listener, spawns a session per
//! accepted connection, and owns the shutdown signal.

pub mod core;

pub use core::Server;
