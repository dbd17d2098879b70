//! Session handling
//!
//! One session per accepted connection, from accept to close.

pub mod handler;

pub use handler::handle_session;
