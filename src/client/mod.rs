//! Client management system
//!
//! Client records, connection handles, and the shared registry of everyone
//! currently connected.

pub mod registry;
pub mod state;

pub use registry::{ClientRegistry, SharedRegistry};
pub use state::{ClientHandle, ClientRecord, SessionState};
