//! Command processing
//!
//! Executes the closed set of server-side queries a client can issue and
//! produces the reply envelope. Commands are read-only: they never mutate
//! the registry, and an unknown command is answered explicitly rather than
//! dropped or treated as a session error.

use serde_json::json;

use crate::protocol::Envelope;

/// Dispatches a command by name to its handler.
///
/// `names` is a registry snapshot taken by the caller; the processor itself
/// never touches shared state.
pub fn execute(command: &str, names: Vec<String>) -> Envelope {
    match command {
        "list" => handle_cmd_list(command, names),
        unknown => handle_cmd_unknown(unknown),
    }
}

/// Handles the `list` command: enumerates currently registered names.
fn handle_cmd_list(command: &str, names: Vec<String>) -> Envelope {
    Envelope::command_result(command, json!(names))
}

/// Any unrecognized command gets an explicit unknown-command result.
fn handle_cmd_unknown(command: &str) -> Envelope {
    Envelope::command_result(command, json!({ "error": "unknown command" }))
}
