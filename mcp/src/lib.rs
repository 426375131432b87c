//! # kg-mcp
//!
//! The Knowledge Tool Surface (spec §4.9): JSON-RPC 2.0 protocol types, the
//! tool registry, request dispatch, and the two transports spec §6 allows
//! (line-delimited stdio, or HTTP POST to a single endpoint) — the server
//! binary picks one at start-up via a boolean config.

pub mod handler;
pub mod http;
pub mod prompts;
pub mod protocol;
pub mod stdio;
pub mod tools;

pub use handler::McpServer;
