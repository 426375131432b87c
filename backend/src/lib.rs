//! # kg-backend
//!
//! The observability backend's local proxy: a token-aware HTTP client
//! with retry-on-401/403 (spec §4.9) and the time-window validation every
//! time-bounded tool shares (spec §6). The per-tool path templating itself
//! is intentionally thin — the design calls these handlers external
//! collaborators, not a place for engineering depth.

pub mod client;
pub mod time_window;

pub use client::{BackendClient, BackendClientConfig, ProxyTool};
pub use time_window::{resolve_time_window, TimeWindow, TimeWindowArgs};
