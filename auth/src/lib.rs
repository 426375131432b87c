//! # kg-auth
//!
//! The Token Manager (spec §4.1): JWT expiry decoding, refresh coalescing
//! under a single-flight gate, a circuit breaker over the refresh
//! endpoint, and a background proactive-refresh loop.

pub mod circuit;
pub mod jwt;
pub mod token;

pub use token::{TokenManager, TokenManagerConfig};
