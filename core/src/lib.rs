//! # kg-core
//!
//! Shared data model, error taxonomy, and the `GraphStore` trait that
//! `kg-store` and `kg-store-memory` both implement. Every other crate in
//! this workspace depends on this one and nothing else in the workspace.

pub mod dedup;
pub mod errors;
pub mod temporal;
pub mod traits;
pub mod types;

pub mod prelude {
    pub use crate::dedup::*;
    pub use crate::errors::*;
    pub use crate::temporal::*;
    pub use crate::traits::*;
    pub use crate::types::*;
    pub use async_trait::async_trait;
    pub use chrono::{DateTime, Utc};
}
