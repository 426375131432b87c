pub mod blueprint;
pub mod builtins;
pub mod matcher;
pub mod tokens;

pub mod prelude {
    pub use crate::blueprint::{blueprint_triples, input_node_types, input_signature, Triple};
    pub use crate::builtins::builtin_schemas;
    pub use crate::matcher::{match_schemas, resolve_node_type, ScoredSchema};
}
