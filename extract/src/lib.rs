pub mod drain;
pub mod extractors;
pub mod format;
pub mod labels;
pub mod pipeline;

pub use pipeline::Pipeline;

pub mod prelude {
    pub use crate::extractors::{Extractor, Registry};
    pub use crate::format::{classify, ParsedShape};
    pub use crate::pipeline::Pipeline;
}
