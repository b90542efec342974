//! Domain models for the akashic resolver.

mod learned;
mod record;
mod resolution;

pub use learned::*;
pub use record::*;
pub use resolution::*;
