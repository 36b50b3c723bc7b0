//! Transformation module.
//!
//! - Stages: projection, deduplication, required-field filtering, null normalization
//! - Pipeline: the ordered run from table initialization to persistence

pub mod pipeline;
pub mod stages;

pub use pipeline::*;
pub use stages::*;
