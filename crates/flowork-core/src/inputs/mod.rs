//! Input selection: lazy path sources and path filters.

pub mod filter;
pub mod source;

pub use filter::PathFilter;
pub use source::{PathSource, SourceFeed, SourceStopper};
