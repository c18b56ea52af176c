//! Data processing modules.

pub mod accumulate;
pub mod grouping;
pub mod relimit;

// Re-export key types for convenience
pub use accumulate::{accumulate, AccumulateError, Accumulated};
pub use grouping::{group_by, Groups, GroupingError};
pub use relimit::{crop_shape_images, relimit, IndexBox, RelimitError, ShapeImage};
