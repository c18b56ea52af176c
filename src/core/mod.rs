//! Core data types and I/O operations.

pub mod loaders;
pub mod transforms;
pub mod writers;

pub use loaders::{load_image, load_table, Extent, Image, LoaderError, Table};
pub use transforms::{combine_columns, TransformError};
pub use writers::{write_accumulated_csv, write_image, write_table, WriteError};
