//! Post-processing pipeline for simulation output.
//!
//! This crate provides tools for:
//! - Loading whitespace-separated data tables and 2-D image grids
//! - Accumulating repeated measurements into mean/error points
//! - Grouping table rows by a parameter column
//! - Re-limiting images to a smaller coordinate window
//! - Reading and writing the simulation's `key = value` configs
//!
//! # Example
//!
//! ```no_run
//! use simdata_pipeline::{core::loaders::load_table, processors::accumulate::accumulate};
//!
//! let table = load_table("data/corr_bigdat.txt").unwrap();
//! let points = accumulate(&table, 6, 16, Some(17)).unwrap();
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;

pub use config::{
    AnalysisConfig, InputConfig, OutputConfig, ShapeBlock, SimConfig, SimConfigTemplate,
};
pub use self::core::loaders::{Extent, Image, Table};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
