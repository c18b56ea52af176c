//! Column statistics and derived columns.
//!
//! Simulation runs often report the same quantity several times per row
//! (e.g. a width measured along x and along y, each with its own error).
//! The helpers here fold such columns into a single value and spread,
//! computed row by row in parallel with Rayon.

use rayon::prelude::*;
use thiserror::Error;

use super::loaders::Table;

/// Errors that can occur while deriving columns.
#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Column index {index} out of range for table with {num_columns} columns")]
    ColumnOutOfRange { index: usize, num_columns: usize },

    #[error("At least one value column is required")]
    NoValueColumns,
}

/// Result type for transform operations.
pub type Result<T> = std::result::Result<T, TransformError>;

/// Arithmetic mean. Returns NaN for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (divides by N, not N-1).
///
/// Returns NaN for an empty slice and 0 for a single value.
pub fn population_std(values: &[f64]) -> f64 {
    let m = mean(values);
    if m.is_nan() {
        return m;
    }
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

fn check_columns(table: &Table, indices: &[usize]) -> Result<()> {
    let num_columns = table.num_columns();
    match indices.iter().find(|&&i| i >= num_columns) {
        Some(&index) => Err(TransformError::ColumnOutOfRange { index, num_columns }),
        None => Ok(()),
    }
}

/// Fold several measurements of one quantity into a mean and a spread.
///
/// For every row, the value is the mean over `value_cols` and the spread is
/// the larger of the population standard deviation over `value_cols` and
/// every value in `error_cols` for that row.
///
/// # Arguments
///
/// * `table` - Input table
/// * `value_cols` - Columns holding repeated measurements
/// * `error_cols` - Columns holding intrinsic errors (may be empty)
///
/// # Returns
///
/// Tuple of (means, spreads), one entry per row.
pub fn combine_columns(
    table: &Table,
    value_cols: &[usize],
    error_cols: &[usize],
) -> Result<(Vec<f64>, Vec<f64>)> {
    if value_cols.is_empty() {
        return Err(TransformError::NoValueColumns);
    }
    check_columns(table, value_cols)?;
    check_columns(table, error_cols)?;

    let columns = table.columns();

    let combined: Vec<(f64, f64)> = (0..table.num_rows())
        .into_par_iter()
        .map(|i| {
            let values: Vec<f64> = value_cols.iter().map(|&c| columns[c][i]).collect();
            let spread = error_cols
                .iter()
                .map(|&c| columns[c][i])
                .fold(population_std(&values), f64::max);
            (mean(&values), spread)
        })
        .collect();

    Ok(combined.into_iter().unzip())
}
