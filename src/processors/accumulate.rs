//! Accumulation of repeated measurements.
//!
//! Simulation sweeps frequently emit several rows for the same parameter
//! value. `accumulate` collapses each contiguous run of equal x-values into a
//! single point carrying the mean y and an error bar.

use thiserror::Error;

use crate::core::loaders::Table;
use crate::core::transforms::{mean, population_std};

/// Errors that can occur during accumulation.
#[derive(Debug, Error)]
pub enum AccumulateError {
    #[error("{role} column index {index} out of range for table with {num_columns} columns")]
    ColumnOutOfRange {
        role: &'static str,
        index: usize,
        num_columns: usize,
    },

    #[error("Cannot accumulate an empty table")]
    EmptyTable,
}

/// Result type for accumulation.
pub type Result<T> = std::result::Result<T, AccumulateError>;

/// One point per run: x value, mean y and error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Accumulated {
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
    pub errs: Vec<f64>,
}

impl Accumulated {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            xs: Vec::with_capacity(capacity),
            ys: Vec::with_capacity(capacity),
            errs: Vec::with_capacity(capacity),
        }
    }

    /// Returns the number of points.
    #[inline]
    pub fn len(&self) -> usize {
        self.xs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    /// Iterates over `(x, y, err)` triples.
    pub fn points(&self) -> impl Iterator<Item = (f64, f64, f64)> + '_ {
        self.xs
            .iter()
            .zip(&self.ys)
            .zip(&self.errs)
            .map(|((&x, &y), &err)| (x, y, err))
    }

    fn push_run(&mut self, x: f64, run: &[f64], dy: f64) {
        self.xs.push(x);
        self.ys.push(mean(run));
        self.errs.push(population_std(run).max(dy));
    }
}

fn column<'a>(table: &'a Table, index: usize, role: &'static str) -> Result<&'a [f64]> {
    table
        .column(index)
        .ok_or(AccumulateError::ColumnOutOfRange {
            role,
            index,
            num_columns: table.num_columns(),
        })
}

/// Collapse runs of equal x-values into mean/error points.
///
/// Rows are scanned in table order; nothing is sorted. A run ends when the
/// x-value changes (exact comparison), and the emitted error is the larger
/// of the run's population standard deviation and the `dy` value of the row
/// that ended it. The last run is compared against the `dy` value of the
/// final row of the table. A value that reappears after a different one
/// starts a new, separate run.
///
/// Without `dy_col` every row contributes an intrinsic error of zero.
///
/// # Arguments
///
/// * `table` - Input table
/// * `x_col` - Column holding the run key
/// * `y_col` - Column holding the measured value
/// * `dy_col` - Optional column holding the intrinsic error
///
/// # Errors
///
/// Returns an error if a column index is out of range or the table has no
/// rows.
///
/// # Example
///
/// ```
/// use simdata_pipeline::core::loaders::Table;
/// use simdata_pipeline::processors::accumulate::accumulate;
///
/// let table = Table::from_columns(vec![
///     vec![1.0, 1.0, 2.0],
///     vec![10.0, 12.0, 5.0],
///     vec![0.0, 0.0, 1.0],
/// ])
/// .unwrap();
/// let acc = accumulate(&table, 0, 1, Some(2)).unwrap();
/// assert_eq!(acc.xs, vec![1.0, 2.0]);
/// assert_eq!(acc.ys, vec![11.0, 5.0]);
/// assert_eq!(acc.errs, vec![1.0, 1.0]);
/// ```
pub fn accumulate(
    table: &Table,
    x_col: usize,
    y_col: usize,
    dy_col: Option<usize>,
) -> Result<Accumulated> {
    let xs = column(table, x_col, "x")?;
    let ys = column(table, y_col, "y")?;
    let dys = dy_col.map(|idx| column(table, idx, "dy")).transpose()?;

    let n = table.num_rows();
    if n == 0 {
        return Err(AccumulateError::EmptyTable);
    }
    let dy_at = |i: usize| dys.map_or(0.0, |d| d[i]);

    let mut result = Accumulated::with_capacity(n);
    let mut current_x = xs[0];
    let mut run: Vec<f64> = Vec::with_capacity(16);

    for (i, (&x, &y)) in xs.iter().zip(ys).enumerate() {
        if x == current_x {
            run.push(y);
        } else {
            result.push_run(current_x, &run, dy_at(i));
            current_x = x;
            run.clear();
            run.push(y);
        }
    }

    // flush the trailing run against the last row's error
    result.push_run(current_x, &run, dy_at(n - 1));

    log::debug!("Accumulated {} rows into {} points", n, result.len());

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: Vec<Vec<f64>>) -> Table {
        Table::from_columns(columns).unwrap()
    }

    #[test]
    fn test_distinct_x_passes_through() {
        let t = table(vec![
            vec![1.0, 2.0, 3.0],
            vec![4.0, 5.0, 6.0],
            vec![0.1, 0.2, 0.3],
        ]);
        let acc = accumulate(&t, 0, 1, Some(2)).unwrap();
        assert_eq!(acc.xs, vec![1.0, 2.0, 3.0]);
        assert_eq!(acc.ys, vec![4.0, 5.0, 6.0]);
        // each single-row run is closed by the following row's error
        assert_eq!(acc.errs, vec![0.2, 0.3, 0.3]);
    }

    #[test]
    fn test_without_dy_column() {
        let t = table(vec![vec![1.0, 2.0, 2.0], vec![4.0, 5.0, 7.0]]);
        let acc = accumulate(&t, 0, 1, None).unwrap();
        assert_eq!(acc.xs, vec![1.0, 2.0]);
        assert_eq!(acc.ys, vec![4.0, 6.0]);
        assert_eq!(acc.errs, vec![0.0, 1.0]);
    }

    #[test]
    fn test_repeated_run_uses_following_row_error() {
        // run of x=1 (std 2) closed by row with dy=3
        let t = table(vec![
            vec![1.0, 1.0, 1.0, 1.0, 2.0],
            vec![0.0, 4.0, 0.0, 4.0, 9.0],
            vec![9.0, 9.0, 9.0, 9.0, 3.0],
        ]);
        let acc = accumulate(&t, 0, 1, Some(2)).unwrap();
        assert_eq!(acc.xs, vec![1.0, 2.0]);
        assert_eq!(acc.ys, vec![2.0, 9.0]);
        assert_eq!(acc.errs, vec![3.0, 3.0]);

        let t = table(vec![
            vec![1.0, 1.0, 1.0, 1.0, 2.0],
            vec![0.0, 4.0, 0.0, 4.0, 9.0],
            vec![0.0, 0.0, 0.0, 0.0, 0.5],
        ]);
        let acc = accumulate(&t, 0, 1, Some(2)).unwrap();
        assert_eq!(acc.errs, vec![2.0, 0.5]);
    }

    #[test]
    fn test_trailing_run_uses_last_row_error() {
        let t = table(vec![
            vec![1.0, 2.0, 2.0],
            vec![3.0, 1.0, 3.0],
            vec![0.0, 7.0, 0.25],
        ]);
        let acc = accumulate(&t, 0, 1, Some(2)).unwrap();
        assert_eq!(acc.xs, vec![1.0, 2.0]);
        assert_eq!(acc.errs, vec![7.0, 1.0]);
    }

    #[test]
    fn test_non_contiguous_repeat_is_separate_point() {
        let t = table(vec![vec![1.0, 2.0, 1.0], vec![1.0, 2.0, 3.0]]);
        let acc = accumulate(&t, 0, 1, None).unwrap();
        assert_eq!(acc.xs, vec![1.0, 2.0, 1.0]);
        assert_eq!(acc.ys, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_dy_column_zero_is_honoured() {
        let t = table(vec![vec![0.5, 0.5], vec![1.0, 1.0], vec![2.0, 2.0]]);
        let acc = accumulate(&t, 1, 2, Some(0)).unwrap();
        assert_eq!(acc.xs, vec![1.0]);
        assert_eq!(acc.errs, vec![0.5]);
    }

    #[test]
    fn test_points_iterator() {
        let t = table(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        let acc = accumulate(&t, 0, 1, None).unwrap();
        let points: Vec<_> = acc.points().collect();
        assert_eq!(points, vec![(1.0, 3.0, 0.0), (2.0, 4.0, 0.0)]);
        assert_eq!(acc.len(), 2);
    }

    #[test]
    fn test_errors() {
        let t = table(vec![vec![1.0], vec![2.0]]);
        assert!(matches!(
            accumulate(&t, 0, 2, None),
            Err(AccumulateError::ColumnOutOfRange {
                role: "y",
                index: 2,
                num_columns: 2
            })
        ));
        assert!(matches!(
            accumulate(&t, 0, 1, Some(5)),
            Err(AccumulateError::ColumnOutOfRange { role: "dy", .. })
        ));

        let empty = table(vec![vec![], vec![]]);
        assert!(matches!(
            accumulate(&empty, 0, 1, None),
            Err(AccumulateError::EmptyTable)
        ));
    }
}
