//! Data loaders for simulation output files.
//!
//! This module provides parsers for:
//! - Data tables (whitespace-separated floats, one row per line)
//! - Image files (x-extent line, y-extent line, then the 2-D grid)
//!
//! Tables are stored column-major, the layout every processor works on.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Parse error in {path} line {line}: invalid number '{token}'")]
    ParseError {
        path: PathBuf,
        line: usize,
        token: String,
    },

    #[error("Ragged row {row}: expected {expected} values, found {found}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Column {column} has {found} values, expected {expected}")]
    ColumnLength {
        column: usize,
        expected: usize,
        found: usize,
    },

    #[error("Invalid image file: {0}")]
    InvalidImage(String),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Column-major numeric table.
///
/// Every column holds the same number of values; rows are samples and
/// columns are measured quantities, addressed by position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Vec<f64>>,
}

impl Table {
    /// Creates an empty table with no columns.
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    /// Creates a table with `width` empty columns, each with room for
    /// `capacity` rows.
    pub fn with_width(width: usize, capacity: usize) -> Self {
        Self {
            columns: (0..width).map(|_| Vec::with_capacity(capacity)).collect(),
        }
    }

    /// Creates a table from column vectors, which must all have equal length.
    pub fn from_columns(columns: Vec<Vec<f64>>) -> Result<Self> {
        if let Some(first) = columns.first() {
            let expected = first.len();
            for (i, col) in columns.iter().enumerate() {
                if col.len() != expected {
                    return Err(LoaderError::ColumnLength {
                        column: i,
                        expected,
                        found: col.len(),
                    });
                }
            }
        }
        Ok(Self { columns })
    }

    /// Wraps columns already known to have equal length.
    pub(crate) fn from_columns_unchecked(columns: Vec<Vec<f64>>) -> Self {
        debug_assert!(
            columns.windows(2).all(|w| w[0].len() == w[1].len()),
            "columns must have equal length"
        );
        Self { columns }
    }

    /// Creates a table from row vectors, transposing them into columns.
    pub fn from_rows<I>(rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = Vec<f64>>,
    {
        let mut table: Option<Table> = None;
        for (i, row) in rows.into_iter().enumerate() {
            let table = table.get_or_insert_with(|| Table::with_width(row.len(), 64));
            table.push_row(&row).map_err(|e| match e {
                LoaderError::RaggedRow { expected, found, .. } => LoaderError::RaggedRow {
                    row: i,
                    expected,
                    found,
                },
                other => other,
            })?;
        }
        Ok(table.unwrap_or_default())
    }

    /// Returns the number of rows.
    #[inline]
    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, |col| col.len())
    }

    /// Returns the number of columns.
    #[inline]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the table holds no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Returns the column at `idx`, if present.
    #[inline]
    pub fn column(&self, idx: usize) -> Option<&[f64]> {
        self.columns.get(idx).map(|c| c.as_slice())
    }

    /// Returns all columns.
    pub fn columns(&self) -> &[Vec<f64>] {
        &self.columns
    }

    /// Consumes the table and returns its columns.
    pub fn into_columns(self) -> Vec<Vec<f64>> {
        self.columns
    }

    /// Returns a copy of row `idx`, if present.
    pub fn row(&self, idx: usize) -> Option<Vec<f64>> {
        if idx >= self.num_rows() {
            return None;
        }
        Some(self.columns.iter().map(|col| col[idx]).collect())
    }

    /// Iterates over rows in order.
    pub fn rows(&self) -> impl Iterator<Item = Vec<f64>> + '_ {
        (0..self.num_rows()).map(move |i| self.columns.iter().map(|col| col[i]).collect())
    }

    /// Appends a row. Its length must match the column count.
    pub fn push_row(&mut self, row: &[f64]) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(LoaderError::RaggedRow {
                row: self.num_rows(),
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        for (col, &value) in self.columns.iter_mut().zip(row) {
            col.push(value);
        }
        Ok(())
    }

    /// Returns the table with `column` appended as its last column.
    pub fn with_column(mut self, column: Vec<f64>) -> Result<Self> {
        if !self.columns.is_empty() && column.len() != self.num_rows() {
            return Err(LoaderError::ColumnLength {
                column: self.columns.len(),
                expected: self.num_rows(),
                found: column.len(),
            });
        }
        self.columns.push(column);
        Ok(self)
    }
}

/// Axis-aligned coordinate rectangle of an image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl Extent {
    pub fn new(xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Self {
        Self {
            xmin,
            xmax,
            ymin,
            ymax,
        }
    }

    /// Returns the extent as `(xmin, xmax, ymin, ymax)`.
    pub fn as_tuple(&self) -> (f64, f64, f64, f64) {
        (self.xmin, self.xmax, self.ymin, self.ymax)
    }

    /// Returns true if `other` lies inside this extent (boundaries included).
    pub fn contains(&self, other: &Extent) -> bool {
        other.xmin >= self.xmin
            && other.xmax <= self.xmax
            && other.ymin >= self.ymin
            && other.ymax <= self.ymax
    }
}

/// 2-D grid paired with the coordinate rectangle it samples.
///
/// Rows map to y and columns to x, both with uniform spacing.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    /// Coordinate extent covered by the grid.
    pub extent: Extent,
    /// Row-major grid values. Shape: [num_rows][num_cols].
    pub data: Vec<Vec<f64>>,
    /// Source file path.
    pub source_path: Option<PathBuf>,
}

impl Image {
    /// Creates an image from a rectangular grid.
    pub fn from_grid(extent: Extent, data: Vec<Vec<f64>>) -> Result<Self> {
        let width = data.first().map_or(0, |row| row.len());
        for (i, row) in data.iter().enumerate() {
            if row.len() != width {
                return Err(LoaderError::RaggedRow {
                    row: i,
                    expected: width,
                    found: row.len(),
                });
            }
        }
        Ok(Self {
            extent,
            data,
            source_path: None,
        })
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn num_cols(&self) -> usize {
        self.data.first().map_or(0, |row| row.len())
    }

    /// Returns `(rows, cols)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.num_rows(), self.num_cols())
    }
}

/// Parse one whitespace-separated line of floats.
fn parse_line(line: &str, line_no: usize, path: &Path) -> Result<Vec<f64>> {
    line.split_whitespace()
        .map(|token| {
            token.parse::<f64>().map_err(|_| LoaderError::ParseError {
                path: path.to_path_buf(),
                line: line_no,
                token: token.to_string(),
            })
        })
        .collect()
}

/// Read every non-blank line of `reader` as a row of floats.
///
/// Returns `(line_number, values)` pairs, line numbers starting at 1.
fn read_numeric_lines<R: BufRead>(reader: R, path: &Path) -> Result<Vec<(usize, Vec<f64>)>> {
    let mut rows = Vec::with_capacity(256);
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        rows.push((i + 1, parse_line(&line, i + 1, path)?));
    }
    Ok(rows)
}

/// Load a data table from a whitespace-separated text file.
///
/// # Arguments
///
/// * `path` - Path to the data file (usually `<prefix>dat.txt`)
///
/// # Returns
///
/// A column-major `Table` with one column per value on each line.
///
/// # Errors
///
/// Returns an error if the file cannot be read, contains a token that is not
/// a number, has rows of differing length, or holds no data.
pub fn load_table<P: AsRef<Path>>(path: P) -> Result<Table> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let lines = read_numeric_lines(BufReader::new(file), path)?;

    if lines.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    let mut table = Table::with_width(lines[0].1.len(), lines.len());
    for (line_no, row) in &lines {
        table.push_row(row).map_err(|e| match e {
            LoaderError::RaggedRow { expected, found, .. } => LoaderError::RaggedRow {
                row: *line_no,
                expected,
                found,
            },
            other => other,
        })?;
    }

    log::debug!(
        "Loaded table {} ({} rows x {} columns)",
        path.display(),
        table.num_rows(),
        table.num_columns()
    );

    Ok(table)
}

/// Load an image from a text file.
///
/// The expected format:
/// - Line 1: x-extent (`xmin xmax`)
/// - Line 2: y-extent (`ymin ymax`)
/// - Remaining lines: grid rows, whitespace-separated
///
/// # Errors
///
/// Returns an error if the extent lines are not two numbers each, the grid
/// is missing or ragged, or the file cannot be read.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<Image> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let lines = read_numeric_lines(BufReader::new(file), path)?;

    if lines.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    let mut iter = lines.into_iter();
    let xlim = next_limits(&mut iter, "x", path)?;
    let ylim = next_limits(&mut iter, "y", path)?;

    let grid: Vec<Vec<f64>> = iter.map(|(_, row)| row).collect();
    if grid.is_empty() {
        return Err(LoaderError::InvalidImage(format!(
            "{} has no grid rows",
            path.display()
        )));
    }

    let extent = Extent::new(xlim[0], xlim[1], ylim[0], ylim[1]);
    let mut image = Image::from_grid(extent, grid)?;
    image.source_path = Some(path.to_path_buf());

    log::debug!(
        "Loaded image {} ({} x {}, extent {:?})",
        path.display(),
        image.num_rows(),
        image.num_cols(),
        extent.as_tuple()
    );

    Ok(image)
}

fn next_limits<I>(iter: &mut I, axis: &str, path: &Path) -> Result<[f64; 2]>
where
    I: Iterator<Item = (usize, Vec<f64>)>,
{
    let (line_no, values) = iter.next().ok_or_else(|| {
        LoaderError::InvalidImage(format!("{} is missing the {}-extent line", path.display(), axis))
    })?;
    match values.as_slice() {
        [lo, hi] => Ok([*lo, *hi]),
        _ => Err(LoaderError::InvalidImage(format!(
            "{} line {}: {}-extent needs 2 values, found {}",
            path.display(),
            line_no,
            axis,
            values.len()
        ))),
    }
}
