//! Data writers for tables, images and accumulated series.
//!
//! This module provides functions for writing results to disk:
//! - Whitespace-separated tables, readable again by `load_table`
//! - Image files with extent header lines, readable again by `load_image`
//! - CSV with accumulated `x,y,err` points, optionally tagged by group key

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use thiserror::Error;

use super::loaders::{Image, Table};
use crate::processors::accumulate::Accumulated;

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Creates a buffered writer for the given path.
fn create_buffered_writer(path: &Path) -> Result<BufWriter<File>> {
    ensure_parent_dirs(path)?;
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(BufWriter::new(file))
}

fn format_row(values: impl IntoIterator<Item = f64>, precision: usize) -> String {
    values
        .into_iter()
        .map(|v| format!("{:.*}", precision, v))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Write lines to `path`, mapping IO failures to `WriteError::WriteFile`.
fn write_lines<I>(path: &Path, lines: I) -> Result<()>
where
    I: IntoIterator<Item = String>,
{
    let mut writer = create_buffered_writer(path)?;
    let path_str = path.display().to_string();

    for line in lines {
        writeln!(writer, "{}", line).map_err(|e| WriteError::WriteFile {
            path: path_str.clone(),
            source: e,
        })?;
    }

    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })
}

/// Write a table as whitespace-separated text, one row per line.
///
/// # Arguments
///
/// * `path` - Output file path (parent directories will be created if needed)
/// * `table` - Table to write
/// * `precision` - Digits after the decimal point
pub fn write_table(path: &Path, table: &Table, precision: usize) -> Result<()> {
    write_lines(path, table.rows().map(|row| format_row(row, precision)))?;
    log::info!("Table -> {} ({} rows)", path.display(), table.num_rows());
    Ok(())
}

/// Write an image: x-extent line, y-extent line, then the grid rows.
pub fn write_image(path: &Path, image: &Image, precision: usize) -> Result<()> {
    let e = image.extent;
    let header = [
        format_row([e.xmin, e.xmax], precision),
        format_row([e.ymin, e.ymax], precision),
    ];
    let grid = image
        .data
        .iter()
        .map(|row| format_row(row.iter().copied(), precision));

    write_lines(path, header.into_iter().chain(grid))?;
    log::info!(
        "Image -> {} ({} x {})",
        path.display(),
        image.num_rows(),
        image.num_cols()
    );
    Ok(())
}

/// Write accumulated series to CSV.
///
/// Each entry of `series` is an optional group key and its accumulated
/// points. When any key is present the CSV gets a leading `group` column
/// (empty for untagged series); otherwise the header is `x,y,err`.
pub fn write_accumulated_csv(
    path: &Path,
    series: &[(Option<f64>, &Accumulated)],
    precision: usize,
) -> Result<()> {
    let writer = create_buffered_writer(path)?;
    let mut csv_writer = csv::Writer::from_writer(writer);
    let path_str = path.display().to_string();
    let csv_err = |e: csv::Error| WriteError::CsvError {
        path: path_str.clone(),
        source: e,
    };

    let grouped = series.iter().any(|(key, _)| key.is_some());
    if grouped {
        csv_writer.write_record(["group", "x", "y", "err"]).map_err(csv_err)?;
    } else {
        csv_writer.write_record(["x", "y", "err"]).map_err(csv_err)?;
    }

    for (key, acc) in series {
        for (x, y, err) in acc.points() {
            let mut record = Vec::with_capacity(4);
            if grouped {
                record.push(key.map(|k| format!("{:.*}", precision, k)).unwrap_or_default());
            }
            record.push(format!("{:.*}", precision, x));
            record.push(format!("{:.*}", precision, y));
            record.push(format!("{:.*}", precision, err));
            csv_writer.write_record(&record).map_err(csv_err)?;
        }
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str.clone(),
        source: e,
    })?;

    log::info!("Accumulated CSV -> {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::loaders::{load_image, load_table, Extent};
    use crate::processors::accumulate::accumulate;
    use tempfile::TempDir;

    #[test]
    fn test_write_table_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("dat.txt");
        let table = Table::from_rows(vec![vec![1.0, 0.25], vec![2.0, -3.5]]).unwrap();

        write_table(&path, &table, 6).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "1.000000 0.250000\n2.000000 -3.500000\n");

        let reloaded = load_table(&path).unwrap();
        assert_eq!(reloaded, table);
    }

    #[test]
    fn test_write_image_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("0out.txt");
        let image = Image::from_grid(
            Extent::new(-1.0, 1.0, 0.0, 2.0),
            vec![vec![1.0, 2.0], vec![3.0, 4.0]],
        )
        .unwrap();

        write_image(&path, &image, 3).unwrap();
        let reloaded = load_image(&path).unwrap();
        assert_eq!(reloaded.extent, image.extent);
        assert_eq!(reloaded.data, image.data);
    }

    #[test]
    fn test_write_accumulated_csv() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("acc.csv");
        let table = Table::from_columns(vec![
            vec![1.0, 1.0, 2.0],
            vec![10.0, 12.0, 5.0],
            vec![0.0, 0.0, 1.0],
        ])
        .unwrap();
        let acc = accumulate(&table, 0, 1, Some(2)).unwrap();

        write_accumulated_csv(&path, &[(None, &acc)], 2).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "x,y,err\n1.00,11.00,1.00\n2.00,5.00,1.00\n");

        write_accumulated_csv(&path, &[(Some(0.5), &acc)], 1).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("group,x,y,err\n0.5,1.0,11.0,1.0\n"));
    }
}
