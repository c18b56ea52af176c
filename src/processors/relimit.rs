//! Re-limiting image grids to a smaller coordinate window.
//!
//! An image samples its extent uniformly: `cols` columns span the x-range
//! and `rows` rows span the y-range, grid lines included at both ends.
//! `relimit` maps a coordinate window to the index box covering it and
//! reports the extent that box actually spans.

use std::ops::Range;
use std::path::PathBuf;

use rayon::prelude::*;
use thiserror::Error;

use crate::config::shape_image_path;
use crate::core::loaders::{load_image, Extent, Image, LoaderError};

/// Fractional indices this close to an integer are treated as on the grid.
const GRID_SNAP: f64 = 1e-9;

/// Errors that can occur while re-limiting.
#[derive(Debug, Error)]
pub enum RelimitError {
    #[error("Grid of {rows} x {cols} is too small to re-limit (need at least 2 x 2)")]
    DegenerateShape { rows: usize, cols: usize },

    #[error("Source extent {0:?} must be strictly increasing on both axes")]
    InvalidExtent(Extent),

    #[error("Requested window {requested:?} is not inside {available:?}")]
    OutsideExtent { requested: Extent, available: Extent },

    #[error("Requested window {0:?} does not cover any grid point")]
    EmptyWindow(Extent),

    #[error("Failed to load image {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: LoaderError,
    },
}

/// Result type for re-limit operations.
pub type Result<T> = std::result::Result<T, RelimitError>;

/// Half-open index box: `data[row_min..row_max][col_min..col_max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexBox {
    pub row_min: usize,
    pub row_max: usize,
    pub col_min: usize,
    pub col_max: usize,
}

impl IndexBox {
    #[inline]
    pub fn rows(&self) -> Range<usize> {
        self.row_min..self.row_max
    }

    #[inline]
    pub fn cols(&self) -> Range<usize> {
        self.col_min..self.col_max
    }

    /// Returns true if the box holds no cells.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.row_max <= self.row_min || self.col_max <= self.col_min
    }

    /// Returns `(row_min, row_max, col_min, col_max)`.
    pub fn as_tuple(&self) -> (usize, usize, usize, usize) {
        (self.row_min, self.row_max, self.col_min, self.col_max)
    }

    /// Copy the boxed cells out of a row-major grid.
    ///
    /// `data` must have the shape the box was computed for.
    pub(crate) fn slice(&self, data: &[Vec<f64>]) -> Vec<Vec<f64>> {
        data[self.rows()]
            .iter()
            .map(|row| row[self.cols()].to_vec())
            .collect()
    }
}

fn snap(f: f64) -> f64 {
    let r = f.round();
    if (f - r).abs() < GRID_SNAP {
        r
    } else {
        f
    }
}

/// First grid index at or past a lower boundary.
fn lower_index(f: f64) -> usize {
    snap(f).ceil() as usize
}

/// Exclusive index after the last grid line inside an upper boundary.
///
/// Between grid lines this equals `ceil(f)`; on a grid line `k` it is
/// `k + 1`, so the boundary line itself is kept.
fn upper_index(f: f64) -> usize {
    snap(f).floor() as usize + 1
}

/// Coordinate of grid line `k` out of `n`, exact at both ends.
fn grid_coord(lo: f64, hi: f64, k: usize, n: usize) -> f64 {
    if k + 1 == n {
        return hi;
    }
    let step = (hi - lo).abs() / (n - 1) as f64;
    lo + step * k as f64
}

/// Compute the index box and achieved extent for a coordinate window.
///
/// # Arguments
///
/// * `shape` - Grid shape as `(rows, cols)`, both at least 2
/// * `old_extent` - Extent the full grid spans
/// * `new_extent` - Requested window, inside `old_extent`
///
/// # Returns
///
/// The index box to slice with and the extent that box spans. The lower
/// bounds round up to the next grid line, so the achieved extent may be
/// smaller than the one requested. A window that falls between two grid
/// lines on some axis yields an empty box.
///
/// # Errors
///
/// Returns an error if the grid is smaller than 2 x 2, `old_extent` is not
/// increasing, or `new_extent` is unordered or not contained in it.
///
/// # Example
///
/// ```
/// use simdata_pipeline::core::loaders::Extent;
/// use simdata_pipeline::processors::relimit::relimit;
///
/// let (index_box, extent) = relimit(
///     (3, 3),
///     Extent::new(0.0, 2.0, 0.0, 2.0),
///     Extent::new(0.5, 1.5, 0.5, 1.5),
/// )
/// .unwrap();
/// assert_eq!(index_box.as_tuple(), (1, 2, 1, 2));
/// assert_eq!(extent, Extent::new(1.0, 1.0, 1.0, 1.0));
/// ```
pub fn relimit(
    shape: (usize, usize),
    old_extent: Extent,
    new_extent: Extent,
) -> Result<(IndexBox, Extent)> {
    let (rows, cols) = shape;
    if rows < 2 || cols < 2 {
        return Err(RelimitError::DegenerateShape { rows, cols });
    }

    let Extent {
        xmin: x1,
        xmax: x2,
        ymin: y1,
        ymax: y2,
    } = old_extent;
    if !(x1 < x2 && y1 < y2) {
        return Err(RelimitError::InvalidExtent(old_extent));
    }

    let ordered = new_extent.xmin <= new_extent.xmax && new_extent.ymin <= new_extent.ymax;
    if !ordered || !old_extent.contains(&new_extent) {
        return Err(RelimitError::OutsideExtent {
            requested: new_extent,
            available: old_extent,
        });
    }

    let dx = (x2 - x1).abs() / (cols - 1) as f64;
    let dy = (y2 - y1).abs() / (rows - 1) as f64;

    let index_box = IndexBox {
        row_min: lower_index((new_extent.ymin - y1) / dy),
        row_max: upper_index((new_extent.ymax - y1) / dy).min(rows),
        col_min: lower_index((new_extent.xmin - x1) / dx),
        col_max: upper_index((new_extent.xmax - x1) / dx).min(cols),
    };

    let achieved = Extent::new(
        grid_coord(x1, x2, index_box.col_min, cols),
        grid_coord(x1, x2, index_box.col_max - 1, cols),
        grid_coord(y1, y2, index_box.row_min, rows),
        grid_coord(y1, y2, index_box.row_max - 1, rows),
    );

    Ok((index_box, achieved))
}

impl Image {
    /// Crop the image to the grid points inside `window`.
    ///
    /// The returned image carries the extent actually covered, which may be
    /// smaller than `window` (see [`relimit`]).
    pub fn crop(&self, window: Extent) -> Result<Image> {
        let (index_box, extent) = relimit(self.shape(), self.extent, window)?;
        if index_box.is_empty() {
            return Err(RelimitError::EmptyWindow(window));
        }

        Ok(Image {
            extent,
            data: index_box.slice(&self.data),
            source_path: self.source_path.clone(),
        })
    }
}

/// A cropped image from one shape of a simulation run.
#[derive(Debug, Clone)]
pub struct ShapeImage {
    pub shape: usize,
    pub fig: String,
    pub image: Image,
}

/// Crop every `<prefix><shape><fig>.txt` image of a run to `window`.
///
/// Images are loaded and cropped in parallel. Results are ordered by shape,
/// then by the order of `figs`. The first failure aborts the batch.
pub fn crop_shape_images(
    prefix: &str,
    n_shapes: usize,
    figs: &[String],
    window: Extent,
) -> Result<Vec<ShapeImage>> {
    let jobs: Vec<(usize, &String)> = (0..n_shapes)
        .flat_map(|shape| figs.iter().map(move |fig| (shape, fig)))
        .collect();

    jobs.into_par_iter()
        .map(|(shape, fig)| {
            let path = shape_image_path(prefix, shape, fig);
            let image = load_image(&path).map_err(|source| RelimitError::Load {
                path: path.clone(),
                source,
            })?;
            let image = image.crop(window)?;
            log::debug!("Cropped {} to {:?}", path.display(), image.extent.as_tuple());
            Ok(ShapeImage {
                shape,
                fig: fig.clone(),
                image,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::writers::write_image;
    use tempfile::TempDir;

    fn grid(rows: usize, cols: usize) -> Vec<Vec<f64>> {
        (0..rows)
            .map(|r| (0..cols).map(|c| (r * cols + c) as f64).collect())
            .collect()
    }

    #[test]
    fn test_same_extent_round_trips() {
        let e = Extent::new(0.0, 2.0, 0.0, 2.0);
        let (b, achieved) = relimit((3, 3), e, e).unwrap();
        assert_eq!(b.as_tuple(), (0, 3, 0, 3));
        assert_eq!(achieved, e);

        let e = Extent::new(-1.5, 2.7, 0.1, 0.7);
        let (b, achieved) = relimit((5, 4), e, e).unwrap();
        assert_eq!(b.as_tuple(), (0, 5, 0, 4));
        assert_eq!(achieved, e);
    }

    #[test]
    fn test_single_cell_window() {
        let (b, achieved) = relimit(
            (3, 3),
            Extent::new(0.0, 2.0, 0.0, 2.0),
            Extent::new(0.5, 1.5, 0.5, 1.5),
        )
        .unwrap();
        assert_eq!(b.as_tuple(), (1, 2, 1, 2));
        assert_eq!(achieved, Extent::new(1.0, 1.0, 1.0, 1.0));
        assert!(!b.is_empty());
    }

    #[test]
    fn test_window_rounds_inward() {
        // 11 columns over 0..10 (dx = 1), 6 rows over 0..5 (dy = 1)
        let (b, achieved) = relimit(
            (6, 11),
            Extent::new(0.0, 10.0, 0.0, 5.0),
            Extent::new(2.2, 7.0, 1.0, 3.5),
        )
        .unwrap();
        assert_eq!(b.as_tuple(), (1, 4, 3, 8));
        assert_eq!(achieved, Extent::new(3.0, 7.0, 1.0, 3.0));
    }

    #[test]
    fn test_window_between_grid_lines_is_empty() {
        let (b, _) = relimit(
            (3, 3),
            Extent::new(0.0, 2.0, 0.0, 2.0),
            Extent::new(0.2, 0.8, 0.0, 2.0),
        )
        .unwrap();
        assert_eq!(b.cols(), 1..1);
        assert!(b.is_empty());
    }

    #[test]
    fn test_relimit_errors() {
        let e = Extent::new(0.0, 2.0, 0.0, 2.0);
        assert!(matches!(
            relimit((1, 3), e, e),
            Err(RelimitError::DegenerateShape { rows: 1, cols: 3 })
        ));
        assert!(matches!(
            relimit((3, 3), e, Extent::new(-0.5, 1.0, 0.0, 1.0)),
            Err(RelimitError::OutsideExtent { .. })
        ));
        assert!(matches!(
            relimit((3, 3), e, Extent::new(1.5, 0.5, 0.0, 1.0)),
            Err(RelimitError::OutsideExtent { .. })
        ));
        assert!(matches!(
            relimit((3, 3), Extent::new(2.0, 0.0, 0.0, 2.0), e),
            Err(RelimitError::InvalidExtent(_))
        ));
    }

    #[test]
    fn test_index_box_slice() {
        let (b, _) = relimit(
            (3, 4),
            Extent::new(0.0, 3.0, 0.0, 2.0),
            Extent::new(2.0, 3.0, 0.0, 1.0),
        )
        .unwrap();
        assert_eq!(b.as_tuple(), (0, 2, 2, 4));
        assert_eq!(b.slice(&grid(3, 4)), vec![vec![2.0, 3.0], vec![6.0, 7.0]]);
    }

    #[test]
    fn test_image_crop() {
        let image = Image::from_grid(Extent::new(0.0, 3.0, 0.0, 2.0), grid(3, 4)).unwrap();
        let cropped = image.crop(Extent::new(1.0, 2.0, 0.5, 2.0)).unwrap();
        assert_eq!(cropped.extent, Extent::new(1.0, 2.0, 1.0, 2.0));
        assert_eq!(cropped.data, vec![vec![5.0, 6.0], vec![9.0, 10.0]]);

        assert!(matches!(
            image.crop(Extent::new(1.2, 1.8, 0.0, 2.0)),
            Err(RelimitError::EmptyWindow(_))
        ));
    }

    #[test]
    fn test_crop_shape_images() {
        let dir = TempDir::new().unwrap();
        let prefix = format!("{}/run_", dir.path().display());
        let image = Image::from_grid(Extent::new(0.0, 3.0, 0.0, 2.0), grid(3, 4)).unwrap();
        for shape in 0..2 {
            for fig in ["in", "out"] {
                write_image(&shape_image_path(&prefix, shape, fig), &image, 6).unwrap();
            }
        }

        let figs = vec!["in".to_string(), "out".to_string()];
        let window = Extent::new(0.0, 1.0, 0.0, 1.0);
        let cropped = crop_shape_images(&prefix, 2, &figs, window).unwrap();

        let order: Vec<(usize, &str)> = cropped.iter().map(|s| (s.shape, s.fig.as_str())).collect();
        assert_eq!(order, vec![(0, "in"), (0, "out"), (1, "in"), (1, "out")]);
        for s in &cropped {
            assert_eq!(s.image.data, vec![vec![0.0, 1.0], vec![4.0, 5.0]]);
        }

        assert!(matches!(
            crop_shape_images(&prefix, 3, &figs, window),
            Err(RelimitError::Load { .. })
        ));
    }
}
