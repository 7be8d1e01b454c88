//! Minimum-height raster and the greyscale morphology applied to it.
//!
//! Cells without points hold `None` rather than a sentinel height, so
//! they never leak into neighborhood minima or maxima.

use rayon::prelude::*;

use crate::types::{PipelineError, Point3, PointCloud};

/// A 2D grid over the cloud's XY bounding box.
///
/// Each cell stores the minimum Z of the points that fall into it.
pub(crate) struct HeightGrid {
    pub cols: usize,
    pub rows: usize,
    pub cell_size: f64,
    origin_x: f64,
    origin_y: f64,
    pub min_heights: Vec<Option<f64>>,
}

impl HeightGrid {
    /// Rasterize `cloud` with square cells of edge `cell_size`.
    ///
    /// Returns `Ok(None)` for an empty cloud.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::GridTooLarge`] if the XY extent needs
    /// more than `max_cells` cells.
    pub fn build(
        cloud: &PointCloud,
        cell_size: f64,
        max_cells: usize,
    ) -> Result<Option<Self>, PipelineError> {
        let Some(bounds) = cloud.bounds() else {
            return Ok(None);
        };
        let cols = cells_along(bounds.width(), cell_size);
        let rows = cells_along(bounds.depth(), cell_size);
        let len = cols
            .checked_mul(rows)
            .filter(|&n| n <= max_cells)
            .ok_or(PipelineError::GridTooLarge {
                cols,
                rows,
                max_cells,
            })?;

        let mut grid = Self {
            cols,
            rows,
            cell_size,
            origin_x: bounds.min.x,
            origin_y: bounds.min.y,
            min_heights: vec![None; len],
        };

        for point in cloud.points() {
            let cell = grid.cell_of(*point);
            let slot = &mut grid.min_heights[cell];
            *slot = Some(slot.map_or(point.z, |h| h.min(point.z)));
        }

        Ok(Some(grid))
    }

    /// Linear cell index containing `point`, clamped to the grid.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn cell_of(&self, point: Point3) -> usize {
        let c = ((point.x - self.origin_x) / self.cell_size).floor().max(0.0) as usize;
        let r = ((point.y - self.origin_y) / self.cell_size).floor().max(0.0) as usize;
        r.min(self.rows - 1) * self.cols + c.min(self.cols - 1)
    }

    /// Number of cells holding at least one point.
    pub fn occupied_cells(&self) -> usize {
        self.min_heights.iter().filter(|h| h.is_some()).count()
    }
}

/// Cells needed to cover `extent`; saturates instead of wrapping.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn cells_along(extent: f64, cell_size: f64) -> usize {
    ((extent / cell_size).floor() as usize).saturating_add(1)
}

/// Apply the progressive morphological opening to `surface`.
///
/// Window sizes double from 1 up to and including `max_window_size`;
/// each window's half-width in cells is `floor(window / cell_size / 2)`.
/// Every pass erodes then dilates the previous pass's output.
///
/// Returns the filtered surface and the number of passes run.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn progressive_opening(
    surface: &[Option<f64>],
    cols: usize,
    rows: usize,
    cell_size: f64,
    max_window_size: f64,
) -> (Vec<Option<f64>>, usize) {
    let mut current = surface.to_vec();
    let mut passes = 0;
    let mut window = 1.0_f64;
    while window <= max_window_size {
        let half = (window / cell_size / 2.0).floor() as usize;
        if half > 0 {
            let eroded = erode(&current, cols, rows, half);
            current = dilate(&eroded, cols, rows, half);
        }
        passes += 1;
        window *= 2.0;
    }
    log::debug!("morphological opening: {passes} passes up to window {max_window_size}");
    (current, passes)
}

/// Greyscale erosion: local minimum over a `(2*half+1)²` square.
pub(crate) fn erode(surface: &[Option<f64>], cols: usize, rows: usize, half: usize) -> Vec<Option<f64>> {
    window_filter(surface, cols, rows, half, f64::min)
}

/// Greyscale dilation: local maximum over a `(2*half+1)²` square.
pub(crate) fn dilate(surface: &[Option<f64>], cols: usize, rows: usize, half: usize) -> Vec<Option<f64>> {
    window_filter(surface, cols, rows, half, f64::max)
}

/// Square-window min/max, computed separably (rows, then columns).
///
/// Empty cells are excluded from every aggregate and stay empty in the
/// output. Each row is computed independently from a read-only input,
/// so rows run in parallel without affecting the result.
fn window_filter(
    surface: &[Option<f64>],
    cols: usize,
    rows: usize,
    half: usize,
    pick: fn(f64, f64) -> f64,
) -> Vec<Option<f64>> {
    let mut horizontal = vec![None; surface.len()];
    horizontal
        .par_chunks_mut(cols)
        .enumerate()
        .for_each(|(r, out)| {
            let row = &surface[r * cols..(r + 1) * cols];
            for (c, slot) in out.iter_mut().enumerate() {
                let lo = c.saturating_sub(half);
                let hi = (c + half).min(cols - 1);
                *slot = row[lo..=hi].iter().flatten().copied().reduce(pick);
            }
        });

    let mut output = vec![None; surface.len()];
    output.par_chunks_mut(cols).enumerate().for_each(|(r, out)| {
        let lo = r.saturating_sub(half);
        let hi = (r + half).min(rows - 1);
        for (c, slot) in out.iter_mut().enumerate() {
            if surface[r * cols + c].is_none() {
                continue;
            }
            *slot = (lo..=hi)
                .filter_map(|k| horizontal[k * cols + c])
                .reduce(pick);
        }
    });
    output
}

/// Mean of `|Δh| / distance` from cell `(c, r)` to its 8 neighbors.
///
/// Neighbors without data are excluded; returns `0.0` when the center
/// cell or every neighbor is empty.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn local_slope(
    surface: &[Option<f64>],
    cols: usize,
    rows: usize,
    cell: usize,
    cell_size: f64,
) -> f64 {
    let Some(center) = surface[cell] else {
        return 0.0;
    };
    let (c, r) = (cell % cols, cell / cols);
    let diagonal = cell_size * std::f64::consts::SQRT_2;

    let mut sum = 0.0;
    let mut count = 0_usize;
    for dr in -1_isize..=1 {
        for dc in -1_isize..=1 {
            if dr == 0 && dc == 0 {
                continue;
            }
            let (Some(nc), Some(nr)) = (c.checked_add_signed(dc), r.checked_add_signed(dr)) else {
                continue;
            };
            if nc >= cols || nr >= rows {
                continue;
            }
            if let Some(h) = surface[nr * cols + nc] {
                let dist = if dr != 0 && dc != 0 { diagonal } else { cell_size };
                sum += (h - center).abs() / dist;
                count += 1;
            }
        }
    }

    if count == 0 { 0.0 } else { sum / count as f64 }
}
