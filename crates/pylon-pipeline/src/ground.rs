//! Ground segmentation with a progressive morphological filter.
//!
//! This is stage 1 of the pipeline. The cloud is rasterized into a
//! minimum-height grid, the grid is smoothed by a sequence of greyscale
//! openings with doubling window sizes, and each point is compared
//! against the resulting ground surface.
//!
//! Large windows remove above-ground objects (vegetation, towers) from
//! the surface estimate while the slope-adaptive threshold keeps points
//! on sloped terrain classified as ground.

use serde::{Deserialize, Serialize};

use crate::config::GroundConfig;
use crate::grid::{self, HeightGrid};
use crate::types::{PipelineError, PointCloud};

/// Plane `a*x + b*y + c*z + d = 0`.
///
/// The segmenter only ever produces horizontal planes at the mean
/// ground height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundPlane {
    /// X coefficient.
    pub a: f64,
    /// Y coefficient.
    pub b: f64,
    /// Z coefficient.
    pub c: f64,
    /// Constant term.
    pub d: f64,
}

impl GroundPlane {
    /// Horizontal plane `z = height`.
    #[must_use]
    pub const fn horizontal(height: f64) -> Self {
        Self {
            a: 0.0,
            b: 0.0,
            c: 1.0,
            d: -height,
        }
    }

    /// Elevation of a horizontal plane.
    #[must_use]
    pub fn height(&self) -> f64 {
        -self.d / self.c
    }
}

impl Default for GroundPlane {
    fn default() -> Self {
        Self::horizontal(0.0)
    }
}

/// Raster dimensions used during segmentation, kept for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridInfo {
    /// Cells along X.
    pub cols: usize,
    /// Cells along Y.
    pub rows: usize,
    /// Cells holding at least one point.
    pub occupied_cells: usize,
    /// Morphological passes run.
    pub passes: usize,
}

/// Partition of a cloud into ground and non-ground points.
///
/// `ground` and `non_ground` are disjoint, ascending, and together cover
/// every index of the input cloud exactly once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundSegmentation {
    /// Indices of ground points.
    pub ground: Vec<usize>,
    /// Indices of everything above the ground surface.
    pub non_ground: Vec<usize>,
    /// Horizontal plane at the mean ground height.
    pub plane: GroundPlane,
    /// Raster used for the split; `None` for an empty cloud.
    pub grid: Option<GridInfo>,
}

impl GroundSegmentation {
    /// Returns `true` if no points were segmented.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ground.is_empty() && self.non_ground.is_empty()
    }
}

/// Split `cloud` into ground and non-ground points.
///
/// An empty cloud yields an empty segmentation.
///
/// # Errors
///
/// Returns [`PipelineError::GridTooLarge`] if the cloud's XY extent
/// needs more than `config.max_cells` grid cells.
#[allow(clippy::cast_precision_loss)]
pub fn segment(cloud: &PointCloud, config: &GroundConfig) -> Result<GroundSegmentation, PipelineError> {
    let Some(raster) = HeightGrid::build(cloud, config.cell_size, config.max_cells)? else {
        return Ok(GroundSegmentation::default());
    };

    let (surface, passes) = grid::progressive_opening(
        &raster.min_heights,
        raster.cols,
        raster.rows,
        raster.cell_size,
        config.max_window_size,
    );

    let mut ground = Vec::new();
    let mut non_ground = Vec::new();
    let points = cloud.points();

    for (index, point) in points.iter().enumerate() {
        let cell = raster.cell_of(*point);
        let Some(surface_height) = surface[cell] else {
            non_ground.push(index);
            continue;
        };
        let height_diff = point.z - surface_height;
        let slope = grid::local_slope(&surface, raster.cols, raster.rows, cell, raster.cell_size);
        let threshold = slope.mul_add(config.max_distance, config.initial_distance);

        if height_diff <= threshold && slope <= config.slope_threshold {
            ground.push(index);
        } else {
            non_ground.push(index);
        }
    }

    let plane = if ground.is_empty() {
        GroundPlane::default()
    } else {
        let sum: f64 = ground.iter().map(|&i| points[i].z).sum();
        GroundPlane::horizontal(sum / ground.len() as f64)
    };

    log::debug!(
        "ground segmentation: {} ground, {} non-ground over {}x{} cells",
        ground.len(),
        non_ground.len(),
        raster.cols,
        raster.rows,
    );

    Ok(GroundSegmentation {
        ground,
        non_ground,
        plane,
        grid: Some(GridInfo {
            cols: raster.cols,
            rows: raster.rows,
            occupied_cells: raster.occupied_cells(),
            passes,
        }),
    })
}
