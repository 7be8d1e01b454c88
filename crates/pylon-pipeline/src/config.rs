//! Pipeline configuration.
//!
//! Every threshold the stages compare against lives here with its
//! default value. The defaults are hand-tuned for airborne corridor
//! surveys in meters; their exact comparison boundaries are part of the
//! observable behavior, so change them through configuration rather than
//! in the stage code.

use serde::{Deserialize, Serialize};

use crate::types::PipelineError;

/// Progressive morphological ground filter parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundConfig {
    /// Edge length of one grid cell.
    pub cell_size: f64,
    /// Largest morphological window, in the same units as `cell_size`.
    /// Windows double from 1 up to and including this size.
    pub max_window_size: f64,
    /// Maximum local terrain slope for a point to count as ground.
    pub slope_threshold: f64,
    /// Slope multiplier in the adaptive height threshold.
    pub max_distance: f64,
    /// Base height above the filtered surface still accepted as ground.
    pub initial_distance: f64,
    /// Upper bound on `cols * rows` of the height grid. Clouds whose XY
    /// extent needs more cells are rejected rather than rasterized.
    pub max_cells: usize,
}

impl GroundConfig {
    /// Default grid cell size.
    pub const DEFAULT_CELL_SIZE: f64 = 1.0;
    /// Default largest window size.
    pub const DEFAULT_MAX_WINDOW_SIZE: f64 = 16.0;
    /// Default slope threshold.
    pub const DEFAULT_SLOPE_THRESHOLD: f64 = 1.0;
    /// Default slope multiplier.
    pub const DEFAULT_MAX_DISTANCE: f64 = 3.0;
    /// Default base height threshold.
    pub const DEFAULT_INITIAL_DISTANCE: f64 = 2.0;
    /// Default grid cell limit (a 5 km x 5 km survey at 1 m cells).
    pub const DEFAULT_MAX_CELLS: usize = 25_000_000;
}

impl Default for GroundConfig {
    fn default() -> Self {
        Self {
            cell_size: Self::DEFAULT_CELL_SIZE,
            max_window_size: Self::DEFAULT_MAX_WINDOW_SIZE,
            slope_threshold: Self::DEFAULT_SLOPE_THRESHOLD,
            max_distance: Self::DEFAULT_MAX_DISTANCE,
            initial_distance: Self::DEFAULT_INITIAL_DISTANCE,
            max_cells: Self::DEFAULT_MAX_CELLS,
        }
    }
}

/// DBSCAN parameters and the size-adaptive tuning applied before it runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Neighborhood radius.
    pub eps: f64,
    /// Minimum neighborhood size (including the point itself) for a core point.
    pub min_points: usize,
    /// Inputs with a Z range above this get `eps * tall_eps_scale`.
    pub tall_height_range: f64,
    /// `eps` multiplier for tall inputs.
    pub tall_eps_scale: f64,
    /// Inputs with more points than this are voxel-downsampled.
    pub downsample_threshold: usize,
    /// Voxel edge length used for downsampling.
    pub voxel_size: f64,
    /// Lower bound for `min_points` after scaling by the downsampling ratio.
    pub min_points_floor: usize,
    /// Downsampled inputs still above this count get `eps * dense_eps_scale`.
    pub dense_threshold: usize,
    /// `eps` multiplier for inputs above `dense_threshold`.
    pub dense_eps_scale: f64,
    /// Raised `min_points` floor for inputs above `dense_threshold`.
    pub dense_min_points_floor: usize,
    /// Clusters must be strictly taller than this.
    pub min_cluster_height: f64,
    /// Clusters must have a strictly larger bounding-box volume than this.
    pub min_cluster_volume: f64,
}

impl ClusterConfig {
    /// Default neighborhood radius.
    pub const DEFAULT_EPS: f64 = 2.5;
    /// Default core point neighborhood size.
    pub const DEFAULT_MIN_POINTS: usize = 10;
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            eps: Self::DEFAULT_EPS,
            min_points: Self::DEFAULT_MIN_POINTS,
            tall_height_range: 50.0,
            tall_eps_scale: 1.5,
            downsample_threshold: 50_000,
            voxel_size: 0.2,
            min_points_floor: 5,
            dense_threshold: 80_000,
            dense_eps_scale: 1.2,
            dense_min_points_floor: 10,
            min_cluster_height: 2.0,
            min_cluster_volume: 10.0,
        }
    }
}

/// Geometric rule a cluster must satisfy to be a tower candidate.
///
/// All comparisons are strict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TowerRule {
    /// Center height above ground must exceed this.
    pub min_relative_height: f64,
    /// Bounding-box height must exceed this.
    pub min_height: f64,
    /// `height / min(width, depth)` must exceed this.
    pub min_vertical_aspect: f64,
    /// `max(width, depth) / min(width, depth)` must stay below this.
    pub max_horizontal_aspect: f64,
    /// Footprint area must exceed this.
    pub min_base_area: f64,
    /// Bounding-box volume must exceed this.
    pub min_volume: f64,
    /// Points per unit volume must exceed this.
    pub min_density: f64,
    /// Point count must exceed this.
    pub min_points: usize,
}

impl Default for TowerRule {
    fn default() -> Self {
        Self {
            min_relative_height: 15.0,
            min_height: 20.0,
            min_vertical_aspect: 2.0,
            max_horizontal_aspect: 3.0,
            min_base_area: 20.0,
            min_volume: 400.0,
            min_density: 0.1,
            min_points: 100,
        }
    }
}

/// Geometric rule a non-tower cluster must satisfy to be a power line.
///
/// All comparisons are strict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineRule {
    /// Center height above ground must exceed this.
    pub min_relative_height: f64,
    /// Bounding-box height (sag span) must exceed this.
    pub min_height: f64,
    /// Horizontal aspect must exceed this, unless `min_width_depth_ratio` holds.
    pub min_horizontal_aspect: f64,
    /// Alternative elongation test on `width / depth`.
    pub min_width_depth_ratio: f64,
    /// Volume lower bound (exclusive).
    pub min_volume: f64,
    /// Volume upper bound (exclusive).
    pub max_volume: f64,
    /// Point count lower bound (exclusive).
    pub min_points: usize,
    /// Point count upper bound (exclusive).
    pub max_points: usize,
}

impl Default for LineRule {
    fn default() -> Self {
        Self {
            min_relative_height: 5.0,
            min_height: 8.0,
            min_horizontal_aspect: 5.0,
            min_width_depth_ratio: 30.0,
            min_volume: 5.0,
            max_volume: 500.0,
            min_points: 20,
            max_points: 2000,
        }
    }
}

/// Where a power line may sit relative to the selected tower.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpanFilter {
    /// Horizontal distance to the tower center lower bound (exclusive).
    pub min_distance: f64,
    /// Horizontal distance to the tower center upper bound (exclusive).
    pub max_distance: f64,
    /// Line center must be strictly higher than `ground + min_clearance`.
    pub min_clearance: f64,
}

impl Default for SpanFilter {
    fn default() -> Self {
        Self {
            min_distance: 5.0,
            max_distance: 200.0,
            min_clearance: 8.0,
        }
    }
}

/// Tower score weights: `relative_height * w_h + volume * w_v + density * w_d`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TowerScore {
    /// Weight of the relative height.
    pub relative_height: f64,
    /// Weight of the bounding-box volume.
    pub volume: f64,
    /// Weight of the point density.
    pub density: f64,
}

impl Default for TowerScore {
    fn default() -> Self {
        Self {
            relative_height: 0.4,
            volume: 0.0001,
            density: 10.0,
        }
    }
}

/// Decision rules for the infrastructure classifier.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Tower candidate rule.
    pub tower: TowerRule,
    /// Tower candidate ranking.
    pub score: TowerScore,
    /// Power-line candidate rule.
    pub line: LineRule,
    /// Line placement relative to the selected tower.
    pub span: SpanFilter,
}

/// Configuration for the whole extraction pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Stage 1 parameters.
    pub ground: GroundConfig,
    /// Stage 2 parameters.
    pub cluster: ClusterConfig,
    /// Stage 3 parameters.
    pub classifier: ClassifierConfig,
    /// Seed for the parameter synthesizer's random source.
    pub seed: u64,
}

impl PipelineConfig {
    /// Default random seed.
    pub const DEFAULT_SEED: u64 = 42;

    /// Check the parameters the stages divide by or loop on.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first offending
    /// field.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let positive = [
            ("ground.cell_size", self.ground.cell_size),
            ("ground.max_window_size", self.ground.max_window_size),
            ("cluster.eps", self.cluster.eps),
            ("cluster.voxel_size", self.cluster.voxel_size),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(PipelineError::InvalidConfig(format!(
                    "{name} must be positive and finite, got {value}"
                )));
            }
        }
        let finite = [
            ("ground.slope_threshold", self.ground.slope_threshold),
            ("ground.max_distance", self.ground.max_distance),
            ("ground.initial_distance", self.ground.initial_distance),
            ("cluster.tall_eps_scale", self.cluster.tall_eps_scale),
            ("cluster.dense_eps_scale", self.cluster.dense_eps_scale),
        ];
        for (name, value) in finite {
            if !value.is_finite() {
                return Err(PipelineError::InvalidConfig(format!(
                    "{name} must be finite, got {value}"
                )));
            }
        }
        if self.ground.max_cells == 0 {
            return Err(PipelineError::InvalidConfig(
                "ground.max_cells must be at least 1".to_string(),
            ));
        }
        if self.cluster.min_points == 0 {
            return Err(PipelineError::InvalidConfig(
                "cluster.min_points must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ground: GroundConfig::default(),
            cluster: ClusterConfig::default(),
            classifier: ClassifierConfig::default(),
            seed: Self::DEFAULT_SEED,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_tuned_values() {
        let config = PipelineConfig::default();
        assert!((config.ground.cell_size - 1.0).abs() < f64::EPSILON);
        assert!((config.cluster.eps - 2.5).abs() < f64::EPSILON);
        assert_eq!(config.cluster.min_points, 10);
        assert_eq!(config.cluster.downsample_threshold, 50_000);
        assert_eq!(config.cluster.dense_threshold, 80_000);
        assert!((config.cluster.voxel_size - 0.2).abs() < f64::EPSILON);
        assert!((config.classifier.tower.min_volume - 400.0).abs() < f64::EPSILON);
        assert_eq!(config.classifier.line.max_points, 2000);
        assert!((config.classifier.span.max_distance - 200.0).abs() < f64::EPSILON);
        assert!((config.classifier.score.density - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_cell_size_is_rejected() {
        let config = PipelineConfig {
            ground: GroundConfig {
                cell_size: 0.0,
                ..GroundConfig::default()
            },
            ..PipelineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ground.cell_size"));
    }

    #[test]
    fn nan_eps_is_rejected() {
        let config = PipelineConfig {
            cluster: ClusterConfig {
                eps: f64::NAN,
                ..ClusterConfig::default()
            },
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn zero_min_points_is_rejected() {
        let config = PipelineConfig {
            cluster: ClusterConfig {
                min_points: 0,
                ..ClusterConfig::default()
            },
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_max_cells_is_rejected() {
        let config = PipelineConfig {
            ground: GroundConfig {
                max_cells: 0,
                ..GroundConfig::default()
            },
            ..PipelineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ground.max_cells"));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"cluster": {"eps": 3.0}, "seed": 7}"#).unwrap();
        assert!((config.cluster.eps - 3.0).abs() < f64::EPSILON);
        assert_eq!(config.cluster.min_points, ClusterConfig::DEFAULT_MIN_POINTS);
        assert_eq!(config.seed, 7);
        assert_eq!(config.ground, GroundConfig::default());
    }
}
