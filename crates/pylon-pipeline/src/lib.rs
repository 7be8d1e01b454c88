//! pylon-pipeline: power-corridor extraction from airborne LiDAR (sans-IO).
//!
//! Turns an in-memory point cloud into a tower, power lines and their
//! physical parameters through:
//! ground segmentation -> clustering -> classification ->
//! curve fitting -> parameter synthesis.
//!
//! This crate has **no I/O dependencies**: it operates on owned point
//! buffers and returns structured data. Every stage works on index sets
//! into one canonical [`PointCloud`]; nothing is copied between stages
//! except the final tower and line clusters.

pub mod classify;
pub mod cluster;
pub mod config;
pub mod curve;
pub mod diagnostics;
mod grid;
pub mod ground;
pub mod params;
pub mod pipeline;
pub mod scene;
pub mod session;
pub mod types;
pub mod voxel;

pub use classify::InfrastructureClassification;
pub use cluster::{Cluster, ClusterLabel, ClusteringResult};
pub use config::{ClassifierConfig, ClusterConfig, GroundConfig, PipelineConfig};
pub use curve::PowerLineCurve;
pub use ground::{GroundPlane, GroundSegmentation};
pub use params::{Catenary, ParameterSynthesis, PowerLineParameter, Provenance};
pub use pipeline::Pipeline;
pub use session::{Session, SessionEntry};
pub use types::{Aabb, ExtractionResult, PipelineError, Point3, PointCloud};

/// Run every pipeline stage over `cloud`.
///
/// # Pipeline steps
///
/// 1. Validate the configuration and reject non-finite coordinates
/// 2. Progressive morphological ground segmentation
/// 3. DBSCAN clustering of the non-ground points
/// 4. Tower and power-line classification
/// 5. Centerline sampling per power line
/// 6. Parameter synthesis (or a tagged synthetic fallback)
///
/// An empty cloud is not an error: it yields empty stage results and a
/// synthetic parameter set.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] for an unusable configuration,
/// [`PipelineError::NonFiniteCoordinate`] if any coordinate is NaN or
/// infinite and [`PipelineError::GridTooLarge`] if the cloud's XY extent
/// is too large for the ground grid.
pub fn extract(cloud: PointCloud, config: &PipelineConfig) -> Result<ExtractionResult, PipelineError> {
    Ok(Pipeline::new(cloud, config.clone())
        .segment()?
        .cluster()
        .classify()
        .fit_curves()
        .synthesize()
        .into_result())
}
