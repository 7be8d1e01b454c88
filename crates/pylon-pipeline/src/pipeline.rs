//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! Unlike [`crate::extract`] which runs every stage in one call,
//! [`Pipeline`] lets the caller drive execution one step at a time:
//!
//! ```rust
//! # use pylon_pipeline::{Pipeline, PipelineConfig, PipelineError, PointCloud};
//! # fn run(cloud: PointCloud) -> Result<(), PipelineError> {
//! let result = Pipeline::new(cloud, PipelineConfig::default())
//!     .segment()?
//!     .cluster()
//!     .classify()
//!     .fit_curves()
//!     .synthesize()
//!     .into_result();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next pipeline state,
//! carrying every earlier output along. Only [`Pending::segment`] can
//! fail: it validates the configuration and the cloud before any work
//! is done.

use crate::classify::{self, InfrastructureClassification};
use crate::cluster::ClusteringResult;
use crate::config::PipelineConfig;
use crate::curve::{self, PowerLineCurve};
use crate::diagnostics::StageMetrics;
use crate::ground::GroundSegmentation;
use crate::params::ParameterSynthesis;
use crate::types::{ExtractionResult, PipelineError, PointCloud};

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
///
/// Call [`segment`](Self::segment) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .segment() to continue"]
pub struct Pending {
    config: PipelineConfig,
    cloud: PointCloud,
}

impl Pending {
    /// The input cloud.
    #[must_use]
    pub const fn cloud(&self) -> &PointCloud {
        &self.cloud
    }

    /// Split ground from non-ground points and advance to [`Segmented`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the configuration is
    /// unusable, [`PipelineError::NonFiniteCoordinate`] if any point
    /// has a NaN or infinite coordinate and [`PipelineError::GridTooLarge`]
    /// if the cloud spans more ground grid cells than allowed.
    pub fn segment(self) -> Result<Segmented, PipelineError> {
        self.config.validate()?;
        if let Some(index) = self.cloud.first_non_finite() {
            return Err(PipelineError::NonFiniteCoordinate { index });
        }
        let ground = crate::ground::segment(&self.cloud, &self.config.ground)?;
        Ok(Segmented {
            config: self.config,
            cloud: self.cloud,
            ground,
        })
    }
}

// ───────────────────────── Stage 1: Segmented ────────────────────────

/// Pipeline state after ground segmentation.
#[must_use = "pipeline stages are consumed by advancing; call .cluster() to continue"]
pub struct Segmented {
    config: PipelineConfig,
    cloud: PointCloud,
    ground: GroundSegmentation,
}

impl Segmented {
    /// Metrics describing the work done to reach this stage.
    #[must_use]
    pub fn stage_metrics(&self) -> StageMetrics {
        let grid = self.ground.grid.unwrap_or_default();
        StageMetrics::GroundSegmentation {
            cell_size: self.config.ground.cell_size,
            cols: grid.cols,
            rows: grid.rows,
            occupied_cells: grid.occupied_cells,
            passes: grid.passes,
            ground_count: self.ground.ground.len(),
            non_ground_count: self.ground.non_ground.len(),
            plane_height: self.ground.plane.height(),
        }
    }

    /// The ground / non-ground partition.
    #[must_use]
    pub const fn ground(&self) -> &GroundSegmentation {
        &self.ground
    }

    /// Cluster the non-ground points.
    pub fn cluster(self) -> Clustered {
        let clustering =
            crate::cluster::cluster(&self.cloud, &self.ground.non_ground, &self.config.cluster);
        Clustered {
            config: self.config,
            cloud: self.cloud,
            ground: self.ground,
            clustering,
        }
    }
}

// ───────────────────────── Stage 2: Clustered ────────────────────────

/// Pipeline state after DBSCAN clustering.
#[must_use = "pipeline stages are consumed by advancing; call .classify() to continue"]
pub struct Clustered {
    config: PipelineConfig,
    cloud: PointCloud,
    ground: GroundSegmentation,
    clustering: ClusteringResult,
}

impl Clustered {
    /// Metrics describing the work done to reach this stage.
    #[must_use]
    pub fn stage_metrics(&self) -> StageMetrics {
        let c = &self.clustering;
        StageMetrics::Clustering {
            input_count: self.ground.non_ground.len(),
            processed_count: c.processed.len(),
            eps: c.params.eps,
            min_points: c.params.min_points,
            downsampled: c.params.downsampled,
            raw_cluster_count: c.raw_cluster_count,
            cluster_count: c.clusters.len(),
            noise_count: c.noise_count(),
        }
    }

    /// Clusters that survived the size filter, plus per-point labels.
    #[must_use]
    pub const fn clustering(&self) -> &ClusteringResult {
        &self.clustering
    }

    /// Pick the tower and power lines among the clusters.
    pub fn classify(self) -> Classified {
        let ground_height = classify::ground_reference_height(&self.cloud, &self.ground.ground);
        let classification = classify::classify(
            &self.clustering.clusters,
            ground_height,
            &self.config.classifier,
        );
        Classified {
            config: self.config,
            cloud: self.cloud,
            ground: self.ground,
            clustering: self.clustering,
            classification,
        }
    }
}

// ───────────────────────── Stage 3: Classified ───────────────────────

/// Pipeline state after tower / line classification.
#[must_use = "pipeline stages are consumed by advancing; call .fit_curves() to continue"]
pub struct Classified {
    config: PipelineConfig,
    cloud: PointCloud,
    ground: GroundSegmentation,
    clustering: ClusteringResult,
    classification: InfrastructureClassification,
}

impl Classified {
    /// Metrics describing the work done to reach this stage.
    #[must_use]
    pub fn stage_metrics(&self) -> StageMetrics {
        let c = &self.classification;
        StageMetrics::Classification {
            cluster_count: self.clustering.clusters.len(),
            ground_height: c.ground_height,
            tower_candidates: c.tower_candidates,
            tower_points: c.tower.as_ref().map(crate::cluster::Cluster::len),
            tower_score: c.tower_score,
            line_candidates: c.line_candidates,
            line_count: c.power_lines.len(),
        }
    }

    /// The selected tower and power lines.
    #[must_use]
    pub const fn classification(&self) -> &InfrastructureClassification {
        &self.classification
    }

    /// Fit a centerline to every power line.
    pub fn fit_curves(self) -> Fitted {
        let curves = curve::fit_all(&self.cloud, &self.classification.power_lines);
        Fitted {
            config: self.config,
            cloud: self.cloud,
            ground: self.ground,
            clustering: self.clustering,
            classification: self.classification,
            curves,
        }
    }
}

// ───────────────────────── Stage 4: Fitted ───────────────────────────

/// Pipeline state after curve fitting.
#[must_use = "pipeline stages are consumed by advancing; call .synthesize() to continue"]
pub struct Fitted {
    config: PipelineConfig,
    cloud: PointCloud,
    ground: GroundSegmentation,
    clustering: ClusteringResult,
    classification: InfrastructureClassification,
    curves: Vec<PowerLineCurve>,
}

impl Fitted {
    /// Metrics describing the work done to reach this stage.
    #[must_use]
    pub fn stage_metrics(&self) -> StageMetrics {
        StageMetrics::CurveFitting {
            curve_count: self.curves.len(),
            input_point_count: self
                .classification
                .power_lines
                .iter()
                .map(crate::cluster::Cluster::len)
                .sum(),
            output_point_count: self.curves.iter().map(|c| c.points.len()).sum(),
        }
    }

    /// One curve per power line, in line order.
    #[must_use]
    pub fn curves(&self) -> &[PowerLineCurve] {
        &self.curves
    }

    /// Derive physical parameters for every line.
    pub fn synthesize(self) -> Synthesized {
        let parameters =
            crate::params::synthesize(&self.cloud, &self.classification, self.config.seed);
        Synthesized {
            config: self.config,
            cloud: self.cloud,
            ground: self.ground,
            clustering: self.clustering,
            classification: self.classification,
            curves: self.curves,
            parameters,
        }
    }
}

// ───────────────────────── Stage 5: Synthesized ──────────────────────

/// Pipeline state after parameter synthesis, the final stage.
#[must_use = "call .into_result() to extract the ExtractionResult"]
pub struct Synthesized {
    config: PipelineConfig,
    cloud: PointCloud,
    ground: GroundSegmentation,
    clustering: ClusteringResult,
    classification: InfrastructureClassification,
    curves: Vec<PowerLineCurve>,
    parameters: ParameterSynthesis,
}

impl Synthesized {
    /// Metrics describing the work done to reach this stage.
    #[must_use]
    pub fn stage_metrics(&self) -> StageMetrics {
        StageMetrics::Synthesis {
            seed: self.config.seed,
            record_count: self.parameters.parameters.len(),
            provenance: self.parameters.provenance,
        }
    }

    /// The parameter records.
    #[must_use]
    pub const fn parameters(&self) -> &ParameterSynthesis {
        &self.parameters
    }

    /// The configuration this run used.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Consume the pipeline and return every stage's output.
    #[must_use]
    pub fn into_result(self) -> ExtractionResult {
        ExtractionResult {
            cloud: self.cloud,
            ground: self.ground,
            clustering: self.clustering,
            classification: self.classification,
            curves: self.curves,
            parameters: self.parameters,
        }
    }
}

// ──────────────────── PipelineStage trait + Stage enum ────────────────

/// Total number of stages in the pipeline.
pub const STAGE_COUNT: usize = 6;

/// The output produced by a single pipeline stage.
#[must_use]
pub enum StageOutput<'a> {
    /// The input cloud, untouched.
    Source {
        /// The cloud.
        cloud: &'a PointCloud,
    },
    /// Ground segmentation result.
    Segmented {
        /// The partition.
        ground: &'a GroundSegmentation,
    },
    /// Clustering result.
    Clustered {
        /// Labels and surviving clusters.
        clustering: &'a ClusteringResult,
    },
    /// Classification result.
    Classified {
        /// Tower and lines.
        classification: &'a InfrastructureClassification,
    },
    /// Curve fitting result.
    Fitted {
        /// One curve per line.
        curves: &'a [PowerLineCurve],
    },
    /// Parameter synthesis result.
    Synthesized {
        /// Parameter records.
        parameters: &'a ParameterSynthesis,
    },
}

/// Trait implemented by every pipeline stage, enabling uniform iteration.
///
/// Each stage struct implements it, and [`Stage`] delegates to whichever
/// variant it holds.
pub trait PipelineStage: Sized {
    /// Short name of this stage (e.g. `"ground"`).
    const NAME: &str;

    /// Zero-based index of this stage (`0` for Pending through `5` for
    /// Synthesized).
    const INDEX: usize;

    /// The output this stage produced.
    fn output(&self) -> StageOutput<'_>;

    /// Metrics describing the work done to reach this state.
    ///
    /// `None` for [`Pending`], which has done nothing yet.
    fn metrics(&self) -> Option<StageMetrics>;

    /// Advance to the next stage.
    ///
    /// Returns `Ok(None)` if already at the final stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] when validation in
    /// [`Pending::segment`] fails.
    fn next(self) -> Result<Option<Stage>, PipelineError>;

    /// Run all remaining stages and return the final result.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if a remaining fallible stage fails.
    fn complete(self) -> Result<ExtractionResult, PipelineError>;
}

impl PipelineStage for Pending {
    const NAME: &str = "source";
    const INDEX: usize = 0;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Source { cloud: &self.cloud }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        None
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Segmented(self.segment()?)))
    }

    fn complete(self) -> Result<ExtractionResult, PipelineError> {
        self.segment()?.complete()
    }
}

impl PipelineStage for Segmented {
    const NAME: &str = "ground";
    const INDEX: usize = 1;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Segmented {
            ground: &self.ground,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.stage_metrics())
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Clustered(self.cluster())))
    }

    fn complete(self) -> Result<ExtractionResult, PipelineError> {
        self.cluster().complete()
    }
}

impl PipelineStage for Clustered {
    const NAME: &str = "cluster";
    const INDEX: usize = 2;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Clustered {
            clustering: &self.clustering,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.stage_metrics())
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Classified(self.classify())))
    }

    fn complete(self) -> Result<ExtractionResult, PipelineError> {
        self.classify().complete()
    }
}

impl PipelineStage for Classified {
    const NAME: &str = "classify";
    const INDEX: usize = 3;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Classified {
            classification: &self.classification,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.stage_metrics())
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Fitted(self.fit_curves())))
    }

    fn complete(self) -> Result<ExtractionResult, PipelineError> {
        self.fit_curves().complete()
    }
}

impl PipelineStage for Fitted {
    const NAME: &str = "curve";
    const INDEX: usize = 4;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Fitted {
            curves: &self.curves,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.stage_metrics())
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Synthesized(self.synthesize())))
    }

    fn complete(self) -> Result<ExtractionResult, PipelineError> {
        self.synthesize().complete()
    }
}

impl PipelineStage for Synthesized {
    const NAME: &str = "synthesize";
    const INDEX: usize = 5;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Synthesized {
            parameters: &self.parameters,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.stage_metrics())
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(None)
    }

    fn complete(self) -> Result<ExtractionResult, PipelineError> {
        Ok(self.into_result())
    }
}

/// Enum wrapping all pipeline stages for uniform, loopable access.
///
/// ```rust
/// # use pylon_pipeline::{Pipeline, PipelineConfig, PipelineError, PointCloud};
/// # use pylon_pipeline::pipeline::{Advance, Stage};
/// # fn run(cloud: PointCloud) -> Result<(), PipelineError> {
/// let mut stage: Stage = Pipeline::new(cloud, PipelineConfig::default()).into();
/// loop {
///     match stage.advance()? {
///         Advance::Next(next) => stage = next,
///         Advance::Complete(done) => { stage = done; break; }
///     }
/// }
/// let result = stage.complete()?;
/// # Ok(())
/// # }
/// ```
#[must_use]
pub enum Stage {
    /// See [`Pending`].
    Pending(Pending),
    /// See [`Segmented`].
    Segmented(Segmented),
    /// See [`Clustered`].
    Clustered(Clustered),
    /// See [`Classified`].
    Classified(Classified),
    /// See [`Fitted`].
    Fitted(Fitted),
    /// See [`Synthesized`].
    Synthesized(Synthesized),
}

/// Compile-time guard: adding a [`Stage`] variant makes this match
/// non-exhaustive, a reminder to bump [`STAGE_COUNT`].
#[allow(dead_code, clippy::match_same_arms)]
const fn _stage_count_guard(s: &Stage) {
    match s {
        Stage::Pending(_)
        | Stage::Segmented(_)
        | Stage::Clustered(_)
        | Stage::Classified(_)
        | Stage::Fitted(_)
        | Stage::Synthesized(_) => {}
    }
}

/// Result of [`Stage::advance`]: either the next stage or the final
/// stage returned unchanged.
#[must_use]
pub enum Advance {
    /// The pipeline advanced to this stage.
    Next(Stage),
    /// The pipeline was already at the final stage.
    Complete(Stage),
}

/// Delegate a method call to whichever `Stage` variant is active.
macro_rules! delegate {
    ($self:ident, $method:ident $(, $arg:expr)*) => {
        match $self {
            Self::Pending(s) => s.$method($($arg),*),
            Self::Segmented(s) => s.$method($($arg),*),
            Self::Clustered(s) => s.$method($($arg),*),
            Self::Classified(s) => s.$method($($arg),*),
            Self::Fitted(s) => s.$method($($arg),*),
            Self::Synthesized(s) => s.$method($($arg),*),
        }
    };
}

impl Stage {
    /// Short name of the current stage.
    #[must_use]
    pub fn name(&self) -> &'static str {
        delegate!(self, name)
    }

    /// Zero-based index of the current stage.
    #[must_use]
    pub fn index(&self) -> usize {
        delegate!(self, index)
    }

    /// The output this stage produced.
    pub fn output(&self) -> StageOutput<'_> {
        delegate!(self, output)
    }

    /// Metrics for the current stage; `None` for `Pending`.
    #[must_use]
    pub fn metrics(&self) -> Option<StageMetrics> {
        delegate!(self, metrics)
    }

    /// Whether the pipeline is at the final stage.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Synthesized(_))
    }

    /// Advance to the next stage; `Ok(None)` if already complete.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if a fallible stage transition fails.
    pub fn next(self) -> Result<Option<Self>, PipelineError> {
        delegate!(self, next)
    }

    /// Advance to the next stage, returning `self` unchanged if already
    /// complete.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if a fallible stage transition fails.
    pub fn advance(self) -> Result<Advance, PipelineError> {
        if self.is_complete() {
            return Ok(Advance::Complete(self));
        }
        // Every non-final stage returns Some from next().
        #[allow(clippy::unreachable)]
        let next = self
            .next()?
            .unwrap_or_else(|| unreachable!("non-complete stage returned None from next()"));
        Ok(Advance::Next(next))
    }

    /// Run all remaining stages to completion.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if a remaining fallible stage fails.
    pub fn complete(self) -> Result<ExtractionResult, PipelineError> {
        delegate!(self, complete)
    }
}

// The trait's associated constants are not reachable through `self`,
// so the macro goes through this helper.
trait StageMetadata {
    fn name(&self) -> &'static str;
    fn index(&self) -> usize;
}

impl<T: PipelineStage> StageMetadata for T {
    fn name(&self) -> &'static str {
        T::NAME
    }

    fn index(&self) -> usize {
        T::INDEX
    }
}

impl From<Pending> for Stage {
    fn from(s: Pending) -> Self {
        Self::Pending(s)
    }
}

impl From<Segmented> for Stage {
    fn from(s: Segmented) -> Self {
        Self::Segmented(s)
    }
}

impl From<Clustered> for Stage {
    fn from(s: Clustered) -> Self {
        Self::Clustered(s)
    }
}

impl From<Classified> for Stage {
    fn from(s: Classified) -> Self {
        Self::Classified(s)
    }
}

impl From<Fitted> for Stage {
    fn from(s: Fitted) -> Self {
        Self::Fitted(s)
    }
}

impl From<Synthesized> for Stage {
    fn from(s: Synthesized) -> Self {
        Self::Synthesized(s)
    }
}

// ───────────────────── Pipeline entry point ──────────────────────────

/// Incremental extraction pipeline.
///
/// [`Pipeline::new`] stores the cloud and config without doing any
/// work. Each stage method consumes the current state and returns the
/// next, so skipping or reordering stages is a compile-time error.
pub struct Pipeline;

impl Pipeline {
    /// Create a new pipeline over `cloud`.
    #[allow(clippy::new_ret_no_self)]
    pub const fn new(cloud: PointCloud, config: PipelineConfig) -> Pending {
        Pending { config, cloud }
    }
}
