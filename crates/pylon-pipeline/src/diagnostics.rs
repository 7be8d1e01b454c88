//! Pipeline diagnostics: timing, counts, and other metrics for each stage.
//!
//! These are permanent instrumentation for threshold tuning. The time
//! source is injected through the [`Clock`] trait so the library never
//! reads the system clock itself; the bench binary supplies one backed
//! by [`std::time::Instant`] and tests supply a deterministic one.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::params::Provenance;
use crate::pipeline::Pipeline;
use crate::types::{ExtractionResult, PipelineError, PointCloud};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// A monotonic time source.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// The current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Diagnostics collected from a single pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Stage 1: ground segmentation (includes input validation).
    pub ground: StageDiagnostics,
    /// Stage 2: clustering.
    pub clustering: StageDiagnostics,
    /// Stage 3: tower / line classification.
    pub classification: StageDiagnostics,
    /// Stage 4: curve fitting.
    pub curve_fitting: StageDiagnostics,
    /// Stage 5: parameter synthesis.
    pub synthesis: StageDiagnostics,
    /// Total wall-clock duration of the entire pipeline (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics that vary by pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Ground segmentation metrics.
    GroundSegmentation {
        /// Raster cell edge length.
        cell_size: f64,
        /// Raster columns.
        cols: usize,
        /// Raster rows.
        rows: usize,
        /// Cells holding at least one point.
        occupied_cells: usize,
        /// Morphological passes run.
        passes: usize,
        /// Points classified as ground.
        ground_count: usize,
        /// Points classified as non-ground.
        non_ground_count: usize,
        /// Mean ground height.
        plane_height: f64,
    },
    /// Clustering metrics.
    Clustering {
        /// Non-ground points handed to the clusterer.
        input_count: usize,
        /// Points actually clustered (after any downsampling).
        processed_count: usize,
        /// Neighborhood radius used.
        eps: f64,
        /// Core point threshold used.
        min_points: usize,
        /// Whether voxel downsampling ran.
        downsampled: bool,
        /// Clusters before the size filter.
        raw_cluster_count: usize,
        /// Clusters after the size filter.
        cluster_count: usize,
        /// Processed points labeled noise.
        noise_count: usize,
    },
    /// Classification metrics.
    Classification {
        /// Clusters examined.
        cluster_count: usize,
        /// Ground reference height.
        ground_height: f64,
        /// Clusters passing the tower rule.
        tower_candidates: usize,
        /// Point count of the selected tower.
        tower_points: Option<usize>,
        /// Score of the selected tower.
        tower_score: Option<f64>,
        /// Clusters passing the line rule.
        line_candidates: usize,
        /// Lines kept after the span filter.
        line_count: usize,
    },
    /// Curve fitting metrics.
    CurveFitting {
        /// Curves produced.
        curve_count: usize,
        /// Points across all line clusters.
        input_point_count: usize,
        /// Points across all curves.
        output_point_count: usize,
    },
    /// Parameter synthesis metrics.
    Synthesis {
        /// Random seed used.
        seed: u64,
        /// Records produced.
        record_count: usize,
        /// Whether the records are measured or synthetic.
        provenance: Provenance,
    },
}

/// High-level summary counts for the entire pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Input point count.
    pub point_count: usize,
    /// Ground points.
    pub ground_count: usize,
    /// Clusters after the size filter.
    pub cluster_count: usize,
    /// Whether a tower was selected.
    pub tower_found: bool,
    /// Power lines kept.
    pub line_count: usize,
    /// Parameter records produced.
    pub parameter_count: usize,
    /// Whether the records came from the fallback.
    pub synthetic: bool,
}

impl PipelineSummary {
    fn from_result(result: &ExtractionResult) -> Self {
        Self {
            point_count: result.cloud.len(),
            ground_count: result.ground.ground.len(),
            cluster_count: result.clustering.clusters.len(),
            tower_found: result.classification.tower.is_some(),
            line_count: result.classification.power_lines.len(),
            parameter_count: result.parameters.parameters.len(),
            synthetic: result.parameters.is_synthetic(),
        }
    }
}

impl PipelineDiagnostics {
    /// Per-stage diagnostics in execution order, with display names.
    #[must_use]
    pub fn stages(&self) -> [(&'static str, &StageDiagnostics); 5] {
        [
            ("Ground Segmentation", &self.ground),
            ("Clustering", &self.clustering),
            ("Classification", &self.classification),
            ("Curve Fitting", &self.curve_fitting),
            ("Synthesis", &self.synthesis),
        ]
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Points: {} ({} ground)",
            self.summary.point_count, self.summary.ground_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for (name, diag) in self.stages() {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Clusters: {}  |  Tower: {}  |  Lines: {}  |  Parameters: {}{}",
            self.summary.cluster_count,
            if self.summary.tower_found { "yes" } else { "no" },
            self.summary.line_count,
            self.summary.parameter_count,
            if self.summary.synthetic {
                " (synthetic)"
            } else {
                ""
            },
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::GroundSegmentation {
            cell_size,
            cols,
            rows,
            passes,
            ground_count,
            non_ground_count,
            plane_height,
            ..
        } => format!(
            "cell={cell_size:.2} grid={cols}x{rows} passes={passes} ground={ground_count} other={non_ground_count} plane={plane_height:.2}",
        ),
        StageMetrics::Clustering {
            processed_count,
            eps,
            min_points,
            downsampled,
            raw_cluster_count,
            cluster_count,
            noise_count,
            ..
        } => format!(
            "{processed_count} pts{} eps={eps:.2} min={min_points} clusters={raw_cluster_count}->{cluster_count} noise={noise_count}",
            if *downsampled { " (voxel)" } else { "" },
        ),
        StageMetrics::Classification {
            cluster_count,
            tower_candidates,
            tower_score,
            line_candidates,
            line_count,
            ..
        } => {
            let tower = tower_score.map_or_else(|| "none".to_string(), |s| format!("score={s:.2}"));
            format!(
                "{cluster_count} clusters, tower {tower} ({tower_candidates} candidates), lines {line_candidates}->{line_count}",
            )
        }
        StageMetrics::CurveFitting {
            curve_count,
            input_point_count,
            output_point_count,
        } => format!("{curve_count} curves, {input_point_count}->{output_point_count} pts"),
        StageMetrics::Synthesis {
            seed,
            record_count,
            provenance,
        } => format!("{record_count} records ({provenance:?}) seed={seed}"),
    }
}

/// Run the full pipeline, timing every stage with `clock`.
///
/// # Errors
///
/// Returns the same errors as [`crate::extract`].
pub fn process_with_diagnostics<C: Clock>(
    cloud: PointCloud,
    config: &PipelineConfig,
    clock: &C,
) -> Result<(ExtractionResult, PipelineDiagnostics), PipelineError> {
    let total_start = clock.now();

    let start = clock.now();
    let segmented = Pipeline::new(cloud, config.clone()).segment()?;
    let ground = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: segmented.stage_metrics(),
    };

    let start = clock.now();
    let clustered = segmented.cluster();
    let clustering = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: clustered.stage_metrics(),
    };

    let start = clock.now();
    let classified = clustered.classify();
    let classification = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: classified.stage_metrics(),
    };

    let start = clock.now();
    let fitted = classified.fit_curves();
    let curve_fitting = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: fitted.stage_metrics(),
    };

    let start = clock.now();
    let synthesized = fitted.synthesize();
    let synthesis = StageDiagnostics {
        duration: clock.elapsed(&start),
        metrics: synthesized.stage_metrics(),
    };

    let result = synthesized.into_result();
    let diagnostics = PipelineDiagnostics {
        ground,
        clustering,
        classification,
        curve_fitting,
        synthesis,
        total_duration: clock.elapsed(&total_start),
        summary: PipelineSummary::from_result(&result),
    };
    Ok((result, diagnostics))
}
