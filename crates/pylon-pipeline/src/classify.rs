//! Rule-based tower and power-line classification.
//!
//! Stage 3 of the pipeline. Each surviving cluster is reduced to a small
//! set of bounding-box features, then tested against fixed geometric
//! rules. At most one tower is selected (the best-scoring candidate);
//! power lines are the non-tower clusters that look like long, thin,
//! elevated spans, optionally constrained to hang near the tower.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cluster::Cluster;
use crate::config::{ClassifierConfig, LineRule, SpanFilter, TowerRule, TowerScore};
use crate::types::{Aabb, Point3, PointCloud};

/// Shape features of one cluster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterFeatures {
    pub width: f64,
    pub depth: f64,
    pub height: f64,
    pub center: Point3,
    /// `center.z - ground_height`.
    pub relative_height: f64,
    pub volume: f64,
    pub base_area: f64,
    /// `max(width, depth) / min(width, depth)`.
    pub horizontal_aspect: f64,
    /// `height / min(width, depth)`.
    pub vertical_aspect: f64,
    /// Points per unit volume; `0.0` for a flat box.
    pub density: f64,
    pub point_count: usize,
}

impl ClusterFeatures {
    /// Compute the features of `cluster` relative to `ground_height`.
    #[must_use]
    pub fn from_cluster(cluster: &Cluster, ground_height: f64) -> Self {
        Self::from_bbox(&cluster.bbox, cluster.len(), ground_height)
    }

    #[allow(clippy::cast_precision_loss)]
    fn from_bbox(bbox: &Aabb, point_count: usize, ground_height: f64) -> Self {
        let width = bbox.width();
        let depth = bbox.depth();
        let height = bbox.height();
        let center = bbox.center();
        let volume = bbox.volume();
        let narrow = width.min(depth);

        Self {
            width,
            depth,
            height,
            center,
            relative_height: center.z - ground_height,
            volume,
            base_area: bbox.base_area(),
            horizontal_aspect: ratio(width.max(depth), narrow),
            vertical_aspect: ratio(height, narrow),
            density: if volume > 0.0 {
                point_count as f64 / volume
            } else {
                0.0
            },
            point_count,
        }
    }

    /// Whether every tower criterion holds.
    #[must_use]
    pub fn is_tower_candidate(&self, rule: &TowerRule) -> bool {
        self.relative_height > rule.min_relative_height
            && self.height > rule.min_height
            && self.vertical_aspect > rule.min_vertical_aspect
            && self.horizontal_aspect < rule.max_horizontal_aspect
            && self.base_area > rule.min_base_area
            && self.volume > rule.min_volume
            && self.density > rule.min_density
            && self.point_count > rule.min_points
    }

    /// Whether every power-line criterion holds.
    #[must_use]
    pub fn is_line_candidate(&self, rule: &LineRule) -> bool {
        let elongated = self.horizontal_aspect > rule.min_horizontal_aspect
            || ratio(self.width, self.depth) > rule.min_width_depth_ratio;
        self.relative_height > rule.min_relative_height
            && self.height > rule.min_height
            && elongated
            && self.volume > rule.min_volume
            && self.volume < rule.max_volume
            && self.point_count > rule.min_points
            && self.point_count < rule.max_points
    }

    /// Weighted tower ranking score.
    #[must_use]
    pub fn tower_score(&self, weights: &TowerScore) -> f64 {
        weights.density.mul_add(
            self.density,
            weights
                .relative_height
                .mul_add(self.relative_height, weights.volume * self.volume),
        )
    }
}

/// `num / den`, with a zero denominator treated as infinitely elongated.
fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 { num / den } else { f64::INFINITY }
}

/// Height the classifier measures clusters against: the maximum Z of the
/// ground points, or `0.0` when there are none.
#[must_use]
pub fn ground_reference_height(cloud: &PointCloud, ground: &[usize]) -> f64 {
    cloud
        .select(ground)
        .map(|p| p.z)
        .reduce(f64::max)
        .unwrap_or(0.0)
}

/// Selected tower and power lines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InfrastructureClassification {
    /// Best-scoring tower candidate, if any.
    pub tower: Option<Cluster>,
    /// Bounding box of [`tower`](Self::tower).
    pub tower_bbox: Option<Aabb>,
    /// Score of [`tower`](Self::tower).
    pub tower_score: Option<f64>,
    /// Accepted power-line clusters, in cluster order.
    pub power_lines: Vec<Cluster>,
    /// Ground reference height the features were measured against.
    pub ground_height: f64,
    /// Clusters that passed the tower rule.
    pub tower_candidates: usize,
    /// Clusters that passed the line rule, before the span filter.
    pub line_candidates: usize,
}

/// Classify `clusters` into at most one tower and any number of lines.
#[must_use]
pub fn classify(
    clusters: &[Cluster],
    ground_height: f64,
    config: &ClassifierConfig,
) -> InfrastructureClassification {
    let features: Vec<ClusterFeatures> = clusters
        .par_iter()
        .map(|c| ClusterFeatures::from_cluster(c, ground_height))
        .collect();

    let mut best: Option<(usize, f64)> = None;
    let mut tower_candidates = 0;
    let mut lines: Vec<usize> = Vec::new();

    for (i, f) in features.iter().enumerate() {
        if f.is_tower_candidate(&config.tower) {
            tower_candidates += 1;
            let score = f.tower_score(&config.score);
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((i, score));
            }
        } else if f.is_line_candidate(&config.line) {
            lines.push(i);
        }
    }

    let line_candidates = lines.len();
    if let Some((tower, _)) = best {
        let anchor = features[tower].center;
        lines.retain(|&i| within_span(&features[i], anchor, ground_height, &config.span));
    }

    let tower = best.map(|(i, _)| clusters[i].clone());
    if let (Some(t), Some((_, score))) = (&tower, best) {
        log::info!(
            "tower selected: cluster {} ({} points, score {score:.3}) among {tower_candidates} candidates",
            t.label,
            t.len(),
        );
    }
    log::debug!(
        "classification: {line_candidates} line candidates, {} kept",
        lines.len()
    );

    InfrastructureClassification {
        tower_bbox: tower.as_ref().map(|t| t.bbox),
        tower,
        tower_score: best.map(|(_, s)| s),
        power_lines: lines.into_iter().map(|i| clusters[i].clone()).collect(),
        ground_height,
        tower_candidates,
        line_candidates,
    }
}

fn within_span(line: &ClusterFeatures, tower_center: Point3, ground_height: f64, span: &SpanFilter) -> bool {
    let distance = line.center.horizontal_distance(tower_center);
    distance > span.min_distance
        && distance < span.max_distance
        && line.center.z < tower_center.z
        && line.center.z > ground_height + span.min_clearance
}
