//! Power-line centerline sampling.
//!
//! Stage 4 of the pipeline: each accepted line cluster is reduced to an
//! ordered polyline by sorting its points along the dominant horizontal
//! axis and keeping an evenly spaced subset.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::cluster::Cluster;
use crate::types::{Point3, PointCloud};

/// Maximum number of points in a fitted curve.
pub const MAX_CURVE_POINTS: usize = 20;

/// Horizontal axis a line is sorted along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    /// X if the box is at least as wide as it is deep, else Y.
    #[must_use]
    pub fn dominant(width: f64, depth: f64) -> Self {
        if width >= depth { Self::X } else { Self::Y }
    }

    /// The coordinate of `p` along this axis.
    #[must_use]
    pub const fn coordinate(self, p: Point3) -> f64 {
        match self {
            Self::X => p.x,
            Self::Y => p.y,
        }
    }
}

/// Ordered sample of a power line's points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerLineCurve {
    /// Label of the cluster the curve was fitted to.
    pub line_label: usize,
    /// Axis the points are sorted along.
    pub axis: Axis,
    /// At most [`MAX_CURVE_POINTS`] points, ascending along `axis`.
    pub points: Vec<Point3>,
}

/// Sample an ordered polyline from `line`.
///
/// Points are stably sorted along the dominant axis and every `N`-th
/// point is kept, `N = max(1, n / 20)`, stopping after
/// [`MAX_CURVE_POINTS`] points.
#[must_use]
pub fn fit(cloud: &PointCloud, line: &Cluster) -> PowerLineCurve {
    let axis = Axis::dominant(line.bbox.width(), line.bbox.depth());
    let mut sorted: Vec<Point3> = cloud.select(&line.indices).collect();
    sorted.sort_by(|a, b| axis.coordinate(*a).total_cmp(&axis.coordinate(*b)));

    let step = (sorted.len() / MAX_CURVE_POINTS).max(1);
    let points = sorted
        .into_iter()
        .step_by(step)
        .take(MAX_CURVE_POINTS)
        .collect();

    PowerLineCurve {
        line_label: line.label,
        axis,
        points,
    }
}

/// Fit every line, preserving input order.
#[must_use]
pub fn fit_all(cloud: &PointCloud, lines: &[Cluster]) -> Vec<PowerLineCurve> {
    lines.par_iter().map(|line| fit(cloud, line)).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Aabb;

    fn cluster_of(cloud: &PointCloud) -> Cluster {
        Cluster {
            label: 7,
            indices: (0..cloud.len()).collect(),
            bbox: cloud.bounds().unwrap(),
        }
    }

    #[test]
    fn empty_line_gives_empty_curve() {
        let line = Cluster {
            label: 0,
            indices: Vec::new(),
            bbox: Aabb {
                min: Point3::new(0.0, 0.0, 0.0),
                max: Point3::new(0.0, 0.0, 0.0),
            },
        };
        assert!(fit(&PointCloud::default(), &line).points.is_empty());
    }

    #[test]
    fn short_line_keeps_every_point_sorted() {
        let cloud = PointCloud::new(vec![
            Point3::new(3.0, 0.0, 1.0),
            Point3::new(1.0, 0.0, 2.0),
            Point3::new(2.0, 0.0, 3.0),
        ]);
        let curve = fit(&cloud, &cluster_of(&cloud));
        assert_eq!(curve.line_label, 7);
        assert_eq!(curve.axis, Axis::X);
        let xs: Vec<f64> = curve.points.iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn long_line_is_capped_and_monotonic() {
        let cloud: PointCloud = (0..200).rev().map(|i| Point3::new(0.0, f64::from(i), 10.0)).collect();
        let curve = fit(&cloud, &cluster_of(&cloud));
        assert_eq!(curve.axis, Axis::Y);
        assert_eq!(curve.points.len(), MAX_CURVE_POINTS);
        assert!(curve.points.windows(2).all(|w| w[0].y < w[1].y));
        // Step of 10 starting from the lowest coordinate.
        assert!((curve.points[1].y - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn mid_sized_line_is_truncated_to_cap() {
        // n = 30 gives a step of 1, so only the first 20 sorted points remain.
        let cloud: PointCloud = (0..30).map(|i| Point3::new(f64::from(i), 0.0, 0.0)).collect();
        let curve = fit(&cloud, &cluster_of(&cloud));
        assert_eq!(curve.points.len(), MAX_CURVE_POINTS);
        assert!((curve.points[19].x - 19.0).abs() < f64::EPSILON);
    }

    #[test]
    fn sort_is_stable_for_equal_coordinates() {
        let cloud = PointCloud::new(vec![
            Point3::new(1.0, 0.0, 5.0),
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 6.0),
        ]);
        let curve = fit(&cloud, &cluster_of(&cloud));
        let zs: Vec<f64> = curve.points.iter().map(|p| p.z).collect();
        assert_eq!(zs, vec![0.0, 5.0, 6.0]);
    }

    #[test]
    fn fit_all_preserves_order() {
        let cloud: PointCloud = (0..40).map(|i| Point3::new(f64::from(i), 0.0, 0.0)).collect();
        let a = Cluster {
            label: 3,
            indices: (0..20).collect(),
            bbox: cloud.bounds().unwrap(),
        };
        let b = Cluster {
            label: 1,
            indices: (20..40).collect(),
            ..a.clone()
        };
        let curves = fit_all(&cloud, &[a, b]);
        assert_eq!(curves[0].line_label, 3);
        assert_eq!(curves[1].line_label, 1);
    }
}
