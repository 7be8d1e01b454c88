//! Density-based clustering of non-ground points.
//!
//! This is stage 2 of the pipeline. Before DBSCAN runs, its parameters
//! are adapted to the input:
//!
//! 1. Tall inputs (Z range above `tall_height_range`) get a looser
//!    `eps`, since towers are sparse along their height.
//! 2. Large inputs are voxel-downsampled and `min_points` is scaled by
//!    the kept fraction, with a floor. Inputs that are still very large
//!    after downsampling get a further `eps` increase and a higher floor.
//!
//! After clustering, clusters that are too flat, too small in volume or
//! too sparse are dropped as noise-scale artifacts.
//!
//! Nothing here is random: for a fixed input order and configuration the
//! labels are identical on every run.

use std::collections::VecDeque;

use rstar::RTree;
use rstar::primitives::GeomWithData;
use serde::{Deserialize, Serialize};

use crate::config::ClusterConfig;
use crate::types::{Aabb, PointCloud};
use crate::voxel::voxel_downsample;

/// DBSCAN label of one processed point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterLabel {
    /// Not density-reachable from any core point.
    Noise,
    /// Member of the cluster with this label.
    Cluster(usize),
}

/// A spatially coherent group of points sharing one DBSCAN label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// DBSCAN label (discovery order, before filtering).
    pub label: usize,
    /// Indices into the canonical cloud, ascending.
    pub indices: Vec<usize>,
    /// Bounding box of the member points.
    pub bbox: Aabb,
}

impl Cluster {
    /// Number of member points.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.indices.len()
    }

    /// Returns `true` if the cluster has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// DBSCAN parameters after size adaptation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptedParams {
    /// Neighborhood radius actually used.
    pub eps: f64,
    /// Core point threshold actually used (also the cluster size floor).
    pub min_points: usize,
    /// Whether voxel downsampling was applied.
    pub downsampled: bool,
}

/// Output of the cluster analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringResult {
    /// Indices (into the canonical cloud) of the points that were clustered.
    pub processed: Vec<usize>,
    /// `labels[i]` is the DBSCAN label of `processed[i]`.
    pub labels: Vec<ClusterLabel>,
    /// Clusters that passed the size filter, in label order.
    pub clusters: Vec<Cluster>,
    /// Number of DBSCAN clusters before filtering.
    pub raw_cluster_count: usize,
    /// Parameters actually used.
    pub params: AdaptedParams,
}

impl ClusteringResult {
    fn empty(config: &ClusterConfig) -> Self {
        Self {
            processed: Vec::new(),
            labels: Vec::new(),
            clusters: Vec::new(),
            raw_cluster_count: 0,
            params: AdaptedParams {
                eps: config.eps,
                min_points: config.min_points,
                downsampled: false,
            },
        }
    }

    /// Number of processed points labeled noise.
    #[must_use]
    pub fn noise_count(&self) -> usize {
        self.labels
            .iter()
            .filter(|l| matches!(l, ClusterLabel::Noise))
            .count()
    }
}

impl Default for ClusteringResult {
    fn default() -> Self {
        Self::empty(&ClusterConfig::default())
    }
}

/// Cluster the points of `cloud` selected by `indices`.
///
/// An empty selection yields an empty result.
#[must_use]
pub fn cluster(cloud: &PointCloud, indices: &[usize], config: &ClusterConfig) -> ClusteringResult {
    let Some((processed, params)) = adapt(cloud, indices, config) else {
        return ClusteringResult::empty(config);
    };

    let labels = dbscan(cloud, &processed, params.eps, params.min_points);

    let raw_cluster_count = labels
        .iter()
        .filter_map(|l| match l {
            ClusterLabel::Cluster(id) => Some(id + 1),
            ClusterLabel::Noise => None,
        })
        .max()
        .unwrap_or(0);

    let mut members: Vec<Vec<usize>> = vec![Vec::new(); raw_cluster_count];
    for (&index, label) in processed.iter().zip(&labels) {
        if let ClusterLabel::Cluster(id) = label {
            members[*id].push(index);
        }
    }

    let clusters: Vec<Cluster> = members
        .into_iter()
        .enumerate()
        .filter_map(|(label, indices)| {
            let bbox = Aabb::from_points(cloud.select(&indices))?;
            let keep = bbox.height() > config.min_cluster_height
                && bbox.volume() > config.min_cluster_volume
                && indices.len() >= params.min_points;
            keep.then_some(Cluster {
                label,
                indices,
                bbox,
            })
        })
        .collect();

    log::debug!(
        "clustering: {} points, eps={:.3}, min_points={}, {} raw clusters, {} kept",
        processed.len(),
        params.eps,
        params.min_points,
        raw_cluster_count,
        clusters.len(),
    );

    ClusteringResult {
        processed,
        labels,
        clusters,
        raw_cluster_count,
        params,
    }
}

/// Choose the working point set and DBSCAN parameters for `indices`.
///
/// Returns `None` when no listed index resolves to a point.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn adapt(
    cloud: &PointCloud,
    indices: &[usize],
    config: &ClusterConfig,
) -> Option<(Vec<usize>, AdaptedParams)> {
    let bounds = Aabb::from_points(cloud.select(indices))?;

    let mut eps = config.eps;
    if bounds.height() > config.tall_height_range {
        eps *= config.tall_eps_scale;
    }

    if indices.len() <= config.downsample_threshold {
        return Some((
            indices.to_vec(),
            AdaptedParams {
                eps,
                min_points: config.min_points,
                downsampled: false,
            },
        ));
    }

    let kept = voxel_downsample(cloud, indices, config.voxel_size);
    let ratio = kept.len() as f64 / indices.len() as f64;
    let mut floor = config.min_points_floor;
    if kept.len() > config.dense_threshold {
        eps *= config.dense_eps_scale;
        floor = config.dense_min_points_floor;
    }
    let min_points = ((config.min_points as f64 * ratio).floor() as usize).max(floor);

    Some((
        kept,
        AdaptedParams {
            eps,
            min_points,
            downsampled: true,
        },
    ))
}

/// Classic DBSCAN over the points selected by `processed`.
///
/// A point is a core point when at least `min_points` points (itself
/// included) lie within `eps`. Points are visited in `processed` order
/// and clusters are numbered in discovery order; a border point joins
/// the first cluster that reaches it.
///
/// Returns one label per entry of `processed`.
#[must_use]
pub fn dbscan(cloud: &PointCloud, processed: &[usize], eps: f64, min_points: usize) -> Vec<ClusterLabel> {
    let points: Vec<[f64; 3]> = processed
        .iter()
        .filter_map(|&i| cloud.get(i))
        .map(|p| p.to_array())
        .collect();
    if points.len() != processed.len() {
        return vec![ClusterLabel::Noise; processed.len()];
    }

    let tree = RTree::bulk_load(
        points
            .iter()
            .enumerate()
            .map(|(pos, &p)| GeomWithData::new(p, pos))
            .collect(),
    );
    let eps_squared = eps * eps;
    let region = |pos: usize| -> Vec<usize> {
        let mut found: Vec<usize> = tree
            .locate_within_distance(points[pos], eps_squared)
            .map(|entry| entry.data)
            .collect();
        found.sort_unstable();
        found
    };

    let mut labels: Vec<Option<ClusterLabel>> = vec![None; points.len()];
    let mut frontier = Frontier::new(points.len());
    let mut next_id = 0;

    for pos in 0..points.len() {
        if labels[pos].is_some() {
            continue;
        }
        let neighbors = region(pos);
        if neighbors.len() < min_points {
            labels[pos] = Some(ClusterLabel::Noise);
            continue;
        }

        let id = next_id;
        next_id += 1;
        labels[pos] = Some(ClusterLabel::Cluster(id));

        frontier.extend(neighbors.into_iter().filter(|&n| n != pos));
        while let Some(q) = frontier.pop() {
            match labels[q] {
                Some(ClusterLabel::Cluster(_)) => {}
                Some(ClusterLabel::Noise) => labels[q] = Some(ClusterLabel::Cluster(id)),
                None => {
                    labels[q] = Some(ClusterLabel::Cluster(id));
                    let expansion = region(q);
                    if expansion.len() >= min_points {
                        frontier.extend(
                            expansion
                                .into_iter()
                                .filter(|&n| !matches!(labels[n], Some(ClusterLabel::Cluster(_)))),
                        );
                    }
                }
            }
        }
    }

    labels
        .into_iter()
        .map(|l| l.unwrap_or(ClusterLabel::Noise))
        .collect()
}

/// Expansion queue that admits each point at most once per run.
///
/// Every admitted point is labeled when popped, so the queue never holds
/// more than one entry per processed point.
struct Frontier {
    queue: VecDeque<usize>,
    admitted: Vec<bool>,
}

impl Frontier {
    fn new(len: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            admitted: vec![false; len],
        }
    }

    fn extend(&mut self, positions: impl IntoIterator<Item = usize>) {
        for pos in positions {
            if !self.admitted[pos] {
                self.admitted[pos] = true;
                self.queue.push_back(pos);
            }
        }
    }

    fn pop(&mut self) -> Option<usize> {
        self.queue.pop_front()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::scene;
    use crate::types::Point3;

    fn all_indices(cloud: &PointCloud) -> Vec<usize> {
        (0..cloud.len()).collect()
    }

    fn lattice(xs: &[f64], ys: &[f64], zs: &[f64]) -> PointCloud {
        xs.iter()
            .flat_map(|&x| ys.iter().flat_map(move |&y| zs.iter().map(move |&z| Point3::new(x, y, z))))
            .collect()
    }

    fn steps(n: u32, step: f64) -> Vec<f64> {
        (0..=n).map(|i| f64::from(i) * step).collect()
    }

    /// Clusters kept from a lattice that DBSCAN groups into one cluster.
    fn kept_count(cloud: &PointCloud, config: &ClusterConfig) -> usize {
        let result = cluster(cloud, &all_indices(cloud), config);
        assert_eq!(result.raw_cluster_count, 1);
        result.clusters.len()
    }

    #[test]
    fn empty_input_is_empty_result() {
        let result = cluster(&PointCloud::default(), &[], &ClusterConfig::default());
        assert!(result.clusters.is_empty());
        assert!(result.labels.is_empty());
        assert_eq!(result.raw_cluster_count, 0);
    }

    #[test]
    fn dbscan_separates_distant_groups() {
        let mut points = Vec::new();
        for i in 0..5 {
            points.push(Point3::new(f64::from(i) * 0.5, 0.0, 0.0));
        }
        for i in 0..5 {
            points.push(Point3::new(100.0 + f64::from(i) * 0.5, 0.0, 0.0));
        }
        points.push(Point3::new(50.0, 50.0, 50.0));
        let cloud = PointCloud::new(points);

        let labels = dbscan(&cloud, &all_indices(&cloud), 1.0, 3);
        assert_eq!(labels[0], ClusterLabel::Cluster(0));
        assert_eq!(labels[4], ClusterLabel::Cluster(0));
        assert_eq!(labels[5], ClusterLabel::Cluster(1));
        assert_eq!(labels[10], ClusterLabel::Noise);
    }

    #[test]
    fn dbscan_neighbor_count_includes_self() {
        // Two points 0.5 apart: with min_points = 2 each is core.
        let cloud = PointCloud::new(vec![Point3::new(0.0, 0.0, 0.0), Point3::new(0.5, 0.0, 0.0)]);
        let labels = dbscan(&cloud, &[0, 1], 1.0, 2);
        assert_eq!(labels, vec![ClusterLabel::Cluster(0), ClusterLabel::Cluster(0)]);
        let labels = dbscan(&cloud, &[0, 1], 1.0, 3);
        assert_eq!(labels, vec![ClusterLabel::Noise, ClusterLabel::Noise]);
    }

    #[test]
    fn dbscan_border_point_joins_cluster_but_does_not_expand() {
        // Dense run up to 1.0, border at 2.0, and 3.0 reachable only via 2.0.
        let cloud: PointCloud = [0.0, 0.25, 0.5, 0.75, 1.0, 2.0, 3.0]
            .iter()
            .map(|&x| Point3::new(x, 0.0, 0.0))
            .collect();
        let labels = dbscan(&cloud, &all_indices(&cloud), 1.0, 4);
        assert_eq!(labels[4], ClusterLabel::Cluster(0));
        assert_eq!(labels[5], ClusterLabel::Cluster(0));
        assert_eq!(labels[6], ClusterLabel::Noise);
    }

    #[test]
    fn dbscan_is_deterministic() {
        let cloud = scene::column(Point3::new(0.0, 0.0, 0.0), 5.0, 30.0, 500);
        let a = dbscan(&cloud, &all_indices(&cloud), 2.5, 10);
        let b = dbscan(&cloud, &all_indices(&cloud), 2.5, 10);
        assert_eq!(a, b);
    }

    #[test]
    fn tower_column_forms_one_cluster() {
        let cloud = scene::column(Point3::new(0.0, 0.0, 20.0), 5.0, 30.0, 500);
        let result = cluster(&cloud, &all_indices(&cloud), &ClusterConfig::default());
        assert_eq!(result.clusters.len(), 1);
        assert_eq!(result.clusters[0].len(), 500);
        assert_eq!(result.noise_count(), 0);
    }

    #[test]
    fn flat_patch_is_filtered_by_height() {
        // Dense but flat: height 0 fails the height > 2.0 filter.
        let points: Vec<Point3> = (0..20)
            .flat_map(|x| (0..20).map(move |y| Point3::new(f64::from(x), f64::from(y), 5.0)))
            .collect();
        let cloud = PointCloud::new(points);
        let result = cluster(&cloud, &all_indices(&cloud), &ClusterConfig::default());
        assert_eq!(result.raw_cluster_count, 1);
        assert!(result.clusters.is_empty());
    }

    #[test]
    fn surviving_clusters_satisfy_filters() {
        let scene = scene::corridor(5);
        let indices: Vec<usize> = scene.tower.clone().chain(scene.line.clone()).collect();
        let config = ClusterConfig::default();
        let result = cluster(&scene.cloud, &indices, &config);
        assert_eq!(result.clusters.len(), 2);
        for c in &result.clusters {
            assert!(c.bbox.height() > config.min_cluster_height);
            assert!(c.bbox.volume() > config.min_cluster_volume);
            assert!(c.len() >= result.params.min_points);
        }
    }

    #[test]
    fn height_exactly_at_threshold_is_dropped() {
        let config = ClusterConfig::default();
        let grid = steps(10, 1.0);
        assert_eq!(kept_count(&lattice(&grid, &grid, &[0.0, 1.0, 2.0]), &config), 0);
        assert_eq!(kept_count(&lattice(&grid, &grid, &[0.0, 1.0, 2.25]), &config), 1);
    }

    #[test]
    fn volume_exactly_at_threshold_is_dropped() {
        // 1 x 1 x 10 box: height passes, volume is exactly 10.
        let config = ClusterConfig::default();
        let side = [0.0, 0.5, 1.0];
        let mut zs = steps(10, 1.0);
        assert_eq!(kept_count(&lattice(&side, &side, &zs), &config), 0);
        zs.push(10.5);
        assert_eq!(kept_count(&lattice(&side, &side, &zs), &config), 1);
    }

    #[test]
    fn cluster_of_exactly_min_points_is_kept() {
        // Corners of a 3 m cube plus two interior points, all within eps.
        let mut points: Vec<Point3> = lattice(&[0.0, 3.0], &[0.0, 3.0], &[0.0, 3.0]).into_points();
        points.push(Point3::new(1.5, 1.5, 1.0));
        points.push(Point3::new(1.5, 1.5, 2.0));
        let cloud = PointCloud::new(points);
        let config = ClusterConfig {
            eps: 20.0,
            ..ClusterConfig::default()
        };
        let result = cluster(&cloud, &all_indices(&cloud), &config);
        assert_eq!(result.params.min_points, 10);
        assert_eq!(result.clusters.len(), 1);
        assert_eq!(result.clusters[0].len(), 10);
    }

    #[test]
    fn dense_blob_forms_one_cluster() {
        // Every point neighbors every other one.
        let cloud = lattice(&steps(9, 0.1), &steps(9, 0.1), &steps(19, 0.05));
        let labels = dbscan(&cloud, &all_indices(&cloud), 2.5, 10);
        assert_eq!(labels.len(), 2_000);
        assert!(labels.iter().all(|l| *l == ClusterLabel::Cluster(0)));
    }

    #[test]
    fn frontier_admits_each_point_once() {
        let mut frontier = Frontier::new(4);
        frontier.extend([1, 2, 1, 3, 2]);
        frontier.extend([3, 0]);
        let mut order = Vec::new();
        while let Some(pos) = frontier.pop() {
            order.push(pos);
        }
        assert_eq!(order, vec![1, 2, 3, 0]);
        frontier.extend([0, 1, 2, 3]);
        assert_eq!(frontier.pop(), None);
    }

    #[test]
    fn tall_input_scales_eps() {
        let cloud = PointCloud::new(vec![Point3::new(0.0, 0.0, 0.0), Point3::new(0.0, 0.0, 60.0)]);
        let (_, params) = adapt(&cloud, &[0, 1], &ClusterConfig::default()).unwrap();
        assert!((params.eps - 2.5 * 1.5).abs() < 1e-12);
        assert!(!params.downsampled);
    }

    #[test]
    fn large_input_is_downsampled_and_min_points_scaled() {
        // 60_000 points, 2 per voxel: half are dropped.
        let points: Vec<Point3> = (0..30_000)
            .flat_map(|i| {
                let base = Point3::new(f64::from(i % 200), f64::from(i / 200), 0.0);
                [0.09, 0.11].map(|o| Point3::new(base.x + o, base.y + o, base.z + o))
            })
            .collect();
        let cloud = PointCloud::new(points);
        let config = ClusterConfig {
            min_points: 30,
            voxel_size: 0.2,
            ..ClusterConfig::default()
        };
        let (kept, params) = adapt(&cloud, &all_indices(&cloud), &config).unwrap();
        assert_eq!(kept.len(), 30_000);
        assert!(params.downsampled);
        assert_eq!(params.min_points, 15);
        assert!((params.eps - config.eps).abs() < 1e-12);
    }

    #[test]
    fn min_points_respects_floor_after_downsampling() {
        let points: Vec<Point3> = (0..60_000)
            .map(|i| Point3::new(0.1 + f64::from(i) * 1e-7, 0.1, 0.1))
            .collect();
        let cloud = PointCloud::new(points);
        let (kept, params) = adapt(&cloud, &all_indices(&cloud), &ClusterConfig::default()).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(params.min_points, 5);
    }

    #[test]
    fn very_dense_input_relaxes_eps_and_raises_floor() {
        let threshold = 1_000;
        let config = ClusterConfig {
            downsample_threshold: threshold,
            dense_threshold: 500,
            min_points: 10,
            ..ClusterConfig::default()
        };
        // 1_200 points in separate voxels: nothing is merged.
        let points: Vec<Point3> = (0..1_200).map(|i| Point3::new(f64::from(i), 0.0, 0.0)).collect();
        let cloud = PointCloud::new(points);
        let (kept, params) = adapt(&cloud, &all_indices(&cloud), &config).unwrap();
        assert_eq!(kept.len(), 1_200);
        assert!((params.eps - config.eps * 1.2).abs() < 1e-12);
        assert_eq!(params.min_points, 10);
    }
}
