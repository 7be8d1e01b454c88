//! Voxel downsampling of an index subset.
//!
//! Large non-ground subsets are thinned before clustering so DBSCAN's
//! neighborhood queries stay affordable. One input point is *selected*
//! per occupied voxel (the one closest to the voxel center), so the
//! output is still a list of indices into the canonical cloud.

use std::collections::HashMap;

use crate::types::{Point3, PointCloud};

/// Integer voxel coordinates.
type VoxelKey = (i64, i64, i64);

/// Keep one representative index per `voxel_size` cube.
///
/// The representative is the point nearest the voxel center; ties go to
/// the lowest index. The result is sorted ascending, so it does not
/// depend on hash iteration order.
///
/// Returns `indices` unchanged when `voxel_size` is not positive.
#[must_use]
pub fn voxel_downsample(cloud: &PointCloud, indices: &[usize], voxel_size: f64) -> Vec<usize> {
    if voxel_size <= 0.0 || !voxel_size.is_finite() {
        return indices.to_vec();
    }

    let mut voxels: HashMap<VoxelKey, (usize, f64)> = HashMap::new();
    for &index in indices {
        let Some(point) = cloud.get(index) else {
            continue;
        };
        let key = voxel_key(point, voxel_size);
        let dist = point.distance_squared(voxel_center(key, voxel_size));
        voxels
            .entry(key)
            .and_modify(|best| {
                if (dist, index) < (best.1, best.0) {
                    *best = (index, dist);
                }
            })
            .or_insert((index, dist));
    }

    let mut kept: Vec<usize> = voxels.into_values().map(|(index, _)| index).collect();
    kept.sort_unstable();
    log::debug!(
        "voxel downsample: {} -> {} points (voxel {voxel_size})",
        indices.len(),
        kept.len(),
    );
    kept
}

#[allow(clippy::cast_possible_truncation)]
fn voxel_key(point: Point3, voxel_size: f64) -> VoxelKey {
    (
        (point.x / voxel_size).floor() as i64,
        (point.y / voxel_size).floor() as i64,
        (point.z / voxel_size).floor() as i64,
    )
}

#[allow(clippy::cast_precision_loss)]
fn voxel_center(key: VoxelKey, voxel_size: f64) -> Point3 {
    Point3::new(
        (key.0 as f64 + 0.5) * voxel_size,
        (key.1 as f64 + 0.5) * voxel_size,
        (key.2 as f64 + 0.5) * voxel_size,
    )
}
