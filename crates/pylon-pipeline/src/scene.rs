//! Deterministic synthetic corridor scenes.
//!
//! Used by the test suites and by `pylon-bench --demo`. Every generator
//! is a pure function of its arguments; random placement draws from a
//! seeded [`StdRng`].

use std::ops::Range;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::types::{Point3, PointCloud};

/// Points per side of one horizontal layer of [`column`].
const COLUMN_SIDE_POINTS: usize = 5;

/// `count` points scattered uniformly in the box
/// `[origin, origin + (width, depth, z_range))`.
#[must_use]
pub fn flat_ground(
    origin: Point3,
    width: f64,
    depth: f64,
    z_range: f64,
    count: usize,
    seed: u64,
) -> PointCloud {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            Point3::new(
                origin.x + rng.gen_range(0.0..width),
                origin.y + rng.gen_range(0.0..depth),
                origin.z + rng.gen_range(0.0..z_range.max(f64::MIN_POSITIVE)),
            )
        })
        .collect()
}

/// A dense square column: a lattice of `5 x 5` points per layer, layers
/// evenly spaced from `min_corner.z` to `min_corner.z + height`.
///
/// The lattice spans exactly `side x side x height`; the first `count`
/// lattice points are returned.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn column(min_corner: Point3, side: f64, height: f64, count: usize) -> PointCloud {
    let per_layer = COLUMN_SIDE_POINTS * COLUMN_SIDE_POINTS;
    let layers = count.div_ceil(per_layer).max(2);
    let step = side / (COLUMN_SIDE_POINTS - 1) as f64;
    let layer_step = height / (layers - 1) as f64;

    (0..layers)
        .flat_map(|l| (0..per_layer).map(move |k| (l, k)))
        .take(count)
        .map(|(l, k)| {
            let (i, j) = (k % COLUMN_SIDE_POINTS, k / COLUMN_SIDE_POINTS);
            Point3::new(
                min_corner.x + step * i as f64,
                min_corner.y + step * j as f64,
                min_corner.z + layer_step * l as f64,
            )
        })
        .collect()
}

/// A conductor hanging between `start` and `end` with a parabolic sag of
/// `sag` at mid-span.
///
/// Points alternate `±lateral` perpendicular to the span in the XY plane,
/// so the line has a horizontal thickness of `2 * lateral`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn sagging_line(start: Point3, end: Point3, sag: f64, lateral: f64, count: usize) -> PointCloud {
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let span = dx.hypot(dy);
    let (nx, ny) = if span > 0.0 {
        (-dy / span, dx / span)
    } else {
        (0.0, 0.0)
    };
    let last = count.saturating_sub(1).max(1) as f64;

    (0..count)
        .map(|i| {
            let t = i as f64 / last;
            let offset = if i % 2 == 0 { lateral } else { -lateral };
            let droop = sag * 4.0 * t * (1.0 - t);
            Point3::new(
                dx.mul_add(t, start.x) + nx * offset,
                dy.mul_add(t, start.y) + ny * offset,
                (end.z - start.z).mul_add(t, start.z) - droop,
            )
        })
        .collect()
}

/// A corridor scene with index ranges for each synthetic object.
pub struct Corridor {
    /// Concatenated ground, tower and line points.
    pub cloud: PointCloud,
    /// Indices of the ground plane points.
    pub ground: Range<usize>,
    /// Indices of the tower column points.
    pub tower: Range<usize>,
    /// Indices of the power-line points.
    pub line: Range<usize>,
}

/// Flat ground of 5,000 points, a `5 x 5 x 30` tower column of 500
/// points standing 20 m above it, and an 80 m span of 200 points sagging
/// from 30 m to 21 m above ground, 5 m clear of the tower.
#[must_use]
pub fn corridor(seed: u64) -> Corridor {
    let ground = flat_ground(Point3::new(-10.0, -22.5, 0.0), 120.0, 50.0, 0.1, 5_000, seed);
    let tower = column(Point3::new(0.0, 0.0, 20.0), 5.0, 30.0, 500);
    let line = sagging_line(
        Point3::new(10.0, 2.5, 30.0),
        Point3::new(90.0, 2.5, 30.0),
        9.0,
        0.25,
        200,
    );

    let ground_end = ground.len();
    let tower_end = ground_end + tower.len();
    let line_end = tower_end + line.len();

    let mut points = ground.into_points();
    points.extend(tower.into_points());
    points.extend(line.into_points());

    Corridor {
        cloud: PointCloud::new(points),
        ground: 0..ground_end,
        tower: ground_end..tower_end,
        line: tower_end..line_end,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn flat_ground_is_seeded() {
        let a = flat_ground(Point3::new(0.0, 0.0, 0.0), 10.0, 10.0, 1.0, 50, 3);
        let b = flat_ground(Point3::new(0.0, 0.0, 0.0), 10.0, 10.0, 1.0, 50, 3);
        assert_eq!(a, b);
        let bb = a.bounds().unwrap();
        assert!(bb.min.z >= 0.0 && bb.max.z < 1.0);
    }

    #[test]
    fn column_spans_requested_extent() {
        let col = column(Point3::new(1.0, 2.0, 20.0), 5.0, 30.0, 500);
        assert_eq!(col.len(), 500);
        let bb = col.bounds().unwrap();
        assert!((bb.width() - 5.0).abs() < 1e-9);
        assert!((bb.depth() - 5.0).abs() < 1e-9);
        assert!((bb.height() - 30.0).abs() < 1e-9);
        assert!((bb.min.z - 20.0).abs() < 1e-9);
    }

    #[test]
    fn sagging_line_droops_at_mid_span() {
        let line = sagging_line(
            Point3::new(0.0, 0.0, 30.0),
            Point3::new(80.0, 0.0, 30.0),
            9.0,
            0.25,
            201,
        );
        let mid = line.get(100).unwrap();
        assert!((mid.z - 21.0).abs() < 1e-9);
        let bb = line.bounds().unwrap();
        assert!((bb.depth() - 0.5).abs() < 1e-9);
        assert!((bb.width() - 80.0).abs() < 1e-9);
    }

    #[test]
    fn corridor_ranges_cover_cloud() {
        let scene = corridor(1);
        assert_eq!(scene.ground.len(), 5_000);
        assert_eq!(scene.tower.len(), 500);
        assert_eq!(scene.line.len(), 200);
        assert_eq!(scene.line.end, scene.cloud.len());
    }
}
