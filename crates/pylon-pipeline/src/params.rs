//! Physical parameter synthesis for detected power lines.
//!
//! Stage 5 of the pipeline. Span geometry comes from the line cluster;
//! conductor width and sag are modelled from the line's height above
//! ground with bounded, seeded jitter.
//!
//! When no power line was detected, a set of plausible records is
//! generated instead so downstream consumers still have something to
//! display. Those records are always tagged [`Provenance::Synthetic`].

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::classify::InfrastructureClassification;
use crate::cluster::Cluster;
use crate::curve::Axis;
use crate::types::{Point3, PointCloud};

/// Lower bound of the modelled maximum sag, in meters.
pub const MIN_SAG: f64 = 0.5;
/// Upper bound of the modelled maximum sag, in meters.
pub const MAX_SAG: f64 = 15.0;
/// Minimum relative height used in the sag denominator.
const SAG_HEIGHT_FLOOR: f64 = 10.0;
/// Half-width of the uniform sag jitter.
const SAG_JITTER: f64 = 0.5;

/// Fallback record count range.
const FALLBACK_COUNT: std::ops::RangeInclusive<usize> = 8..=20;
/// Fallback span length range, in meters.
const FALLBACK_LENGTH: std::ops::RangeInclusive<f64> = 50.0..=300.0;
/// Fallback relative height range, in meters.
const FALLBACK_RELATIVE_HEIGHT: std::ops::RangeInclusive<f64> = 15.0..=45.0;

/// Whether a record was derived from detected geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provenance {
    /// Derived from a detected power-line cluster.
    Measured,
    /// Generated because nothing was detected.
    Synthetic,
}

/// Catenary `z = a * cosh((s - h) / a) + k` along the span coordinate `s`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Catenary {
    pub a: f64,
    pub h: f64,
    pub k: f64,
}

impl Catenary {
    /// Evaluate the curve at span position `s`.
    ///
    /// Returns `k` for a degenerate (`a <= 0`) curve.
    #[must_use]
    pub fn eval(&self, s: f64) -> f64 {
        if self.a > 0.0 {
            self.a.mul_add(((s - self.h) / self.a).cosh(), self.k)
        } else {
            self.k
        }
    }
}

/// Physical description of one conductor span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerLineParameter {
    /// Sequential id starting at 1.
    pub id: usize,
    /// `PL-001` for measured lines, `SYN-001` for synthetic ones.
    pub name: String,
    pub start: Point3,
    pub end: Point3,
    /// Horizontal span length in meters.
    pub length: f64,
    /// Conductor width in millimeters.
    pub conductor_width_mm: f64,
    /// Maximum sag in meters, within [`MIN_SAG`]..=[`MAX_SAG`].
    pub max_sag: f64,
    pub catenary: Catenary,
    pub provenance: Provenance,
}

/// All parameter records produced for one cloud.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSynthesis {
    pub parameters: Vec<PowerLineParameter>,
    /// [`Provenance::Synthetic`] iff the fallback produced the records.
    pub provenance: Provenance,
}

impl ParameterSynthesis {
    /// Returns `true` if the records were generated by the fallback.
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.provenance == Provenance::Synthetic
    }
}

impl Default for ParameterSynthesis {
    fn default() -> Self {
        Self {
            parameters: Vec::new(),
            provenance: Provenance::Measured,
        }
    }
}

/// Conductor width band in millimeters for a line at `relative_height`.
#[must_use]
pub fn width_band(relative_height: f64) -> std::ops::RangeInclusive<f64> {
    if relative_height > 40.0 {
        35.0..=45.0
    } else if relative_height > 25.0 {
        25.0..=33.0
    } else if relative_height > 15.0 {
        18.0..=24.0
    } else {
        12.0..=16.0
    }
}

/// Sag before jitter: `length² / (8 * max(relative_height, 10))`.
#[must_use]
pub fn nominal_sag(length: f64, relative_height: f64) -> f64 {
    length * length / (8.0 * relative_height.max(SAG_HEIGHT_FLOOR))
}

/// Derive parameter records for every power line in `classification`,
/// or synthesize a fallback set when there are none.
#[must_use]
pub fn synthesize(
    cloud: &PointCloud,
    classification: &InfrastructureClassification,
    seed: u64,
) -> ParameterSynthesis {
    let mut rng = StdRng::seed_from_u64(seed);
    let ground = classification.ground_height;

    if classification.power_lines.is_empty() {
        let parameters = fallback(cloud, ground, &mut rng);
        log::warn!(
            "no power lines detected; synthesized {} placeholder records",
            parameters.len()
        );
        return ParameterSynthesis {
            parameters,
            provenance: Provenance::Synthetic,
        };
    }

    let parameters: Vec<PowerLineParameter> = classification
        .power_lines
        .iter()
        .enumerate()
        .map(|(i, line)| measure(cloud, line, i + 1, ground, &mut rng))
        .collect();
    log::info!("derived parameters for {} power lines", parameters.len());

    ParameterSynthesis {
        parameters,
        provenance: Provenance::Measured,
    }
}

#[allow(clippy::cast_precision_loss)]
fn measure(
    cloud: &PointCloud,
    line: &Cluster,
    id: usize,
    ground: f64,
    rng: &mut StdRng,
) -> PowerLineParameter {
    let axis = Axis::dominant(line.bbox.width(), line.bbox.depth());
    let mut start = line.bbox.min;
    let mut end = line.bbox.max;
    let mut sum_z = 0.0;
    let mut count = 0_usize;
    for (k, p) in cloud.select(&line.indices).enumerate() {
        if k == 0 || axis.coordinate(p) < axis.coordinate(start) {
            start = p;
        }
        if k == 0 || axis.coordinate(p) > axis.coordinate(end) {
            end = p;
        }
        sum_z += p.z;
        count += 1;
    }

    let length = line.bbox.width().max(line.bbox.depth());
    let average = if count > 0 {
        sum_z / count as f64
    } else {
        line.bbox.center().z
    };
    let relative = average - ground;

    record(
        id,
        format!("PL-{id:03}"),
        start,
        end,
        length,
        relative,
        ground,
        Provenance::Measured,
        rng,
    )
}

fn fallback(cloud: &PointCloud, ground: f64, rng: &mut StdRng) -> Vec<PowerLineParameter> {
    let anchor = cloud
        .bounds()
        .map_or(Point3::new(0.0, 0.0, 0.0), |b| b.center());
    let count = rng.gen_range(FALLBACK_COUNT);

    (1..=count)
        .map(|id| {
            let heading = rng.gen_range(0.0..std::f64::consts::TAU);
            let length = rng.gen_range(FALLBACK_LENGTH);
            let relative = rng.gen_range(FALLBACK_RELATIVE_HEIGHT);
            let (dy, dx) = heading.sin_cos();
            let half = length / 2.0;
            let z = ground + relative;
            let start = Point3::new(dx.mul_add(-half, anchor.x), dy.mul_add(-half, anchor.y), z);
            let end = Point3::new(dx.mul_add(half, anchor.x), dy.mul_add(half, anchor.y), z);
            record(
                id,
                format!("SYN-{id:03}"),
                start,
                end,
                length,
                relative,
                ground,
                Provenance::Synthetic,
                rng,
            )
        })
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn record(
    id: usize,
    name: String,
    start: Point3,
    end: Point3,
    length: f64,
    relative_height: f64,
    ground: f64,
    provenance: Provenance,
    rng: &mut StdRng,
) -> PowerLineParameter {
    let conductor_width_mm = rng.gen_range(width_band(relative_height));
    let jitter = rng.gen_range(-SAG_JITTER..=SAG_JITTER);
    let max_sag = (nominal_sag(length, relative_height) + jitter).clamp(MIN_SAG, MAX_SAG);

    PowerLineParameter {
        id,
        name,
        start,
        end,
        length,
        conductor_width_mm,
        max_sag,
        catenary: Catenary {
            a: relative_height / 3.0,
            h: length / 2.0,
            k: ground,
        },
        provenance,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn line_cluster(cloud: &PointCloud) -> Cluster {
        Cluster {
            label: 0,
            indices: (0..cloud.len()).collect(),
            bbox: cloud.bounds().unwrap(),
        }
    }

    fn straight_line(z: f64, length: f64) -> PointCloud {
        (0..=100)
            .map(|i| Point3::new(length * f64::from(i) / 100.0, 0.0, z))
            .collect()
    }

    fn with_lines(lines: Vec<Cluster>, ground_height: f64) -> InfrastructureClassification {
        InfrastructureClassification {
            power_lines: lines,
            ground_height,
            ..InfrastructureClassification::default()
        }
    }

    #[test]
    fn width_bands_follow_relative_height() {
        assert_eq!(width_band(41.0), 35.0..=45.0);
        assert_eq!(width_band(40.0), 25.0..=33.0);
        assert_eq!(width_band(25.0), 18.0..=24.0);
        assert_eq!(width_band(15.0), 12.0..=16.0);
        assert_eq!(width_band(-3.0), 12.0..=16.0);
    }

    #[test]
    fn nominal_sag_floors_relative_height() {
        assert!((nominal_sag(40.0, 2.0) - 20.0).abs() < 1e-12);
        assert!((nominal_sag(40.0, 20.0) - 10.0).abs() < 1e-12);
    }

    #[test]
    fn measured_line_parameters() {
        let cloud = straight_line(30.0, 80.0);
        let classification = with_lines(vec![line_cluster(&cloud)], 0.0);
        let result = synthesize(&cloud, &classification, 1);

        assert!(!result.is_synthetic());
        assert_eq!(result.parameters.len(), 1);
        let p = &result.parameters[0];
        assert_eq!(p.id, 1);
        assert_eq!(p.name, "PL-001");
        assert_eq!(p.provenance, Provenance::Measured);
        assert!((p.length - 80.0).abs() < 1e-9);
        assert!(p.start.x.abs() < 1e-9);
        assert!((p.end.x - 80.0).abs() < 1e-9);
        assert!((25.0..=33.0).contains(&p.conductor_width_mm));
        // 80² / (8 * 30) = 26.7, clamped.
        assert!((p.max_sag - MAX_SAG).abs() < 1e-12);
        assert!((p.catenary.a - 10.0).abs() < 1e-9);
        assert!((p.catenary.h - 40.0).abs() < 1e-9);
        assert!(p.catenary.k.abs() < 1e-12);
    }

    #[test]
    fn short_span_sag_stays_within_bounds() {
        let cloud = straight_line(12.0, 1.0);
        let classification = with_lines(vec![line_cluster(&cloud)], 0.0);
        for seed in 0..50 {
            let p = &synthesize(&cloud, &classification, seed).parameters[0];
            assert!((MIN_SAG..=MAX_SAG).contains(&p.max_sag));
            assert!((12.0..=16.0).contains(&p.conductor_width_mm));
        }
    }

    #[test]
    fn relative_height_uses_ground_height() {
        let cloud = straight_line(50.0, 80.0);
        let classification = with_lines(vec![line_cluster(&cloud)], 30.0);
        let p = &synthesize(&cloud, &classification, 3).parameters[0];
        assert!((18.0..=24.0).contains(&p.conductor_width_mm));
        assert!((p.catenary.k - 30.0).abs() < 1e-12);
    }

    #[test]
    fn fallback_runs_only_without_lines() {
        let cloud = straight_line(30.0, 80.0);
        let measured = synthesize(&cloud, &with_lines(vec![line_cluster(&cloud)], 0.0), 9);
        assert!(measured.parameters.iter().all(|p| p.provenance == Provenance::Measured));

        let synthetic = synthesize(&cloud, &with_lines(Vec::new(), 0.0), 9);
        assert!(synthetic.is_synthetic());
        assert!(synthetic.parameters.iter().all(|p| p.provenance == Provenance::Synthetic));
    }

    #[test]
    fn fallback_records_are_plausible() {
        for seed in 0..30 {
            let result = synthesize(&PointCloud::default(), &with_lines(Vec::new(), 2.0), seed);
            let n = result.parameters.len();
            assert!((8..=20).contains(&n), "seed {seed}: {n} records");
            for (i, p) in result.parameters.iter().enumerate() {
                assert_eq!(p.id, i + 1);
                assert_eq!(p.name, format!("SYN-{:03}", i + 1));
                assert!((50.0..=300.0).contains(&p.length));
                assert!((12.0..=45.0).contains(&p.conductor_width_mm));
                assert!((MIN_SAG..=MAX_SAG).contains(&p.max_sag));
                assert!((p.start.horizontal_distance(p.end) - p.length).abs() < 1e-6);
                let rel = p.start.z - 2.0;
                assert!((15.0..=45.0).contains(&rel));
            }
        }
    }

    #[test]
    fn fallback_is_anchored_at_cloud_center() {
        let cloud = PointCloud::new(vec![Point3::new(100.0, 200.0, 0.0), Point3::new(300.0, 400.0, 10.0)]);
        let result = synthesize(&cloud, &with_lines(Vec::new(), 0.0), 4);
        for p in &result.parameters {
            let mid_x = (p.start.x + p.end.x) / 2.0;
            let mid_y = (p.start.y + p.end.y) / 2.0;
            assert!((mid_x - 200.0).abs() < 1e-6);
            assert!((mid_y - 300.0).abs() < 1e-6);
        }
    }

    #[test]
    fn same_seed_same_records() {
        let a = synthesize(&PointCloud::default(), &with_lines(Vec::new(), 0.0), 77);
        let b = synthesize(&PointCloud::default(), &with_lines(Vec::new(), 0.0), 77);
        assert_eq!(a, b);
    }

    #[test]
    fn catenary_minimum_is_at_vertex() {
        let c = Catenary { a: 10.0, h: 40.0, k: 5.0 };
        assert!((c.eval(40.0) - 15.0).abs() < 1e-12);
        assert!(c.eval(0.0) > c.eval(40.0));
        let flat = Catenary { a: 0.0, h: 0.0, k: 5.0 };
        assert!((flat.eval(3.0) - 5.0).abs() < f64::EPSILON);
    }
}
