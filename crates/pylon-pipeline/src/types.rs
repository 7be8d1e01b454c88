//! Shared types for the pylon extraction pipeline.

use serde::{Deserialize, Serialize};

use crate::classify::InfrastructureClassification;
use crate::cluster::ClusteringResult;
use crate::curve::PowerLineCurve;
use crate::ground::GroundSegmentation;
use crate::params::ParameterSynthesis;

/// A 3D point in survey coordinates.
///
/// Coordinates are `f64` so geodetic-scale eastings/northings keep
/// sub-centimeter precision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    /// Easting (or local X).
    pub x: f64,
    /// Northing (or local Y).
    pub y: f64,
    /// Elevation.
    pub z: f64,
}

impl Point3 {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Squared Euclidean distance to another point.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx.mul_add(dx, dy.mul_add(dy, dz * dz))
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Distance to another point projected onto the XY plane.
    #[must_use]
    pub fn horizontal_distance(self, other: Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Whether all three coordinates are finite.
    #[must_use]
    pub const fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub(crate) const fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

/// An ordered, immutable sequence of 3D positions.
///
/// This is the canonical buffer every stage indexes into: ground,
/// cluster and power-line subsets are index lists, never copies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointCloud(Vec<Point3>);

impl PointCloud {
    /// Wrap a vector of points.
    #[must_use]
    pub const fn new(points: Vec<Point3>) -> Self {
        Self(points)
    }

    /// Build a cloud from an interleaved `x, y, z, x, y, z, ...` buffer.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MalformedBuffer`] if the buffer length is
    /// not a multiple of three.
    pub fn from_flat(coords: &[f64]) -> Result<Self, PipelineError> {
        if coords.len() % 3 != 0 {
            return Err(PipelineError::MalformedBuffer { len: coords.len() });
        }
        Ok(Self(
            coords
                .chunks_exact(3)
                .map(|c| Point3::new(c[0], c[1], c[2]))
                .collect(),
        ))
    }

    /// Returns `true` if the cloud has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of points in the cloud.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// All points as a slice.
    #[must_use]
    pub fn points(&self) -> &[Point3] {
        &self.0
    }

    /// Point at `index`, if in range.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Point3> {
        self.0.get(index).copied()
    }

    /// Iterate over the points selected by `indices`.
    ///
    /// Out-of-range indices are skipped.
    pub fn select<'a>(&'a self, indices: &'a [usize]) -> impl Iterator<Item = Point3> + 'a {
        indices.iter().filter_map(|&i| self.get(i))
    }

    /// Bounding box of the whole cloud, or `None` if it is empty.
    #[must_use]
    pub fn bounds(&self) -> Option<Aabb> {
        Aabb::from_points(self.0.iter().copied())
    }

    /// Index of the first point with a non-finite coordinate.
    #[must_use]
    pub fn first_non_finite(&self) -> Option<usize> {
        self.0.iter().position(|p| !p.is_finite())
    }

    /// Consumes the cloud and returns the underlying vector of points.
    #[must_use]
    pub fn into_points(self) -> Vec<Point3> {
        self.0
    }
}

impl From<Vec<Point3>> for PointCloud {
    fn from(points: Vec<Point3>) -> Self {
        Self(points)
    }
}

impl FromIterator<Point3> for PointCloud {
    fn from_iter<I: IntoIterator<Item = Point3>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Axis-aligned bounding box.
///
/// `width` is the X extent, `depth` the Y extent and `height` the Z
/// extent. Degenerate (zero-extent) boxes are valid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner.
    pub min: Point3,
    /// Maximum corner.
    pub max: Point3,
}

impl Aabb {
    /// Bounding box of a point sequence, or `None` if it is empty.
    pub fn from_points<I: IntoIterator<Item = Point3>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        Some(iter.fold(
            Self {
                min: first,
                max: first,
            },
            |mut bb, p| {
                bb.min.x = bb.min.x.min(p.x);
                bb.min.y = bb.min.y.min(p.y);
                bb.min.z = bb.min.z.min(p.z);
                bb.max.x = bb.max.x.max(p.x);
                bb.max.y = bb.max.y.max(p.y);
                bb.max.z = bb.max.z.max(p.z);
                bb
            },
        ))
    }

    /// X extent.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    /// Y extent.
    #[must_use]
    pub fn depth(&self) -> f64 {
        self.max.y - self.min.y
    }

    /// Z extent.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.max.z - self.min.z
    }

    /// Center of the box.
    #[must_use]
    pub fn center(&self) -> Point3 {
        Point3::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
            (self.min.z + self.max.z) / 2.0,
        )
    }

    /// Box volume (`width * depth * height`).
    #[must_use]
    pub fn volume(&self) -> f64 {
        self.width() * self.depth() * self.height()
    }

    /// Footprint area (`width * depth`).
    #[must_use]
    pub fn base_area(&self) -> f64 {
        self.width() * self.depth()
    }
}

/// Everything produced by one run of the pipeline over one cloud.
///
/// All index lists refer into [`cloud`](Self::cloud).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// The canonical input cloud.
    pub cloud: PointCloud,
    /// Stage 1: ground / non-ground partition.
    pub ground: GroundSegmentation,
    /// Stage 2: DBSCAN clusters of the non-ground points.
    pub clustering: ClusteringResult,
    /// Stage 3: tower and power-line roles.
    pub classification: InfrastructureClassification,
    /// Stage 4: one centerline per power line, in line order.
    pub curves: Vec<PowerLineCurve>,
    /// Stage 5: physical parameters per line (or synthetic fallback).
    pub parameters: ParameterSynthesis,
}

/// Errors that can occur during pipeline processing.
///
/// Empty input, degenerate clusters and a missing tower are not errors;
/// those produce empty or fallback results.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A flat coordinate buffer did not contain whole `x, y, z` triples.
    #[error("coordinate buffer length {len} is not a multiple of 3")]
    MalformedBuffer {
        /// Length of the rejected buffer.
        len: usize,
    },

    /// The cloud contains a NaN or infinite coordinate.
    #[error("point {index} has a non-finite coordinate")]
    NonFiniteCoordinate {
        /// Index of the first offending point.
        index: usize,
    },

    /// The cloud's XY extent needs more ground grid cells than allowed.
    #[error("ground grid of {cols} x {rows} cells exceeds the limit of {max_cells} cells")]
    GridTooLarge {
        /// Cells along X.
        cols: usize,
        /// Cells along Y.
        rows: usize,
        /// Configured cell limit.
        max_cells: usize,
    },

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}

/// Serde-compatible proxy for `PipelineError`.
///
/// Keeps the wire shape stable independent of the `thiserror` derive.
#[derive(Serialize, Deserialize)]
enum PipelineErrorProxy {
    MalformedBuffer { len: usize },
    NonFiniteCoordinate { index: usize },
    GridTooLarge { cols: usize, rows: usize, max_cells: usize },
    InvalidConfig(String),
}

impl Serialize for PipelineError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::MalformedBuffer { len } => PipelineErrorProxy::MalformedBuffer { len: *len },
            Self::NonFiniteCoordinate { index } => {
                PipelineErrorProxy::NonFiniteCoordinate { index: *index }
            }
            Self::GridTooLarge {
                cols,
                rows,
                max_cells,
            } => PipelineErrorProxy::GridTooLarge {
                cols: *cols,
                rows: *rows,
                max_cells: *max_cells,
            },
            Self::InvalidConfig(s) => PipelineErrorProxy::InvalidConfig(s.clone()),
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PipelineError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = PipelineErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            PipelineErrorProxy::MalformedBuffer { len } => Self::MalformedBuffer { len },
            PipelineErrorProxy::NonFiniteCoordinate { index } => {
                Self::NonFiniteCoordinate { index }
            }
            PipelineErrorProxy::GridTooLarge {
                cols,
                rows,
                max_cells,
            } => Self::GridTooLarge {
                cols,
                rows,
                max_cells,
            },
            PipelineErrorProxy::InvalidConfig(s) => Self::InvalidConfig(s),
        })
    }
}
