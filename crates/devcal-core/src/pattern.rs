use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Number of interior corners of the planar target, `columns` x `rows`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatternSize {
    pub columns: u32,
    pub rows: u32,
}

impl PatternSize {
    pub const fn new(columns: u32, rows: u32) -> Self {
        Self { columns, rows }
    }

    #[inline]
    pub fn point_count(&self) -> usize {
        self.columns as usize * self.rows as usize
    }
}

impl Default for PatternSize {
    fn default() -> Self {
        Self::new(9, 6)
    }
}

impl std::fmt::Display for PatternSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.columns, self.rows)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid pattern size `{0}` (expected COLSxROWS with both at least 2)")]
pub struct ParsePatternSizeError(pub String);

impl FromStr for PatternSize {
    type Err = ParsePatternSizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParsePatternSizeError(s.to_string());
        let (c, r) = s
            .split_once(|ch| ch == 'x' || ch == 'X')
            .ok_or_else(err)?;
        let columns: u32 = c.trim().parse().map_err(|_| err())?;
        let rows: u32 = r.trim().parse().map_err(|_| err())?;
        if columns < 2 || rows < 2 {
            return Err(err());
        }
        Ok(Self::new(columns, rows))
    }
}

/// Ideal 3D layout of the target corners on the `z = 0` plane.
///
/// Point `i * columns + j` sits at `(j * s, i * s, 0)` for row `i` and column
/// `j`, matching the row-major order of [`Observation::points`].
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceObjectPoints {
    pattern: PatternSize,
    square_size: f64,
    points: Vec<Point3<f64>>,
}

impl ReferenceObjectPoints {
    pub fn new(pattern: PatternSize, square_size: f64) -> Self {
        let mut points = Vec::with_capacity(pattern.point_count());
        for i in 0..pattern.rows {
            for j in 0..pattern.columns {
                points.push(Point3::new(
                    j as f64 * square_size,
                    i as f64 * square_size,
                    0.0,
                ));
            }
        }
        Self {
            pattern,
            square_size,
            points,
        }
    }

    pub fn pattern(&self) -> PatternSize {
        self.pattern
    }

    pub fn square_size(&self) -> f64 {
        self.square_size
    }

    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// One copy of the reference layout per view.
    pub fn repeat(&self, views: usize) -> Vec<Vec<Point3<f64>>> {
        vec![self.points.clone(); views]
    }
}

/// Pixel coordinates of every target corner found in one accepted frame,
/// row-major (`row * columns + column`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub points: Vec<Point2<f32>>,
}

impl Observation {
    pub fn new(points: Vec<Point2<f32>>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// `true` when the observation covers every corner of `pattern`.
    pub fn is_complete_for(&self, pattern: PatternSize) -> bool {
        self.points.len() == pattern.point_count()
    }
}
