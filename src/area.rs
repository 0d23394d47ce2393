//! Rectangular area algebra (C1).
//!
//! A finite-dimensional axis-aligned box, closed at both ends per the
//! source model (`min[k] <= max[k]`), with the usual set operations plus
//! the signed "parallel distance" that the weighted and nearest-frame
//! stitching methods use as their geometric kernel.

use crate::error::{StitchError, StitchResult};

const MAX_DIMS: usize = 63;

/// An axis-aligned box in `ℝⁿ`, `min[k] <= max[k]` for every axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Area {
    min: Vec<f64>,
    max: Vec<f64>,
}

impl Area {
    /// Builds a new area, validating `min <= max` componentwise and that
    /// the dimensionality is in `1..=63`.
    pub fn new(min: Vec<f64>, max: Vec<f64>) -> StitchResult<Self> {
        if min.is_empty() || max.is_empty() {
            return Err(StitchError::invalid_area("area has zero coordinate count"));
        }
        if min.len() != max.len() {
            return Err(StitchError::invalid_argument(format!(
                "area min/max dimensionality mismatch: {} vs {}",
                min.len(),
                max.len()
            )));
        }
        if min.len() > MAX_DIMS {
            return Err(StitchError::invalid_area(format!(
                "area has {} dimensions, exceeding the limit of {MAX_DIMS}",
                min.len()
            )));
        }
        for k in 0..min.len() {
            if min[k] > max[k] {
                return Err(StitchError::invalid_area(format!(
                    "axis {k}: min ({}) > max ({})",
                    min[k], max[k]
                )));
            }
        }
        Ok(Area { min, max })
    }

    /// Convenience constructor from an origin and per-axis extent.
    pub fn from_origin_dims(origin: &[f64], dims: &[usize]) -> StitchResult<Self> {
        if origin.len() != dims.len() {
            return Err(StitchError::invalid_argument(
                "origin/dims dimensionality mismatch",
            ));
        }
        let max: Vec<f64> = origin
            .iter()
            .zip(dims)
            .map(|(&o, &d)| o + d as f64)
            .collect();
        Area::new(origin.to_vec(), max)
    }

    pub fn dim_count(&self) -> usize {
        self.min.len()
    }

    pub fn min(&self) -> &[f64] {
        &self.min
    }

    pub fn max(&self) -> &[f64] {
        &self.max
    }

    /// `size[k] = max[k] - min[k]`.
    pub fn size(&self) -> Vec<f64> {
        self.min
            .iter()
            .zip(&self.max)
            .map(|(&lo, &hi)| hi - lo)
            .collect()
    }

    /// Translates the area by `v` (must match its dimensionality).
    pub fn shift(&self, v: &[f64]) -> Self {
        debug_assert_eq!(v.len(), self.dim_count());
        let min = self.min.iter().zip(v).map(|(&a, &b)| a + b).collect();
        let max = self.max.iter().zip(v).map(|(&a, &b)| a + b).collect();
        Area { min, max }
    }

    /// Translates every axis by the same scalar — used to align "inside"
    /// with sample centers for the weighted stitching kernel.
    pub fn shift_uniform(&self, delta: f64) -> Self {
        let v = vec![delta; self.dim_count()];
        self.shift(&v)
    }

    pub fn overlaps(&self, other: &Area) -> bool {
        if self.dim_count() != other.dim_count() {
            return false;
        }
        (0..self.dim_count()).all(|k| self.min[k] < other.max[k] && other.min[k] < self.max[k])
    }

    /// Closed-box containment: `min[k] <= point[k] <= max[k]` for all `k`.
    pub fn contains(&self, point: &[f64]) -> bool {
        if point.len() != self.dim_count() {
            return false;
        }
        (0..self.dim_count()).all(|k| point[k] >= self.min[k] && point[k] <= self.max[k])
    }

    /// Signed parallel ("Chebyshev-to-boundary") distance: negative inside
    /// (magnitude = depth to the nearest face), positive outside, zero on
    /// the boundary.
    pub fn parallel_distance(&self, point: &[f64]) -> f64 {
        debug_assert_eq!(point.len(), self.dim_count());
        (0..self.dim_count())
            .map(|k| (self.min[k] - point[k]).max(point[k] - self.max[k]))
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Lossless integer conversion, failing if any coordinate isn't
    /// integral.
    pub fn to_integer_box(&self) -> StitchResult<IntegerArea> {
        let to_i64 = |v: &[f64]| -> StitchResult<Vec<i64>> {
            v.iter()
                .map(|&x| {
                    if x.fract() != 0.0 {
                        Err(StitchError::invalid_argument(format!(
                            "area coordinate {x} is not integral"
                        )))
                    } else {
                        Ok(x as i64)
                    }
                })
                .collect()
        };
        Ok(IntegerArea {
            min: to_i64(&self.min)?,
            max: to_i64(&self.max)?,
        })
    }

    /// Rounds to the nearest integer box (min floors down, max rounds up),
    /// always succeeding.
    pub fn round_to_integer(&self) -> IntegerArea {
        IntegerArea {
            min: self.min.iter().map(|&x| x.floor() as i64).collect(),
            max: self.max.iter().map(|&x| x.ceil() as i64).collect(),
        }
    }
}

/// An area known to have integral corners, e.g. a pixel-addressed window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegerArea {
    min: Vec<i64>,
    max: Vec<i64>,
}

impl IntegerArea {
    pub fn min(&self) -> &[i64] {
        &self.min
    }

    pub fn max(&self) -> &[i64] {
        &self.max
    }

    pub fn dims(&self) -> Vec<usize> {
        self.min
            .iter()
            .zip(&self.max)
            .map(|(&lo, &hi)| (hi - lo).max(0) as usize)
            .collect()
    }

    pub fn to_area(&self) -> Area {
        Area {
            min: self.min.iter().map(|&x| x as f64).collect(),
            max: self.max.iter().map(|&x| x as f64).collect(),
        }
    }
}
