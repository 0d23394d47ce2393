//! Frame position (C3): where a frame's pixel grid sits in destination
//! space, plus the sampler factory that turns a raster into a NaN-aware
//! coordinate function.
//!
//! Coordinates here use the lower-left-corner convention: an integer point
//! `p` addresses the same location as pixel index `p` (not `p + 0.5`). The
//! weighted stitching kernel's own `-0.5` footprint shift (see
//! `reduce::WeightedFrames`) is what aligns "inside" with sample centers —
//! baking a `+0.5` into every point here would double that adjustment.

use std::sync::Arc;

use crate::area::Area;
use crate::error::StitchResult;
use crate::matrix::Matrix;
use crate::transform::Transform;

/// Where a frame sits in destination space.
#[derive(Clone)]
pub enum FramePosition {
    /// Source origin placed at a destination point; footprint = origin + dims.
    Shift { origin: Vec<f64>, dims: Vec<usize> },
    /// Arbitrary inverse transform plus a declared destination area — under
    /// a general transform the source dims alone don't determine the
    /// footprint.
    Universal { area: Area, to_source: Transform },
}

impl FramePosition {
    pub fn shift(origin: Vec<f64>, dims: Vec<usize>) -> StitchResult<Self> {
        // Validated lazily via `area()` so construction stays infallible
        // for the common case; `area()` surfaces any dimensionality issue.
        let _ = Area::from_origin_dims(&origin, &dims)?;
        Ok(FramePosition::Shift { origin, dims })
    }

    pub fn universal(area: Area, to_source: Transform) -> StitchResult<Self> {
        if area.dim_count() != to_source.dim_count() {
            return Err(crate::error::StitchError::invalid_argument(
                "frame position area/transform dimensionality mismatch",
            ));
        }
        Ok(FramePosition::Universal { area, to_source })
    }

    pub fn area(&self) -> Area {
        match self {
            FramePosition::Shift { origin, dims } => {
                Area::from_origin_dims(origin, dims).expect("validated at construction")
            }
            FramePosition::Universal { area, .. } => area.clone(),
        }
    }

    /// The transform mapping destination coordinates to source-matrix index
    /// coordinates.
    pub fn to_source(&self) -> Transform {
        match self {
            FramePosition::Shift { origin, .. } => {
                Transform::shift(origin.iter().map(|&v| -v).collect::<Vec<_>>())
            }
            FramePosition::Universal { to_source, .. } => to_source.clone(),
        }
    }

    pub fn dim_count(&self) -> usize {
        match self {
            FramePosition::Shift { origin, .. } => origin.len(),
            FramePosition::Universal { area, .. } => area.dim_count(),
        }
    }

    pub fn is_shift(&self) -> bool {
        matches!(self, FramePosition::Shift { .. })
    }

    /// The `(box, point)` pair a distance-aware stitching method
    /// ([`crate::reduce::NearestFrame`], [`crate::reduce::WeightedFrames`])
    /// should measure against for this frame: for a `Shift` position, the
    /// destination-space footprint and the point unchanged (shift leaves
    /// depth-from-edge invariant, so there is nothing to transform); for a
    /// `Universal` position, the frame's own source-local box `[0, dims)`
    /// and the point mapped through `to_source` first, per the spec's
    /// "universal variants ... apply the inverse transform to the point
    /// before consulting the footprint" rule — a frame footprint distorted
    /// by rotation or scale is only axis-aligned in its own source space,
    /// not in destination space.
    pub fn distance_geometry(&self, point: &[f64], source_dims: &[usize]) -> (Area, Vec<f64>) {
        match self {
            FramePosition::Shift { .. } => (self.area(), point.to_vec()),
            FramePosition::Universal { to_source, .. } => {
                let origin = vec![0.0; source_dims.len()];
                let local_box = Area::from_origin_dims(&origin, source_dims)
                    .expect("source dims are always non-negative");
                (local_box, to_source.map(point))
            }
        }
    }

    /// Builds a real-valued sampler `f: ℝⁿ → ℝ` over `matrix`, closing over
    /// a shared, read-only view so it may be called concurrently from
    /// multiple threads.
    pub fn as_interpolation_func(
        &self,
        matrix: Arc<dyn Matrix>,
    ) -> Arc<dyn Fn(&[f64]) -> f64 + Send + Sync> {
        let to_source = self.to_source();
        let dims = matrix.dimensions();
        // Step (nearest-floor) sampling is only correct for an *exact*
        // integer shift — a fractional-origin `Shift` position still needs
        // n-linear interpolation, per spec §4.3 item 2.
        let is_integer_shift = to_source.is_integer_shift(&vec![0.0; dims.len()]);
        Arc::new(move |point: &[f64]| {
            let src = to_source.map(point);
            if is_integer_shift {
                sample_step(&matrix, &dims, &src)
            } else {
                sample_nlinear(&matrix, &dims, &src)
            }
        })
    }
}

/// Step-function (nearest-floor index) sampling for exact integer shifts.
fn sample_step(matrix: &Arc<dyn Matrix>, dims: &[usize], src: &[f64]) -> f64 {
    let mut idx = Vec::with_capacity(src.len());
    for (k, &x) in src.iter().enumerate() {
        let i = x.floor();
        if i < 0.0 || i as i64 >= dims[k] as i64 {
            return f64::NAN;
        }
        idx.push(i as i64);
    }
    matrix.get(&idx)
}

/// N-linear (bilinear in 2-D, trilinear in 3-D, ...) interpolation.
/// Returns NaN outside the source matrix's extent.
fn sample_nlinear(matrix: &Arc<dyn Matrix>, dims: &[usize], src: &[f64]) -> f64 {
    let n = src.len();
    const EDGE_EPSILON: f64 = 1e-12;
    for (k, &x) in src.iter().enumerate() {
        let far_edge = dims[k] as f64 - 1.0;
        if x < 0.0 || x > far_edge + EDGE_EPSILON {
            return f64::NAN;
        }
    }

    let lo: Vec<i64> = src.iter().map(|&x| x.floor() as i64).collect();
    let frac: Vec<f64> = src.iter().zip(&lo).map(|(&x, &l)| x - l as f64).collect();

    let mut acc = 0.0;
    for corner in 0..(1u32 << n) {
        let mut weight = 1.0;
        let mut idx = Vec::with_capacity(n);
        for k in 0..n {
            let bit = (corner >> k) & 1;
            let coord = (lo[k] + bit as i64).min(dims[k] as i64 - 1).max(0);
            idx.push(coord);
            weight *= if bit == 1 { frac[k] } else { 1.0 - frac[k] };
        }
        if weight == 0.0 {
            continue;
        }
        acc += weight * matrix.get(&idx);
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::DenseMatrix;

    #[test]
    fn shift_sampler_is_step_function() {
        // (row, col) throughout, matching `DenseMatrix::from_rows`.
        let m: Arc<dyn Matrix> = Arc::new(DenseMatrix::from_rows(vec![
            vec![10.0, 20.0, 30.0],
            vec![40.0, 50.0, 60.0],
        ]));
        let pos = FramePosition::shift(vec![1.0, 1.0], vec![2, 3]).unwrap();
        let f = pos.as_interpolation_func(m);
        assert_eq!(f(&[1.0, 1.0]), 10.0);
        assert_eq!(f(&[1.0, 3.0]), 30.0);
        assert_eq!(f(&[2.0, 1.0]), 40.0);
        assert!(f(&[0.0, 0.0]).is_nan());
        assert!(f(&[3.0, 1.0]).is_nan());
    }

    #[test]
    fn nlinear_sampler_interpolates() {
        // Rows identical, values vary only along the column axis, so a
        // half-column offset should land exactly between 0 and 10.
        let m: Arc<dyn Matrix> = Arc::new(DenseMatrix::from_rows(vec![
            vec![0.0, 10.0],
            vec![0.0, 10.0],
        ]));
        let to_source = Transform::affine2(1.0, 0.0, 0.0, 1.0, 0.0, 0.0).unwrap();
        let pos = FramePosition::universal(
            Area::from_origin_dims(&[0.0, 0.0], &[2, 2]).unwrap(),
            to_source,
        )
        .unwrap();
        let f = pos.as_interpolation_func(m);
        assert_eq!(f(&[0.0, 0.5]), 5.0);
        assert!(f(&[-1.0, 0.0]).is_nan());
    }

    /// A `Shift` position with a fractional origin is still a `Shift`
    /// variant but is not an *exact* integer shift, so it must fall
    /// through to n-linear interpolation rather than step-function
    /// (nearest-floor) sampling.
    #[test]
    fn fractional_shift_interpolates_instead_of_flooring() {
        let m: Arc<dyn Matrix> = Arc::new(DenseMatrix::from_rows(vec![vec![0.0, 10.0]]));
        let pos = FramePosition::shift(vec![0.0, 0.5], vec![1, 2]).unwrap();
        let f = pos.as_interpolation_func(m);
        // dest (0, 1.0) -> src (0, 0.5): exactly halfway between 0 and 10.
        assert_eq!(f(&[0.0, 1.0]), 5.0);
    }
}
