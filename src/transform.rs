//! Coordinate operator (C2): forward/inverse affine and general coordinate
//! transforms, with a 2-D affine fast path inlined (no heap allocation) the
//! way `entities/transform.rs` inlines `glam::Affine2` for layer
//! compositing — here in double precision via `glam::DAffine2` since the
//! stitching kernel works in `f64`.

use std::sync::Arc;

use glam::{DAffine2, DVec2};

use crate::error::{StitchError, StitchResult};

type DynMap = Arc<dyn Fn(&[f64]) -> Vec<f64> + Send + Sync>;

/// A coordinate transform and its companion inverse.
#[derive(Clone)]
pub enum Transform {
    /// Pure translation.
    Shift(Vec<f64>),
    /// 2-D affine fast path — matrix multiply inlined via `glam::DAffine2`.
    Affine2 { fwd: DAffine2, inv: DAffine2 },
    /// General n-dimensional affine: `y = A*x + b`, `A` stored row-major.
    Affine {
        dim: usize,
        a: Vec<f64>,
        b: Vec<f64>,
        a_inv: Vec<f64>,
        b_inv: Vec<f64>,
    },
    /// Opaque forward/inverse pair for transforms that aren't affine.
    General { dim: usize, forward: DynMap, inverse: DynMap },
}

impl Transform {
    pub fn shift(v: impl Into<Vec<f64>>) -> Self {
        Transform::Shift(v.into())
    }

    /// Builds the 2-D affine fast path from a 2x2 row-major matrix and a
    /// translation. Fails if `a` is singular (not invertible).
    pub fn affine2(a00: f64, a01: f64, a10: f64, a11: f64, b0: f64, b1: f64) -> StitchResult<Self> {
        let fwd = DAffine2::from_cols(
            DVec2::new(a00, a10),
            DVec2::new(a01, a11),
            DVec2::new(b0, b1),
        );
        let det = a00 * a11 - a01 * a10;
        if det.abs() < f64::EPSILON {
            return Err(StitchError::invalid_argument("singular 2x2 affine matrix"));
        }
        let inv = fwd.inverse();
        Ok(Transform::Affine2 { fwd, inv })
    }

    /// Builds a general n-dimensional affine transform from a row-major
    /// `dim x dim` matrix `a` and translation `b`.
    pub fn affine(dim: usize, a: Vec<f64>, b: Vec<f64>) -> StitchResult<Self> {
        if a.len() != dim * dim || b.len() != dim {
            return Err(StitchError::invalid_argument(
                "affine transform matrix/vector dimensionality mismatch",
            ));
        }
        let (a_inv, b_inv) = invert_affine(dim, &a, &b)?;
        Ok(Transform::Affine { dim, a, b, a_inv, b_inv })
    }

    /// An opaque transform defined purely by its forward/inverse closures.
    pub fn general(dim: usize, forward: DynMap, inverse: DynMap) -> Self {
        Transform::General { dim, forward, inverse }
    }

    pub fn dim_count(&self) -> usize {
        match self {
            Transform::Shift(v) => v.len(),
            Transform::Affine2 { .. } => 2,
            Transform::Affine { dim, .. } => *dim,
            Transform::General { dim, .. } => *dim,
        }
    }

    pub fn map(&self, src: &[f64]) -> Vec<f64> {
        match self {
            Transform::Shift(v) => src.iter().zip(v).map(|(&a, &b)| a + b).collect(),
            Transform::Affine2 { fwd, .. } => {
                let p = fwd.transform_point2(DVec2::new(src[0], src[1]));
                vec![p.x, p.y]
            }
            Transform::Affine { dim, a, b, .. } => apply_affine(*dim, a, b, src),
            Transform::General { forward, .. } => forward(src),
        }
    }

    pub fn inverse_map(&self, dst: &[f64]) -> Vec<f64> {
        match self {
            Transform::Shift(v) => dst.iter().zip(v).map(|(&a, &b)| a - b).collect(),
            Transform::Affine2 { inv, .. } => {
                let p = inv.transform_point2(DVec2::new(dst[0], dst[1]));
                vec![p.x, p.y]
            }
            Transform::Affine { dim, a_inv, b_inv, .. } => apply_affine(*dim, a_inv, b_inv, dst),
            Transform::General { inverse, .. } => inverse(dst),
        }
    }

    pub fn is_shift(&self) -> bool {
        matches!(self, Transform::Shift(_))
    }

    pub fn is_linear(&self) -> bool {
        matches!(self, Transform::Shift(_) | Transform::Affine2 { .. } | Transform::Affine { .. })
    }

    /// Returns `true` if this is a shift transform and, re-anchored by
    /// `-offset`, every component rounds to an integer.
    pub fn is_integer_shift(&self, offset: &[f64]) -> bool {
        match self {
            Transform::Shift(v) => v
                .iter()
                .zip(offset)
                .all(|(&s, &o)| ((s - o).round() - (s - o)).abs() < 1e-9),
            _ => false,
        }
    }

    /// Returns the shift vector if this transform is a pure translation.
    pub fn as_shift(&self) -> Option<&[f64]> {
        match self {
            Transform::Shift(v) => Some(v),
            _ => None,
        }
    }

    /// Returns `(A, b)` for shift/affine transforms — `A` is the identity
    /// for a pure shift.
    pub fn as_linear(&self) -> Option<(Vec<f64>, Vec<f64>)> {
        match self {
            Transform::Shift(v) => {
                let dim = v.len();
                let mut a = vec![0.0; dim * dim];
                for k in 0..dim {
                    a[k * dim + k] = 1.0;
                }
                Some((a, v.clone()))
            }
            Transform::Affine2 { fwd, .. } => {
                let cols = fwd.matrix2.to_cols_array();
                let t = fwd.translation;
                Some((vec![cols[0], cols[2], cols[1], cols[3]], vec![t.x, t.y]))
            }
            Transform::Affine { a, b, .. } => Some((a.clone(), b.clone())),
            Transform::General { .. } => None,
        }
    }

    /// Composes `self` after `other`: `result.map(x) == self.map(other.map(x))`.
    pub fn compose(&self, other: &Transform) -> Transform {
        let dim = self.dim_count();
        let self_c = self.clone();
        let other_c = other.clone();
        let self_i = self.clone();
        let other_i = other.clone();
        Transform::General {
            dim,
            forward: Arc::new(move |x| self_c.map(&other_c.map(x))),
            inverse: Arc::new(move |y| other_i.inverse_map(&self_i.inverse_map(y))),
        }
    }

    /// Returns a transform `t'` such that `t'.map(x) == self.map(x + v)` —
    /// used by the stitcher to pre-translate a frame's inverse transform by
    /// `-area.min()` so downstream samplers need no offset bookkeeping.
    pub fn precompose_shift(&self, v: &[f64]) -> Transform {
        match self {
            Transform::Shift(s) => {
                Transform::Shift(s.iter().zip(v).map(|(&a, &b)| a + b).collect())
            }
            Transform::Affine { dim, a, b, .. } => {
                // y = A(x+v)+b = A*x + (A*v+b)
                let av = apply_linear(*dim, a, v);
                let b2: Vec<f64> = b.iter().zip(&av).map(|(&x, &y)| x + y).collect();
                Transform::affine(*dim, a.clone(), b2).expect("matrix unchanged, still invertible")
            }
            Transform::Affine2 { fwd, .. } => {
                let shifted = *fwd * DAffine2::from_translation(DVec2::new(v[0], v[1]));
                Transform::Affine2 { fwd: shifted, inv: shifted.inverse() }
            }
            Transform::General { dim, forward, inverse } => {
                let v = v.to_vec();
                let v2 = v.clone();
                let fwd = forward.clone();
                let inv = inverse.clone();
                Transform::General {
                    dim: *dim,
                    forward: Arc::new(move |x| {
                        let shifted: Vec<f64> = x.iter().zip(&v).map(|(&a, &b)| a + b).collect();
                        fwd(&shifted)
                    }),
                    inverse: Arc::new(move |y| {
                        let mapped = inv(y);
                        mapped.iter().zip(&v2).map(|(&a, &b)| a - b).collect()
                    }),
                }
            }
        }
    }

    /// A translation-only transform — convenience mirror of [`Transform::shift`].
    pub fn shift_by(v: &[f64]) -> Transform {
        Transform::Shift(v.to_vec())
    }
}

fn apply_linear(dim: usize, a: &[f64], x: &[f64]) -> Vec<f64> {
    (0..dim)
        .map(|row| (0..dim).map(|col| a[row * dim + col] * x[col]).sum::<f64>())
        .collect()
}

fn apply_affine(dim: usize, a: &[f64], b: &[f64], x: &[f64]) -> Vec<f64> {
    apply_linear(dim, a, x)
        .into_iter()
        .zip(b)
        .map(|(v, &bi)| v + bi)
        .collect()
}

/// Gauss-Jordan inversion of `y = A*x + b`, returning `(A^-1, -A^-1 * b)`.
fn invert_affine(dim: usize, a: &[f64], b: &[f64]) -> StitchResult<(Vec<f64>, Vec<f64>)> {
    let mut aug = vec![0.0; dim * 2 * dim];
    for r in 0..dim {
        for c in 0..dim {
            aug[r * 2 * dim + c] = a[r * dim + c];
        }
        aug[r * 2 * dim + dim + r] = 1.0;
    }
    for col in 0..dim {
        let mut pivot_row = col;
        let mut pivot_val = aug[col * 2 * dim + col].abs();
        for r in (col + 1)..dim {
            let v = aug[r * 2 * dim + col].abs();
            if v > pivot_val {
                pivot_val = v;
                pivot_row = r;
            }
        }
        if pivot_val < 1e-12 {
            return Err(StitchError::invalid_argument("affine transform matrix is singular"));
        }
        if pivot_row != col {
            for c in 0..2 * dim {
                aug.swap(col * 2 * dim + c, pivot_row * 2 * dim + c);
            }
        }
        let pivot = aug[col * 2 * dim + col];
        for c in 0..2 * dim {
            aug[col * 2 * dim + c] /= pivot;
        }
        for r in 0..dim {
            if r == col {
                continue;
            }
            let factor = aug[r * 2 * dim + col];
            if factor != 0.0 {
                for c in 0..2 * dim {
                    aug[r * 2 * dim + c] -= factor * aug[col * 2 * dim + c];
                }
            }
        }
    }
    let mut a_inv = vec![0.0; dim * dim];
    for r in 0..dim {
        for c in 0..dim {
            a_inv[r * dim + c] = aug[r * 2 * dim + dim + c];
        }
    }
    let b_inv = apply_linear(dim, &a_inv, b).into_iter().map(|v| -v).collect();
    Ok((a_inv, b_inv))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_round_trips() {
        let t = Transform::shift(vec![2.0, -3.0]);
        let p = vec![5.0, 5.0];
        assert_eq!(t.inverse_map(&t.map(&p)), p);
    }

    #[test]
    fn affine2_round_trips() {
        let t = Transform::affine2(2.0, 0.0, 0.0, 2.0, 1.0, 1.0).unwrap();
        let p = vec![3.0, 4.0];
        let mapped = t.map(&p);
        assert_eq!(mapped, vec![7.0, 9.0]);
        let back = t.inverse_map(&mapped);
        assert!((back[0] - p[0]).abs() < 1e-9 && (back[1] - p[1]).abs() < 1e-9);
    }

    #[test]
    fn affine_n_round_trips() {
        let a = vec![1.0, 2.0, 0.0, 1.0]; // [[1,2],[0,1]]
        let b = vec![1.0, -1.0];
        let t = Transform::affine(2, a, b).unwrap();
        let p = vec![1.0, 1.0];
        let mapped = t.map(&p);
        let back = t.inverse_map(&mapped);
        assert!((back[0] - p[0]).abs() < 1e-9 && (back[1] - p[1]).abs() < 1e-9);
    }

    #[test]
    fn precompose_shift_matches_definition() {
        let t = Transform::affine2(1.0, 0.0, 0.0, 1.0, 2.0, 3.0).unwrap();
        let v = vec![1.0, 1.0];
        let shifted = t.precompose_shift(&v);
        let x = vec![5.0, 5.0];
        let direct: Vec<f64> = t.map(&x.iter().zip(&v).map(|(&a, &b)| a + b).collect::<Vec<_>>());
        assert_eq!(shifted.map(&x), direct);
    }

    #[test]
    fn singular_matrix_rejected() {
        assert!(Transform::affine2(1.0, 1.0, 1.0, 1.0, 0.0, 0.0).is_err());
    }
}
