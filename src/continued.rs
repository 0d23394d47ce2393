//! Continuation modes and the aperture processor wrapper (C7).
//!
//! Any algorithm that reads a neighborhood around each output point (an
//! "aperture processor" — a blur, a derivative, a resample kernel) needs an
//! answer for what lies past a matrix's declared extent. [`ContinuationMode`]
//! picks that answer; [`ContinuedProcessor`] wraps a processor so it never
//! has to special-case edges itself.

use crate::error::{StitchError, StitchResult};
use crate::matrix::{DenseMatrix, Matrix};

/// How to continue a matrix past its declared extent.
///
/// `None` is a real enum value (distinct from `Option::None`) because
/// callers often thread a `ContinuationMode` through from a user-facing
/// setting where "no continuation configured" and "continue with a
/// constant" are different mistakes to catch. It is always rejected with
/// `InvalidArgument` wherever a concrete mode is required — it exists only
/// so that requirement is a runtime check, not an `Option` the type system
/// already enforces elsewhere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ContinuationMode {
    /// Not a usable mode; constructing a processor with it is an error.
    None,
    /// Every out-of-bounds sample reads as this constant.
    Constant(f64),
    /// Indices wrap modulo the axis length: `i mod n`.
    Cyclic,
    /// Wraps like `Cyclic`, but alternates direction every period, stepping
    /// smoothly across the seam instead of jumping back to the start.
    PseudoCyclic,
    /// Bounces off each edge without repeating the edge sample:
    /// `... 2 1 0 1 2 ...` for a 3-wide axis.
    Reflect,
    /// Bounces off each edge repeating the edge sample:
    /// `... 1 0 0 1 ...` for a 3-wide axis.
    Mirror,
}

impl ContinuationMode {
    pub fn require_concrete(self) -> StitchResult<Self> {
        if matches!(self, ContinuationMode::None) {
            Err(StitchError::invalid_argument(
                "continuation mode `None` cannot be used where a concrete mode is required",
            ))
        } else {
            Ok(self)
        }
    }
}

/// Maps an out-of-range index back into `0..len` per `mode`. `mode` must
/// already have passed `require_concrete`.
fn map_index(i: i64, len: usize, mode: ContinuationMode) -> Option<i64> {
    if len == 0 {
        return None;
    }
    if i >= 0 && (i as usize) < len {
        return Some(i);
    }
    let n = len as i64;
    match mode {
        ContinuationMode::None => None,
        ContinuationMode::Constant(_) => None,
        ContinuationMode::Cyclic => Some(i.rem_euclid(n)),
        ContinuationMode::PseudoCyclic => {
            let period = 2 * n;
            let m = i.rem_euclid(period);
            Some(if m < n { m } else { period - 1 - m })
        }
        ContinuationMode::Reflect => {
            if n == 1 {
                return Some(0);
            }
            let period = 2 * (n - 1);
            let m = i.rem_euclid(period);
            Some(if m < n { m } else { period - m })
        }
        ContinuationMode::Mirror => {
            let period = 2 * n;
            let m = i.rem_euclid(period);
            Some(if m < n { m } else { period - 1 - m })
        }
    }
}

/// Samples `matrix` at `index`, applying `mode` to any out-of-range axis.
/// Returns the constant for `Constant` mode rather than an index remap.
pub fn get_continued(matrix: &dyn Matrix, index: &[i64], mode: ContinuationMode) -> f64 {
    if let ContinuationMode::Constant(c) = mode {
        let in_bounds = index
            .iter()
            .enumerate()
            .all(|(k, &i)| i >= 0 && (i as usize) < matrix.dim(k));
        if !in_bounds {
            return c;
        }
        return matrix.get(index);
    }
    let mut mapped = Vec::with_capacity(index.len());
    for (k, &i) in index.iter().enumerate() {
        match map_index(i, matrix.dim(k), mode) {
            Some(m) => mapped.push(m),
            None => return f64::NAN,
        }
    }
    matrix.get(&mapped)
}

/// Extracts `[from, to)` from `matrix`, continuing past its extent with
/// `mode`. `mode` of `ContinuationMode::None` is rejected up front.
pub fn extract_sub_matrix(
    matrix: &dyn Matrix,
    from: &[i64],
    to: &[i64],
    mode: ContinuationMode,
) -> StitchResult<DenseMatrix> {
    let mode = mode.require_concrete()?;
    if from.len() != to.len() || from.len() != matrix.dim_count() {
        return Err(StitchError::invalid_argument(
            "sub_matrix bounds dimensionality mismatch",
        ));
    }
    let dims: Vec<usize> = from
        .iter()
        .zip(to)
        .map(|(&lo, &hi)| {
            if hi < lo {
                Err(StitchError::invalid_area("sub_matrix to < from"))
            } else {
                Ok((hi - lo) as usize)
            }
        })
        .collect::<StitchResult<_>>()?;

    let elem_count: u128 = dims.iter().map(|&d| d as u128).product();
    if elem_count > usize::MAX as u128 {
        return Err(StitchError::TooLargeResult { element_count: elem_count });
    }

    let mut out = DenseMatrix::with_element_type(
        ndarray::ArrayD::from_elem(ndarray::IxDyn(&dims), f64::NAN),
        matrix.element_type(),
    );
    let mut coord = vec![0i64; dims.len()];
    loop {
        let src_index: Vec<i64> = coord.iter().zip(from).map(|(&c, &f)| c + f).collect();
        let dst_index: Vec<i64> = coord.clone();
        let value = get_continued(matrix, &src_index, mode);
        UpdatableMatrixSet(&mut out).set(&dst_index, value);

        if !advance(&mut coord, &dims) {
            break;
        }
    }
    Ok(out)
}

struct UpdatableMatrixSet<'a>(&'a mut DenseMatrix);
impl<'a> UpdatableMatrixSet<'a> {
    fn set(&mut self, index: &[i64], value: f64) {
        use crate::matrix::UpdatableMatrix;
        self.0.set(index, value);
    }
}

fn advance(coord: &mut [i64], dims: &[usize]) -> bool {
    for k in (0..coord.len()).rev() {
        coord[k] += 1;
        if (coord[k] as usize) < dims[k] {
            return true;
        }
        coord[k] = 0;
    }
    false
}

/// Something that computes an output sample from a neighborhood ("aperture")
/// around a point in some underlying matrix.
pub trait ApertureProcessor: Send + Sync {
    /// How many cells the aperture extends past the output point on each
    /// axis, on the low and high side respectively (e.g. a 3-tap blur on
    /// one axis reports `(1, 1)` for that axis).
    fn expansion(&self, dim_count: usize) -> Vec<(usize, usize)>;

    /// Computes the output value at `index` given a matrix view already
    /// padded by `expansion()` and continued per the configured mode, plus
    /// any additional matrices padded the same way (always zero-constant,
    /// regardless of the wrapper's own mode — see [`ContinuedProcessor::process_with_additional`]).
    fn apply(&self, padded: &dyn Matrix, additional: &[DenseMatrix], index: &[i64]) -> f64;
}

/// Wraps an [`ApertureProcessor`] with a concrete continuation mode so it
/// can be evaluated directly against an unpadded source matrix.
pub struct ContinuedProcessor<P: ApertureProcessor> {
    processor: P,
    mode: ContinuationMode,
}

impl<P: ApertureProcessor> ContinuedProcessor<P> {
    pub fn new(processor: P, mode: ContinuationMode) -> StitchResult<Self> {
        let mode = mode.require_concrete()?;
        Ok(ContinuedProcessor { processor, mode })
    }

    /// Runs the wrapped processor over `[from, to)` of `source`, continuing
    /// past `source`'s extent per the configured mode.
    pub fn process(
        &self,
        source: &dyn Matrix,
        from: &[i64],
        to: &[i64],
    ) -> StitchResult<DenseMatrix> {
        self.process_with_additional(source, &[], from, to)
    }

    /// Runs the wrapped processor over `[from, to)` of `source` plus any
    /// number of `additional` matrices sharing the same aperture shape
    /// descriptor (e.g. a per-pixel weight or mask raster feeding the same
    /// kernel). `source` is extended with this wrapper's configured mode;
    /// every entry in `additional` is always extended with a zero constant
    /// regardless of that mode, since an out-of-bounds auxiliary sample
    /// cannot itself affect output at valid pixels under aperture
    /// composition (spec'd rationale: a zero weight/mask contributes
    /// nothing to whatever the processor does with it).
    pub fn process_with_additional(
        &self,
        source: &dyn Matrix,
        additional: &[&dyn Matrix],
        from: &[i64],
        to: &[i64],
    ) -> StitchResult<DenseMatrix> {
        let expansion = self.processor.expansion(source.dim_count());
        let padded_from: Vec<i64> = from
            .iter()
            .zip(&expansion)
            .map(|(&f, &(lo, _))| f - lo as i64)
            .collect();
        let padded_to: Vec<i64> = to
            .iter()
            .zip(&expansion)
            .map(|(&t, &(_, hi))| t + hi as i64)
            .collect();
        let padded = extract_sub_matrix(source, &padded_from, &padded_to, self.mode)?;
        let padded_additional: Vec<DenseMatrix> = additional
            .iter()
            .map(|m| extract_sub_matrix(*m, &padded_from, &padded_to, ContinuationMode::Constant(0.0)))
            .collect::<StitchResult<_>>()?;

        let out_dims: Vec<usize> = from
            .iter()
            .zip(to)
            .map(|(&lo, &hi)| (hi - lo).max(0) as usize)
            .collect();
        let mut out = DenseMatrix::filled(&out_dims, 0.0);
        let mut coord = vec![0i64; out_dims.len()];
        loop {
            let padded_index: Vec<i64> = coord
                .iter()
                .zip(&expansion)
                .map(|(&c, &(lo, _))| c + lo as i64)
                .collect();
            let value = self.processor.apply(&padded, &padded_additional, &padded_index);
            UpdatableMatrixSet(&mut out).set(&coord, value);
            if !advance(&mut coord, &out_dims) {
                break;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::DenseMatrix;

    #[test]
    fn none_mode_is_rejected() {
        assert!(ContinuationMode::None.require_concrete().is_err());
    }

    #[test]
    fn constant_mode_fills_outside() {
        let m = DenseMatrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        assert_eq!(get_continued(&m, &[-1, 0], ContinuationMode::Constant(9.0)), 9.0);
        assert_eq!(get_continued(&m, &[0, 0], ContinuationMode::Constant(9.0)), 1.0);
    }

    #[test]
    fn cyclic_wraps_modulo_length() {
        let m = DenseMatrix::from_rows(vec![vec![1.0, 2.0, 3.0]]);
        assert_eq!(get_continued(&m, &[0, 3], ContinuationMode::Cyclic), 1.0);
        assert_eq!(get_continued(&m, &[0, -1], ContinuationMode::Cyclic), 3.0);
    }

    #[test]
    fn reflect_does_not_repeat_edge() {
        let m = DenseMatrix::from_rows(vec![vec![10.0, 20.0, 30.0]]);
        // len 3: period = 2*(3-1) = 4. index -1 -> rem_euclid 4 -> 3 -> period-3=1
        assert_eq!(get_continued(&m, &[0, -1], ContinuationMode::Reflect), 20.0);
    }

    #[test]
    fn mirror_repeats_edge() {
        let m = DenseMatrix::from_rows(vec![vec![10.0, 20.0, 30.0]]);
        assert_eq!(get_continued(&m, &[0, -1], ContinuationMode::Mirror), 10.0);
    }

    #[test]
    fn sub_matrix_extracts_interior_unchanged() {
        let m = DenseMatrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        let sub = extract_sub_matrix(&m, &[0, 0], &[2, 2], ContinuationMode::Constant(0.0)).unwrap();
        assert_eq!(sub.get(&[1, 1]), 4.0);
    }

    /// A 1-axis 3-tap box filter: `expansion` reports one cell of padding
    /// on each side, `apply` averages the three padded samples under the
    /// index.
    struct BoxBlur3;

    impl ApertureProcessor for BoxBlur3 {
        fn expansion(&self, dim_count: usize) -> Vec<(usize, usize)> {
            vec![(1, 1); dim_count]
        }
        fn apply(&self, padded: &dyn Matrix, _additional: &[DenseMatrix], index: &[i64]) -> f64 {
            let lo = padded.get(&[index[0] - 1]);
            let mid = padded.get(&[index[0]]);
            let hi = padded.get(&[index[0] + 1]);
            (lo + mid + hi) / 3.0
        }
    }

    #[test]
    fn continued_processor_extends_with_constant_at_the_edge() {
        let m = DenseMatrix::from_values(vec![3.0, 6.0, 9.0]);
        let wrapped = ContinuedProcessor::new(BoxBlur3, ContinuationMode::Constant(0.0)).unwrap();
        let out = wrapped.process(&m, &[0], &[3]).unwrap();
        // index 0: padded [0(const), 3, 6] -> 3.0
        assert!((out.get(&[0]) - 3.0).abs() < 1e-9);
        // index 1 (interior): [3, 6, 9] -> 6.0
        assert!((out.get(&[1]) - 6.0).abs() < 1e-9);
        // index 2: [6, 9, 0(const)] -> 5.0
        assert!((out.get(&[2]) - 5.0).abs() < 1e-9);
    }

    /// A processor that masks its primary aperture sample by a same-shaped
    /// additional matrix, to exercise the always-zero-constant continuation
    /// of `additional` regardless of the wrapper's own mode.
    struct MaskedPassThrough;

    impl ApertureProcessor for MaskedPassThrough {
        fn expansion(&self, dim_count: usize) -> Vec<(usize, usize)> {
            vec![(1, 0); dim_count]
        }
        fn apply(&self, padded: &dyn Matrix, additional: &[DenseMatrix], index: &[i64]) -> f64 {
            let mask = additional[0].get(&[index[0] - 1]);
            let sample = padded.get(&[index[0] - 1]);
            sample * mask
        }
    }

    #[test]
    fn additional_matrices_always_extend_with_zero_constant() {
        let source = DenseMatrix::from_values(vec![10.0, 20.0, 30.0]);
        let mask = DenseMatrix::from_values(vec![1.0, 1.0, 1.0]);
        // Configure the wrapper's own mode as `Reflect` so a source read
        // past the edge would NOT be zero -- the additional matrix must
        // still use zero-constant regardless of this choice.
        let wrapped = ContinuedProcessor::new(MaskedPassThrough, ContinuationMode::Reflect).unwrap();
        let out = wrapped
            .process_with_additional(&source, &[&mask as &dyn Matrix], &[0], &[3])
            .unwrap();
        // At index 0, expansion reads index -1: source reflects to 20.0,
        // but the mask is out-of-bounds and must read as 0.0, zeroing the
        // output regardless of the source's own reflected value.
        assert_eq!(out.get(&[0]), 0.0);
        // At index 1, both reads are in-bounds: mask 1.0 * source 10.0.
        assert_eq!(out.get(&[1]), 10.0);
    }
}
