//! Matrices and frames (C4).
//!
//! A [`Matrix`] is any n-dimensional, randomly-addressable source of `f64`
//! samples; it doesn't know where it sits in destination space. A [`Frame`]
//! pairs one with a [`FramePosition`] and tracks whether its backing
//! resources have been released. [`DenseMatrix`] is the crate's own
//! reference implementation, backed by `ndarray`, used by the test suite
//! and available to embedders who don't have their own raster type.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ndarray::ArrayD;

use crate::continued::ContinuationMode;
use crate::error::{StitchError, StitchResult};
use crate::position::FramePosition;

/// The element type a [`Matrix`] declares itself to hold. Stitching always
/// computes in `f64`; this is metadata a caller can use to pick an output
/// encoding, and the only source of `ElementTypeUnsupported` errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl ElementType {
    pub fn byte_size(&self) -> usize {
        match self {
            ElementType::I8 | ElementType::U8 => 1,
            ElementType::I16 | ElementType::U16 => 2,
            ElementType::I32 | ElementType::U32 | ElementType::F32 => 4,
            ElementType::F64 => 8,
        }
    }
}

/// Decodes a raw byte buffer into a [`DenseMatrix`] of `f64`, per the matrix
/// accessor's "canonical f64 value" contract: unsigned integers zero-extend,
/// signed integers widen, both land in `f64` by plain numeric conversion.
/// `bytes` must be exactly `dims.product() * element_type.byte_size()` long
/// and match the host's native endianness, since it's reinterpreted in place
/// rather than parsed byte-by-byte.
pub fn decode_raw_buffer(
    element_type: ElementType,
    dims: &[usize],
    bytes: &[u8],
) -> StitchResult<DenseMatrix> {
    let elem_count: usize = dims.iter().product();
    let expected_len = elem_count * element_type.byte_size();
    if bytes.len() != expected_len {
        return Err(StitchError::invalid_argument(format!(
            "raw buffer is {} bytes, expected {expected_len} for {elem_count} {element_type:?} elements",
            bytes.len()
        )));
    }

    let values: Vec<f64> = match element_type {
        ElementType::I8 => bytes.iter().map(|&b| b as i8 as f64).collect(),
        ElementType::U8 => bytes.iter().map(|&b| b as f64).collect(),
        ElementType::I16 => bytemuck::try_cast_slice::<u8, i16>(bytes)
            .map_err(|e| StitchError::invalid_argument(e.to_string()))?
            .iter()
            .map(|&v| v as f64)
            .collect(),
        ElementType::U16 => bytemuck::try_cast_slice::<u8, u16>(bytes)
            .map_err(|e| StitchError::invalid_argument(e.to_string()))?
            .iter()
            .map(|&v| v as f64)
            .collect(),
        ElementType::I32 => bytemuck::try_cast_slice::<u8, i32>(bytes)
            .map_err(|e| StitchError::invalid_argument(e.to_string()))?
            .iter()
            .map(|&v| v as f64)
            .collect(),
        ElementType::U32 => bytemuck::try_cast_slice::<u8, u32>(bytes)
            .map_err(|e| StitchError::invalid_argument(e.to_string()))?
            .iter()
            .map(|&v| v as f64)
            .collect(),
        ElementType::F32 => bytemuck::try_cast_slice::<u8, f32>(bytes)
            .map_err(|e| StitchError::invalid_argument(e.to_string()))?
            .iter()
            .map(|&v| v as f64)
            .collect(),
        ElementType::F64 => bytemuck::try_cast_slice::<u8, f64>(bytes)
            .map_err(|e| StitchError::invalid_argument(e.to_string()))?
            .to_vec(),
    };

    Ok(DenseMatrix::with_element_type(
        ArrayD::from_shape_vec(ndarray::IxDyn(dims), values)
            .map_err(|e| StitchError::invalid_argument(e.to_string()))?,
        element_type,
    ))
}

/// A randomly-addressable n-dimensional raster of real values.
///
/// Implementors need not be in-memory: `get` may page from disk or decode
/// on demand, which is why [`Frame::clone_into_memory`] exists as a
/// separate, explicit step for the stitcher's RAM-budget preload path.
pub trait Matrix: Send + Sync {
    fn dim_count(&self) -> usize;
    fn dim(&self, axis: usize) -> usize;
    fn dimensions(&self) -> Vec<usize> {
        (0..self.dim_count()).map(|k| self.dim(k)).collect()
    }
    fn element_type(&self) -> ElementType;

    /// Reads one element. `index` must be in-bounds; implementations may
    /// panic on an out-of-range index since every call site here routes
    /// through bounds-checked sampling first.
    fn get(&self, index: &[i64]) -> f64;

    /// An estimate of resident bytes, used by the stitcher's preload
    /// heuristic. Implementations that don't know may return an upper
    /// bound derived from `dimensions()` and `element_type()`.
    fn byte_size_estimate(&self) -> u64 {
        let elems: u64 = self.dimensions().iter().map(|&d| d as u64).product();
        elems * self.element_type().byte_size() as u64
    }

    /// Extracts a rectangular sub-region `[from, to)`, extending past the
    /// matrix's own extent using `mode`. `mode` of `None` is rejected by
    /// callers before this is invoked (see [`ContinuationMode`]).
    fn sub_matrix(
        &self,
        from: &[i64],
        to: &[i64],
        mode: ContinuationMode,
    ) -> StitchResult<DenseMatrix>
    where
        Self: Sized,
    {
        crate::continued::extract_sub_matrix(self, from, to, mode)
    }

    /// A raw, row-major `f64` slice view, if this matrix happens to be
    /// backed by one contiguous buffer already. Most implementations won't
    /// have one; the default returns `None` and callers fall back to
    /// element-by-element `get`.
    fn as_raw_slice(&self) -> Option<&[f64]> {
        None
    }
}

/// A [`Matrix`] that also accepts writes, used by the stitcher's own
/// destination buffer and by [`DenseMatrix`].
pub trait UpdatableMatrix: Matrix {
    fn set(&mut self, index: &[i64], value: f64);
}

/// An immutable `(matrix, position)` pair, the stitcher's unit of input.
///
/// `release_resources()` lets an embedder holding, say, a memory-mapped
/// file or a decoded-frame cache entry drop it once a stitch using this
/// frame has completed, without needing `Frame` itself to be droppable
/// mid-flight from another thread.
#[derive(Clone)]
pub struct Frame {
    matrix: Arc<dyn Matrix>,
    position: FramePosition,
    released: Arc<AtomicBool>,
}

impl Frame {
    pub fn new(matrix: Arc<dyn Matrix>, position: FramePosition) -> StitchResult<Self> {
        if matrix.dim_count() != position.dim_count() {
            return Err(StitchError::invalid_argument(format!(
                "frame matrix has {} dims but position has {}",
                matrix.dim_count(),
                position.dim_count()
            )));
        }
        let footprint = position.area();
        if footprint.size().iter().any(|&s| s == 0.0) {
            log::warn!("frame declares a zero-volume footprint {:?}", footprint);
        }
        Ok(Frame {
            matrix,
            position,
            released: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn matrix(&self) -> &Arc<dyn Matrix> {
        &self.matrix
    }

    pub fn position(&self) -> &FramePosition {
        &self.position
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Marks the frame's resources as released. Does not actually drop the
    /// backing matrix (another clone of this `Frame` may still be in use);
    /// it's advisory bookkeeping the stitcher consults before preloading.
    pub fn release_resources(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            log::warn!("release_resources() called on an already-released frame");
        }
    }

    pub fn sampler(&self) -> Arc<dyn Fn(&[f64]) -> f64 + Send + Sync> {
        self.position.as_interpolation_func(Arc::clone(&self.matrix))
    }

    pub fn byte_size_estimate(&self) -> u64 {
        self.matrix.byte_size_estimate()
    }

    /// Materializes the backing matrix into an in-memory [`DenseMatrix`],
    /// used by the stitcher's tile preload path to replace repeated
    /// (possibly expensive) `get` calls with direct array indexing.
    pub fn clone_into_memory(&self) -> DenseMatrix {
        DenseMatrix::from_matrix(self.matrix.as_ref())
    }
}

/// The crate's reference `Matrix`/`UpdatableMatrix` implementation: a
/// dense, row-major, in-memory array of arbitrary dimensionality.
#[derive(Debug, Clone)]
pub struct DenseMatrix {
    data: ArrayD<f64>,
    element_type: ElementType,
}

impl DenseMatrix {
    pub fn new(data: ArrayD<f64>) -> Self {
        DenseMatrix { data, element_type: ElementType::F64 }
    }

    pub fn with_element_type(data: ArrayD<f64>, element_type: ElementType) -> Self {
        DenseMatrix { data, element_type }
    }

    pub fn filled(dims: &[usize], value: f64) -> Self {
        DenseMatrix::new(ArrayD::from_elem(ndarray::IxDyn(dims), value))
    }

    /// Builds a 2-D matrix from row-major literal data, mainly for tests.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Self {
        let h = rows.len();
        let w = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut data = ArrayD::from_elem(ndarray::IxDyn(&[h, w]), f64::NAN);
        for (y, row) in rows.into_iter().enumerate() {
            for (x, v) in row.into_iter().enumerate() {
                data[ndarray::IxDyn(&[y, x])] = v;
            }
        }
        DenseMatrix::new(data)
    }

    /// Builds a 1-D matrix from literal data, mainly for tests.
    pub fn from_values(values: Vec<f64>) -> Self {
        DenseMatrix::new(ArrayD::from_shape_vec(ndarray::IxDyn(&[values.len()]), values).expect("shape matches length"))
    }

    fn from_matrix(m: &dyn Matrix) -> Self {
        let dims = m.dimensions();
        let mut data = ArrayD::from_elem(ndarray::IxDyn(&dims), 0.0);
        for (idx, slot) in data.indexed_iter_mut() {
            let idx64: Vec<i64> = idx.slice().iter().map(|&v| v as i64).collect();
            *slot = m.get(&idx64);
        }
        DenseMatrix { data, element_type: m.element_type() }
    }

    pub fn as_array(&self) -> &ArrayD<f64> {
        &self.data
    }
}

impl Matrix for DenseMatrix {
    fn dim_count(&self) -> usize {
        self.data.ndim()
    }

    fn dim(&self, axis: usize) -> usize {
        self.data.shape()[axis]
    }

    fn dimensions(&self) -> Vec<usize> {
        self.data.shape().to_vec()
    }

    fn element_type(&self) -> ElementType {
        self.element_type
    }

    fn get(&self, index: &[i64]) -> f64 {
        let idx: Vec<usize> = index.iter().map(|&v| v as usize).collect();
        self.data[ndarray::IxDyn(&idx)]
    }

    fn as_raw_slice(&self) -> Option<&[f64]> {
        self.data.as_slice()
    }
}

impl UpdatableMatrix for DenseMatrix {
    fn set(&mut self, index: &[i64], value: f64) {
        let idx: Vec<usize> = index.iter().map(|&v| v as usize).collect();
        self.data[ndarray::IxDyn(&idx)] = value;
    }
}
