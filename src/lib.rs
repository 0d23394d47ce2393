//! framestitch - lazy, coordinate-indexed n-dimensional matrix stitching.
//!
//! Combines several positioned, independently-sourced matrix "frames" into
//! one composite view, sampled either lazily point-by-point
//! ([`stitcher::Stitcher::as_stitched`]) or materialized tile-by-tile into
//! a dense array ([`stitcher::Stitcher::stitch`]). The geometry (C1, C2,
//! C3), the frame abstraction (C4), the stitching-function family (C5),
//! the stitcher itself (C6), and the out-of-bounds continuation wrapper
//! (C7) each live in their own module below.

pub mod area;
pub mod config;
pub mod continued;
pub mod context;
pub mod error;
pub mod matrix;
pub mod position;
pub mod reduce;
pub mod stitcher;
pub mod transform;

pub use area::{Area, IntegerArea};
pub use config::StitchConfig;
pub use continued::{ApertureProcessor, ContinuationMode, ContinuedProcessor};
pub use context::{CancellationToken, NullContext, ProgressContext, RootProgress};
pub use error::{StitchError, StitchResult};
pub use matrix::{decode_raw_buffer, DenseMatrix, ElementType, Frame, Matrix, UpdatableMatrix};
pub use position::FramePosition;
pub use reduce::{
    AverageNotNan, Contribution, FirstNotNan, LastNotNan, MaxNotNan, MinNotNan, NearestFrame,
    StitchMethod, WeightedFrames,
};
pub use stitcher::{LazyMatrix, Stitcher};
pub use transform::Transform;
