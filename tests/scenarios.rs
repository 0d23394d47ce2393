//! End-to-end scenarios over literal inputs, one per concrete case in the
//! stitching design notes. Coordinates below are `(row, col)` = `(y, x)`
//! throughout, matching `DenseMatrix::from_rows`.

use std::sync::Arc;

use framestitch::{
    Area, AverageNotNan, DenseMatrix, FirstNotNan, Frame, FramePosition, Matrix, MinNotNan,
    NearestFrame, StitchConfig, Stitcher, WeightedFrames,
};

fn shift_frame_2d(origin: [f64; 2], rows: Vec<Vec<f64>>) -> Frame {
    let dims = vec![rows.len(), rows.first().map(|r| r.len()).unwrap_or(0)];
    let m: Arc<dyn Matrix> = Arc::new(DenseMatrix::from_rows(rows));
    let pos = FramePosition::shift(origin.to_vec(), dims).unwrap();
    Frame::new(m, pos).unwrap()
}

fn shift_frame_1d(origin: f64, values: Vec<f64>) -> Frame {
    let dims = vec![values.len()];
    let m: Arc<dyn Matrix> = Arc::new(DenseMatrix::from_values(values));
    let pos = FramePosition::shift(vec![origin], dims).unwrap();
    Frame::new(m, pos).unwrap()
}

/// S1 (empty): no frames, `average_not_nan(default=42)`, area [(0,0),(3,2)].
/// Expected 3x2 output (rows=2, cols=3 in (y,x)) is all 42.
#[test]
fn s1_empty_frame_set_fills_default() {
    let stitcher = Stitcher::new(2, vec![], Arc::new(AverageNotNan::new(42.0))).unwrap();
    let dest = Area::from_origin_dims(&[0.0, 0.0], &[2, 3]).unwrap();
    let out = stitcher.stitch(&dest, &StitchConfig::default()).unwrap();
    for y in 0..2 {
        for x in 0..3 {
            assert_eq!(out.get(&[y, x]), 42.0);
        }
    }
}

/// S2 (single shift): one frame at shift (1,1) in a 4x3 destination,
/// `first_not_nan(default=0)`.
#[test]
fn s2_single_shifted_frame() {
    let frame = shift_frame_2d([1.0, 1.0], vec![vec![10.0, 20.0, 30.0], vec![40.0, 50.0, 60.0]]);
    let stitcher = Stitcher::new(2, vec![frame], Arc::new(FirstNotNan::new(0.0))).unwrap();
    let dest = Area::from_origin_dims(&[0.0, 0.0], &[3, 4]).unwrap();
    let out = stitcher.stitch(&dest, &StitchConfig::default()).unwrap();

    let expected = [
        [0.0, 0.0, 0.0, 0.0],
        [0.0, 10.0, 20.0, 30.0],
        [0.0, 40.0, 50.0, 60.0],
    ];
    for (y, row) in expected.iter().enumerate() {
        for (x, &v) in row.iter().enumerate() {
            assert_eq!(out.get(&[y as i64, x as i64]), v, "at (y={y}, x={x})");
        }
    }
}

/// S3 (nearest tie-break): two 2x2 frames at (0,0) and (0,1) [y,x], the
/// second read as all-twos. At the shared column their footprint distances
/// tie; the later frame must win.
#[test]
fn s3_nearest_frame_tie_break_favors_later_frame() {
    let a = shift_frame_2d([0.0, 0.0], vec![vec![1.0, 1.0], vec![1.0, 1.0]]);
    let b = shift_frame_2d([0.0, 1.0], vec![vec![2.0, 2.0], vec![2.0, 2.0]]);
    let stitcher = Stitcher::new(2, vec![a, b], Arc::new(NearestFrame::new(0.0))).unwrap();
    let dest = Area::from_origin_dims(&[0.0, 0.0], &[2, 3]).unwrap();
    let out = stitcher.stitch(&dest, &StitchConfig::default()).unwrap();
    assert_eq!(out.get(&[0, 1]), 2.0, "tied column must resolve to the later frame");
}

/// S4 (weighted seam): two 4-wide 1-D frames, `[1,1,1,1]` at shift 0 and
/// `[5,5,5,5]` at shift 2, `weighted_frames(default=0)`.
#[test]
fn s4_weighted_seam_blends_by_footprint_depth() {
    let a = shift_frame_1d(0.0, vec![1.0, 1.0, 1.0, 1.0]);
    let b = shift_frame_1d(2.0, vec![5.0, 5.0, 5.0, 5.0]);
    let stitcher = Stitcher::new(1, vec![a, b], Arc::new(WeightedFrames::new(0.0))).unwrap();
    let dest = Area::from_origin_dims(&[0.0], &[6]).unwrap();
    let out = stitcher.stitch(&dest, &StitchConfig::default()).unwrap();

    let expected = [1.0, 1.0, 2.0, 4.0, 5.0, 5.0];
    for (x, &v) in expected.iter().enumerate() {
        assert!(
            (out.get(&[x as i64]) - v).abs() < 1e-9,
            "at x={x}: expected {v}, got {}",
            out.get(&[x as i64])
        );
    }
}

/// S5 (min-skip-NaN): three 2x2 frames at the same shift, `min_not_nan(99)`.
#[test]
fn s5_min_not_nan_skips_nan_across_frames() {
    let a = shift_frame_2d([0.0, 0.0], vec![vec![1.0, f64::NAN], vec![3.0, 4.0]]);
    let b = shift_frame_2d([0.0, 0.0], vec![vec![f64::NAN, 2.0], vec![f64::NAN, 4.0]]);
    let c = shift_frame_2d([0.0, 0.0], vec![vec![0.0, f64::NAN], vec![f64::NAN, f64::NAN]]);
    let stitcher = Stitcher::new(2, vec![a, b, c], Arc::new(MinNotNan::new(99.0))).unwrap();
    let dest = Area::from_origin_dims(&[0.0, 0.0], &[2, 2]).unwrap();
    let out = stitcher.stitch(&dest, &StitchConfig::default()).unwrap();

    let expected = [[0.0, 2.0], [3.0, 4.0]];
    for (y, row) in expected.iter().enumerate() {
        for (x, &v) in row.iter().enumerate() {
            assert_eq!(out.get(&[y as i64, x as i64]), v, "at (y={y}, x={x})");
        }
    }
}

/// S6 (tiling invariance): the S4 scenario materialized with `tile_dims =
/// (6,)` (one whole-span tile) and `tile_dims = (2,)` (three tiles of 2)
/// must be byte-identical, per spec §8 property 4 — the scheduler's tile
/// boundaries must have no observable effect on the result.
#[test]
fn s6_stitch_into_is_invariant_to_tile_dims() {
    let a = shift_frame_1d(0.0, vec![1.0, 1.0, 1.0, 1.0]);
    let b = shift_frame_1d(2.0, vec![5.0, 5.0, 5.0, 5.0]);
    let method: Arc<WeightedFrames> = Arc::new(WeightedFrames::new(0.0));
    let stitcher = Stitcher::new(1, vec![a, b], method).unwrap();

    let mut one_tile = DenseMatrix::filled(&[6], f64::NAN);
    stitcher.stitch_into(&mut one_tile, &[0], &[6], &StitchConfig::default()).unwrap();

    let mut small_tiles = DenseMatrix::filled(&[6], f64::NAN);
    stitcher.stitch_into(&mut small_tiles, &[0], &[2], &StitchConfig::default()).unwrap();

    let mut whole_dim_tiles = DenseMatrix::filled(&[6], f64::NAN);
    stitcher.stitch_into(&mut whole_dim_tiles, &[0], &[-1], &StitchConfig::default()).unwrap();

    let expected = [1.0, 1.0, 2.0, 4.0, 5.0, 5.0];
    for x in 0..6i64 {
        assert!((one_tile.get(&[x]) - expected[x as usize]).abs() < 1e-9);
        assert_eq!(one_tile.get(&[x]), small_tiles.get(&[x]), "at x={x}");
        assert_eq!(one_tile.get(&[x]), whole_dim_tiles.get(&[x]), "at x={x}");
    }
}
