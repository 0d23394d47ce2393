//! Stitching-function family (C5): the policies that turn several frames'
//! values at one destination point into a single output value.
//!
//! Every [`StitchMethod`] declares three predicates the stitcher consults
//! to pick an execution path before it ever calls `reduce`:
//!
//! - `coordinate_free`: the method only looks at the NaN-filtered value
//!   list, never at the point or each frame's geometry, so the stitcher may
//!   run it over a plain stacked sub-matrix without threading coordinates
//!   through at all (execution path 3).
//! - `simple_for_empty_space`: when zero frames cover a point, the method's
//!   answer is always the same fixed `outside_value()` — lets the stitcher
//!   skip invoking the method entirely over empty-space tiles.
//! - `simple_for_single_frame`: when exactly one frame covers a point, the
//!   method's answer always equals that frame's own value — lets the
//!   stitcher pass single-frame regions straight through.
//!
//! Every built-in method carries its own `default` value, reported by
//! `outside_value()` and substituted whenever every candidate sample is NaN.

use crate::area::Area;

/// One frame's contribution to a destination point: its sampled value (may
/// be NaN if the point falls outside the frame despite being inside its
/// declared footprint, e.g. near a rotated edge) plus enough geometry for
/// distance-aware methods to weigh it.
#[derive(Debug, Clone, Copy)]
pub struct Contribution {
    pub frame_index: usize,
    pub value: f64,
    /// Signed parallel distance from the point to the frame's own
    /// footprint boundary (see [`Area::parallel_distance`]), evaluated in
    /// whichever space the stitcher determined is correct for this frame's
    /// position kind (destination space for `Shift`, source-local space
    /// after the frame's inverse transform for `Universal`).
    pub distance: f64,
}

/// A stitching-function policy.
pub trait StitchMethod: Send + Sync {
    /// The value to report when no frame covers a destination point, or
    /// when every candidate sample was NaN.
    fn outside_value(&self) -> f64;

    /// True if this method never needs the point or per-frame geometry —
    /// only the list of (already NaN-filtered) contributing values.
    fn coordinate_free(&self) -> bool;

    /// True if, given zero covering frames, the answer is always exactly
    /// `outside_value()` with no other computation required.
    fn simple_for_empty_space(&self) -> bool {
        true
    }

    /// True if, given exactly one covering frame, the answer always equals
    /// that frame's own sampled value verbatim.
    fn simple_for_single_frame(&self) -> bool;

    /// Full entry point: combines `contributions` (already filtered to
    /// frames whose declared footprint covers `point`; values may still be
    /// individually NaN) into one output value.
    fn reduce(&self, point: &[f64], contributions: &[Contribution]) -> f64;

    /// Coordinate-free entry point, used only when `coordinate_free()` is
    /// true. `values` has already had NaNs stripped by the caller for
    /// methods that skip them; methods that don't skip NaNs (there are
    /// none among the built-ins) would need `coordinate_free() == false`.
    fn reduce_values(&self, values: &[f64]) -> f64;

    /// The distance the stitcher should record on a frame's `Contribution`
    /// at `point`, given that frame's footprint. Distance-aware methods
    /// that need a different notion of "depth" than the raw footprint
    /// distance (see [`WeightedFrames`]'s `-0.5` sample-center alignment)
    /// override this; coordinate-free methods never call it.
    fn frame_distance(&self, footprint: &Area, point: &[f64]) -> f64 {
        footprint.parallel_distance(point)
    }
}

fn not_nan_values(contributions: &[Contribution]) -> impl Iterator<Item = f64> + '_ {
    contributions.iter().map(|c| c.value).filter(|v| !v.is_nan())
}

/// Reports the first (lowest frame index) non-NaN value, or `default`.
#[derive(Debug, Clone, Copy)]
pub struct FirstNotNan {
    pub default: f64,
}

impl FirstNotNan {
    pub fn new(default: f64) -> Self {
        FirstNotNan { default }
    }
}

impl Default for FirstNotNan {
    fn default() -> Self {
        FirstNotNan { default: f64::NAN }
    }
}

impl StitchMethod for FirstNotNan {
    fn outside_value(&self) -> f64 {
        self.default
    }
    fn coordinate_free(&self) -> bool {
        true
    }
    fn simple_for_single_frame(&self) -> bool {
        true
    }
    fn reduce(&self, _point: &[f64], contributions: &[Contribution]) -> f64 {
        not_nan_values(contributions).next().unwrap_or(self.default)
    }
    fn reduce_values(&self, values: &[f64]) -> f64 {
        match values {
            [] => self.default,
            [a] => *a,
            [a, b] => if a.is_nan() { *b } else { *a },
            _ => values.iter().copied().find(|v| !v.is_nan()).unwrap_or(self.default),
        }
    }
}

/// Reports the last (highest frame index) non-NaN value, or `default`.
#[derive(Debug, Clone, Copy)]
pub struct LastNotNan {
    pub default: f64,
}

impl LastNotNan {
    pub fn new(default: f64) -> Self {
        LastNotNan { default }
    }
}

impl Default for LastNotNan {
    fn default() -> Self {
        LastNotNan { default: f64::NAN }
    }
}

impl StitchMethod for LastNotNan {
    fn outside_value(&self) -> f64 {
        self.default
    }
    fn coordinate_free(&self) -> bool {
        true
    }
    fn simple_for_single_frame(&self) -> bool {
        true
    }
    fn reduce(&self, _point: &[f64], contributions: &[Contribution]) -> f64 {
        not_nan_values(contributions).last().unwrap_or(self.default)
    }
    fn reduce_values(&self, values: &[f64]) -> f64 {
        match values {
            [] => self.default,
            [a] => *a,
            [a, b] => if b.is_nan() { *a } else { *b },
            _ => values.iter().copied().rev().find(|v| !v.is_nan()).unwrap_or(self.default),
        }
    }
}

/// Reports the minimum of all non-NaN values, or `default`.
#[derive(Debug, Clone, Copy)]
pub struct MinNotNan {
    pub default: f64,
}

impl MinNotNan {
    pub fn new(default: f64) -> Self {
        MinNotNan { default }
    }
}

impl Default for MinNotNan {
    fn default() -> Self {
        MinNotNan { default: f64::NAN }
    }
}

impl StitchMethod for MinNotNan {
    fn outside_value(&self) -> f64 {
        self.default
    }
    fn coordinate_free(&self) -> bool {
        true
    }
    fn simple_for_single_frame(&self) -> bool {
        true
    }
    fn reduce(&self, _point: &[f64], contributions: &[Contribution]) -> f64 {
        fold_not_nan(not_nan_values(contributions), self.default, f64::min)
    }
    fn reduce_values(&self, values: &[f64]) -> f64 {
        fold_not_nan(values.iter().copied(), self.default, f64::min)
    }
}

/// Reports the maximum of all non-NaN values, or `default`.
#[derive(Debug, Clone, Copy)]
pub struct MaxNotNan {
    pub default: f64,
}

impl MaxNotNan {
    pub fn new(default: f64) -> Self {
        MaxNotNan { default }
    }
}

impl Default for MaxNotNan {
    fn default() -> Self {
        MaxNotNan { default: f64::NAN }
    }
}

impl StitchMethod for MaxNotNan {
    fn outside_value(&self) -> f64 {
        self.default
    }
    fn coordinate_free(&self) -> bool {
        true
    }
    fn simple_for_single_frame(&self) -> bool {
        true
    }
    fn reduce(&self, _point: &[f64], contributions: &[Contribution]) -> f64 {
        fold_not_nan(not_nan_values(contributions), self.default, f64::max)
    }
    fn reduce_values(&self, values: &[f64]) -> f64 {
        fold_not_nan(values.iter().copied(), self.default, f64::max)
    }
}

fn fold_not_nan(values: impl Iterator<Item = f64>, default: f64, op: impl Fn(f64, f64) -> f64) -> f64 {
    let mut acc: Option<f64> = None;
    for v in values.filter(|v| !v.is_nan()) {
        acc = Some(match acc {
            None => v,
            Some(a) => op(a, v),
        });
    }
    acc.unwrap_or(default)
}

/// Reports the arithmetic mean of all non-NaN values, or `default` if none.
#[derive(Debug, Clone, Copy)]
pub struct AverageNotNan {
    pub default: f64,
}

impl AverageNotNan {
    pub fn new(default: f64) -> Self {
        AverageNotNan { default }
    }
}

impl Default for AverageNotNan {
    fn default() -> Self {
        AverageNotNan { default: f64::NAN }
    }
}

impl StitchMethod for AverageNotNan {
    fn outside_value(&self) -> f64 {
        self.default
    }
    fn coordinate_free(&self) -> bool {
        true
    }
    fn simple_for_single_frame(&self) -> bool {
        true
    }
    fn reduce(&self, _point: &[f64], contributions: &[Contribution]) -> f64 {
        self.reduce_values(&not_nan_values(contributions).collect::<Vec<_>>())
    }
    fn reduce_values(&self, values: &[f64]) -> f64 {
        let (sum, count) = values
            .iter()
            .filter(|v| !v.is_nan())
            .fold((0.0, 0u32), |(s, c), &v| (s + v, c + 1));
        if count == 0 {
            self.default
        } else {
            sum / count as f64
        }
    }
}

/// Reports the value of whichever frame's footprint the point sits
/// deepest inside (smallest `parallel_distance`), ties broken toward the
/// later (higher-index) frame, or `default` if no frame has a non-NaN
/// sample.
#[derive(Debug, Clone, Copy)]
pub struct NearestFrame {
    pub default: f64,
}

impl NearestFrame {
    pub fn new(default: f64) -> Self {
        NearestFrame { default }
    }
}

impl Default for NearestFrame {
    fn default() -> Self {
        NearestFrame { default: f64::NAN }
    }
}

impl StitchMethod for NearestFrame {
    fn outside_value(&self) -> f64 {
        self.default
    }
    fn coordinate_free(&self) -> bool {
        false
    }
    fn simple_for_single_frame(&self) -> bool {
        true
    }
    fn reduce(&self, _point: &[f64], contributions: &[Contribution]) -> f64 {
        let mut best: Option<&Contribution> = None;
        for c in contributions {
            if c.value.is_nan() {
                continue;
            }
            // `<=` so a later frame at an equal distance overrides an
            // earlier one — matches the spec's later-wins tie-break.
            if best.map_or(true, |b| c.distance <= b.distance) {
                best = Some(c);
            }
        }
        best.map(|c| c.value).unwrap_or(self.default)
    }
    fn reduce_values(&self, _values: &[f64]) -> f64 {
        unreachable!("NearestFrame is not coordinate_free")
    }
}

/// Reports an inverse-depth-weighted blend of every covering frame's value.
/// Only frames interior to their footprint within `boundary_epsilon` (`d <
/// boundary_epsilon`, footprint shifted by `-0.5` per axis) contribute; the
/// result is `Σ(w · sample) / Σ(w)` with `w = boundary_epsilon - d` over
/// those. If no contributor qualifies, reports `default`.
///
/// Footprints are shifted by `-0.5` on every axis before computing depth —
/// this aligns the footprint's "inside" with sample centers, since frame
/// positions are declared in raw pixel-index (not pixel-center)
/// coordinates. See [`crate::area`] module docs.
///
/// `boundary_epsilon` resolves the spec's open question about frames that
/// abut exactly on the boundary (`d = 0`): the default `0.0` reproduces the
/// original `d < 0` cutoff verbatim (a pixel touched only by abutting
/// boundaries falls back to `default`), while a positive value lets
/// boundary-touching frames contribute a small weight instead, closing the
/// single-pixel seam at the cost of changing the default's observable
/// output. See `DESIGN.md` for the rationale.
#[derive(Debug, Clone, Copy)]
pub struct WeightedFrames {
    pub default: f64,
    pub boundary_epsilon: f64,
}

impl WeightedFrames {
    pub fn new(default: f64) -> Self {
        WeightedFrames { default, boundary_epsilon: 0.0 }
    }

    /// Builds a weighted reducer that also counts frames within
    /// `boundary_epsilon` of their (`-0.5`-shifted) footprint boundary as
    /// contributors, rather than requiring strict interior (`d < 0`).
    pub fn with_boundary_epsilon(default: f64, boundary_epsilon: f64) -> Self {
        WeightedFrames { default, boundary_epsilon }
    }
}

impl Default for WeightedFrames {
    fn default() -> Self {
        WeightedFrames { default: f64::NAN, boundary_epsilon: 0.0 }
    }
}

impl StitchMethod for WeightedFrames {
    fn outside_value(&self) -> f64 {
        self.default
    }
    fn coordinate_free(&self) -> bool {
        false
    }
    fn simple_for_single_frame(&self) -> bool {
        // A lone covering frame can still sit on or outside its own
        // `-0.5`-shifted footprint beyond `boundary_epsilon`, where the real
        // formula reports `default` rather than passing the value through.
        // Keeping this false routes that edge case through the real formula
        // instead of a fast path that would silently disagree with it.
        false
    }
    fn reduce(&self, _point: &[f64], contributions: &[Contribution]) -> f64 {
        let mut weight_sum = 0.0;
        let mut value_sum = 0.0;
        for c in contributions {
            if c.value.is_nan() || c.distance >= self.boundary_epsilon {
                continue;
            }
            let w = self.boundary_epsilon - c.distance;
            weight_sum += w;
            value_sum += w * c.value;
        }
        if weight_sum <= 0.0 {
            self.default
        } else {
            value_sum / weight_sum
        }
    }
    fn reduce_values(&self, _values: &[f64]) -> f64 {
        unreachable!("WeightedFrames is not coordinate_free")
    }
    fn frame_distance(&self, footprint: &Area, point: &[f64]) -> f64 {
        weighted_depth(footprint, point)
    }
}

/// Computes a frame's footprint depth at `point`, applying the `-0.5`
/// sample-center alignment shift that [`WeightedFrames`] relies on. Shared
/// with the stitcher so both sides of the `Contribution::distance`
/// contract agree on what "distance" means for this method.
pub fn weighted_depth(footprint: &Area, point: &[f64]) -> f64 {
    footprint.shift_uniform(-0.5).parallel_distance(point)
}
