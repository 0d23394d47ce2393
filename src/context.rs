//! Progress reporting and cancellation.
//!
//! The core has no opinion about where progress goes (terminal, GUI
//! progress bar, log line) — it only needs somewhere to report fractional
//! completion and somewhere to ask "should I stop." [`NullContext`] is the
//! default for callers who don't care.
//!
//! `part(a, b)` is the subdivision primitive: a multi-phase operation (the
//! tiled stitch's per-tile preload-then-compose split, for instance) asks
//! for a narrower context covering `[a, b]` of its own range and reports
//! into that without needing to know its place in the whole. Phases nest
//! this way to arbitrary depth.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A sink for fractional progress reports and a source of cancellation
/// requests, threaded through [`crate::stitcher::Stitcher::stitch`].
pub trait ProgressContext: Send + Sync {
    /// Reports that this context's own span is `fraction` (clamped to
    /// `0.0..=1.0`) complete.
    fn report(&self, fraction: f64);

    /// Returns a sub-context whose own `0.0..=1.0` progress is mapped onto
    /// `[a, b]` of this context's range.
    fn part(&self, a: f64, b: f64) -> Box<dyn ProgressContext>;

    /// Polled between tiles; a `true` return aborts the stitch with
    /// [`crate::error::StitchError::Cancelled`].
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// A `ProgressContext` that reports nothing and never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullContext;

impl ProgressContext for NullContext {
    fn report(&self, _fraction: f64) {}
    fn part(&self, _a: f64, _b: f64) -> Box<dyn ProgressContext> {
        Box::new(NullContext)
    }
}

/// The root of a reporting hierarchy: forwards absolute `0.0..=1.0`
/// progress to a caller-supplied callback and carries the shared
/// cancellation flag every `part()` descendant consults.
#[derive(Clone)]
pub struct RootProgress {
    report_fn: Arc<dyn Fn(f64) + Send + Sync>,
    cancelled: Arc<AtomicBool>,
}

impl RootProgress {
    pub fn new(report_fn: impl Fn(f64) + Send + Sync + 'static) -> Self {
        RootProgress { report_fn: Arc::new(report_fn), cancelled: Arc::new(AtomicBool::new(false)) }
    }

    /// A [`CancellationToken`] sharing this root's cancellation flag, for
    /// handing to something (a GUI button handler) that only needs to
    /// request cancellation, not report progress.
    pub fn cancellation_token(&self) -> CancellationToken {
        CancellationToken { cancelled: Arc::clone(&self.cancelled) }
    }
}

impl ProgressContext for RootProgress {
    fn report(&self, fraction: f64) {
        (self.report_fn)(fraction.clamp(0.0, 1.0));
    }

    fn part(&self, a: f64, b: f64) -> Box<dyn ProgressContext> {
        Box::new(RangeProgress {
            report_fn: Arc::clone(&self.report_fn),
            cancelled: Arc::clone(&self.cancelled),
            a,
            b,
        })
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// A non-root context produced by [`ProgressContext::part`]; remaps its own
/// `0.0..=1.0` span onto `[a, b]` of whatever produced it, recursively.
struct RangeProgress {
    report_fn: Arc<dyn Fn(f64) + Send + Sync>,
    cancelled: Arc<AtomicBool>,
    a: f64,
    b: f64,
}

impl ProgressContext for RangeProgress {
    fn report(&self, fraction: f64) {
        let clamped = fraction.clamp(0.0, 1.0);
        (self.report_fn)(self.a + clamped * (self.b - self.a));
    }

    fn part(&self, a: f64, b: f64) -> Box<dyn ProgressContext> {
        let span = self.b - self.a;
        Box::new(RangeProgress {
            report_fn: Arc::clone(&self.report_fn),
            cancelled: Arc::clone(&self.cancelled),
            a: self.a + a * span,
            b: self.a + b * span,
        })
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// A standalone cancellation flag an embedder can flip from another thread
/// (e.g. a GUI "Cancel" button handler) to request the current stitch stop
/// at the next tile boundary. Reports nothing.
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken { cancelled: Arc::new(AtomicBool::new(false)) }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

impl ProgressContext for CancellationToken {
    fn report(&self, _fraction: f64) {}
    fn part(&self, _a: f64, _b: f64) -> Box<dyn ProgressContext> {
        Box::new(self.clone())
    }
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
