//! Per-stitcher configuration.
//!
//! The core owns no CLI or settings file (see Non-goals); this is a plain
//! value struct the embedding application constructs and threads through,
//! the same way the RAM budget in `stitch()` is "a process-wide configured
//! value" per the design notes rather than something the core discovers on
//! its own.

/// Tunables for a [`crate::stitcher::Stitcher`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StitchConfig {
    /// Total bytes of preloaded frame data a single tile may clone into RAM
    /// before the scheduler falls back to direct (possibly mapped-file)
    /// sampling. Default 256 MiB.
    pub preload_budget_bytes: u64,

    /// Preloading only triggers when the tile's destination footprint
    /// covers at least this fraction of the aggregate size of the frames
    /// overlapping it. Default 0.3 (30%), per the stitching design.
    pub preload_trigger_ratio: f64,
}

impl Default for StitchConfig {
    fn default() -> Self {
        StitchConfig {
            preload_budget_bytes: 256 * 1024 * 1024,
            preload_trigger_ratio: 0.3,
        }
    }
}
