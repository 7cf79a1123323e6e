//! Render and selection configuration.
//!
//! [`RenderOptions`] threads progress callbacks, cancellation tokens, and the
//! concurrency limit through the render engine without widening every
//! signature. [`SelectionOptions`] holds the knobs of the dark/light frame
//! picker.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use compshot::{CancellationToken, ProgressCallback, ProgressInfo, RenderOptions};
//!
//! struct LogProgress;
//! impl ProgressCallback for LogProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("{:?}: {} done", info.operation, info.current);
//!     }
//! }
//!
//! let token = CancellationToken::new();
//! let options = RenderOptions::new()
//!     .with_progress(Arc::new(LogProgress))
//!     .with_cancellation(token.clone())
//!     .with_max_concurrency(4)
//!     .with_batch_size(10);
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use crate::error::CompshotError;
use crate::progress::{CancellationToken, NoOpProgress, OperationType, ProgressCallback};

/// Settings for one render session.
#[derive(Clone)]
pub struct RenderOptions {
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) cancellation: Option<CancellationToken>,
    pub(crate) batch_size: u64,
    pub(crate) max_concurrency: Option<usize>,
    pub(crate) operation: OperationType,
}

impl Debug for RenderOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("RenderOptions")
            .field("has_cancellation", &self.cancellation.is_some())
            .field("batch_size", &self.batch_size)
            .field("max_concurrency", &self.max_concurrency)
            .field("operation", &self.operation)
            .finish()
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderOptions {
    /// Defaults: no progress callback, no cancellation, batch size 1, and as
    /// many requests in flight as the source has workers.
    pub fn new() -> Self {
        Self {
            progress: Arc::new(NoOpProgress),
            cancellation: None,
            batch_size: 1,
            max_concurrency: None,
            operation: OperationType::Rendering,
        }
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Report progress every `size` frames. Clamped to a minimum of 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Limit the number of frame requests in flight.
    ///
    /// The effective limit is clamped to `[1, source.worker_count()]`.
    #[must_use]
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    /// Label progress reports with a different operation.
    #[must_use]
    pub fn with_operation(mut self, operation: OperationType) -> Self {
        self.operation = operation;
        self
    }

    /// Resolve the in-flight limit for a source advertising `workers`.
    pub(crate) fn resolve_concurrency(&self, workers: usize) -> usize {
        let workers = workers.max(1);
        self.max_concurrency.unwrap_or(workers).clamp(1, workers)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
    }
}

/// An inclusive brightness range on the normalised `[0, 1]` scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    /// Lowest accepted value.
    pub start: f64,
    /// Highest accepted value.
    pub end: f64,
}

impl Threshold {
    /// Create a range.
    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Whether `value` lies inside the range, bounds included.
    pub fn contains(&self, value: f64) -> bool {
        self.start <= value && value <= self.end
    }

    pub(crate) fn validate(&self) -> Result<(), CompshotError> {
        if !self.start.is_finite() || !self.end.is_finite() || self.start > self.end {
            return Err(CompshotError::InvalidThreshold {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }
}

/// Settings for automatic frame selection.
///
/// The defaults pick 8 dark and 4 light frames, at least 15 seconds apart.
/// `0.062745` is solid black on a limited-range 8-bit clip, so the dark range
/// starts just above it.
#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub struct SelectionOptions {
    /// How many dark frames to keep.
    pub dark_frames: usize,
    /// How many light frames to keep.
    pub light_frames: usize,
    /// Seed for the random subsampling step.
    pub seed: u64,
    /// Minimum distance between frames of the same pool, in seconds.
    pub min_gap_seconds: f64,
    /// Brightness range of dark frames.
    pub dark: Threshold,
    /// Brightness range of light frames.
    pub light: Threshold,
}

impl Default for SelectionOptions {
    fn default() -> Self {
        Self {
            dark_frames: 8,
            light_frames: 4,
            seed: 20202020,
            min_gap_seconds: 15.0,
            dark: Threshold::new(0.075, 0.38),
            light: Threshold::new(0.45, 0.75),
        }
    }
}

impl SelectionOptions {
    /// Create options with the default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of dark frames to keep.
    pub fn with_dark_frames(mut self, count: usize) -> Self {
        self.dark_frames = count;
        self
    }

    /// Number of light frames to keep.
    pub fn with_light_frames(mut self, count: usize) -> Self {
        self.light_frames = count;
        self
    }

    /// Seed for subsampling.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Minimum gap between kept frames, in seconds.
    pub fn with_min_gap_seconds(mut self, seconds: f64) -> Self {
        self.min_gap_seconds = seconds;
        self
    }

    /// Brightness range for dark frames.
    pub fn with_dark_range(mut self, start: f64, end: f64) -> Self {
        self.dark = Threshold::new(start, end);
        self
    }

    /// Brightness range for light frames.
    pub fn with_light_range(mut self, start: f64, end: f64) -> Self {
        self.light = Threshold::new(start, end);
        self
    }

    /// Check the thresholds and gap for usable values.
    pub fn validate(&self) -> Result<(), CompshotError> {
        self.dark.validate()?;
        self.light.validate()?;
        if !self.min_gap_seconds.is_finite() || self.min_gap_seconds < 0.0 {
            return Err(CompshotError::InvalidThreshold {
                start: 0.0,
                end: self.min_gap_seconds,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrency_is_bounded_by_workers() {
        let options = RenderOptions::new();
        assert_eq!(options.resolve_concurrency(6), 6);

        let options = RenderOptions::new().with_max_concurrency(16);
        assert_eq!(options.resolve_concurrency(6), 6);

        let options = RenderOptions::new().with_max_concurrency(0);
        assert_eq!(options.resolve_concurrency(6), 1);

        let options = RenderOptions::new().with_max_concurrency(3);
        assert_eq!(options.resolve_concurrency(0), 1);
    }

    #[test]
    fn threshold_bounds_are_inclusive() {
        let range = Threshold::new(0.075, 0.38);
        assert!(range.contains(0.075));
        assert!(range.contains(0.38));
        assert!(!range.contains(0.381));
    }

    #[test]
    fn validate_rejects_inverted_range() {
        let options = SelectionOptions::new().with_dark_range(0.5, 0.1);
        assert!(matches!(
            options.validate(),
            Err(CompshotError::InvalidThreshold { .. })
        ));
        assert!(SelectionOptions::new().validate().is_ok());
        assert!(SelectionOptions::new().with_min_gap_seconds(f64::NAN).validate().is_err());
    }
}
