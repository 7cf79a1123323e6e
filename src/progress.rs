//! Progress reports and cooperative cancellation for render sessions.
//!
//! Every render (a plain render, the classification pass, a still export)
//! counts delivered frames and hands a [`ProgressInfo`] snapshot to the
//! configured [`ProgressCallback`]. A [`CancellationToken`] shared with the
//! session stops it before the next frame request.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use compshot::{
//!     CompshotError, ProgressCallback, ProgressInfo, RenderOptions, Renderer, VideoFile,
//! };
//!
//! struct Percent;
//!
//! impl ProgressCallback for Percent {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         match info.percentage {
//!             Some(pct) => eprintln!("{:?}: {pct:.0}%", info.operation),
//!             None => eprintln!("{:?}: {} frames", info.operation, info.current),
//!         }
//!     }
//! }
//!
//! let clip = VideoFile::open("input.mkv")?;
//! Renderer::new(&clip)
//!     .with_options(RenderOptions::new().with_progress(Arc::new(Percent)).with_batch_size(24))
//!     .run()?;
//! # Ok::<(), CompshotError>(())
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

/// The kind of operation currently in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OperationType {
    /// Rendering a clip frame by frame.
    Rendering,
    /// Measuring brightness to build dark/light candidate pools.
    Classification,
    /// Writing selected frames as still images.
    Export,
    /// Uploading stills to the comparison host.
    Upload,
}

/// Progress of one render session at the moment of a report.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Which kind of render this is.
    pub operation: OperationType,
    /// How many frames have been delivered so far.
    pub current: u64,
    /// Total frames expected, if known ahead of time.
    pub total: Option<u64>,
    /// `current / total` as a percentage, when `total` is known and non-zero.
    pub percentage: Option<f32>,
    /// Time since the session started.
    pub elapsed: Duration,
    /// Linear extrapolation from the delivery rate so far.
    pub estimated_remaining: Option<Duration>,
    /// The frame index that was just delivered.
    pub current_frame: Option<u64>,
}

/// Trait for receiving progress updates.
///
/// Implementations must be [`Send`] and [`Sync`]; the same callback may be
/// shared by several renders running on different threads.
///
/// Progress callbacks are **infallible**. Use [`CancellationToken`] to stop
/// an operation.
pub trait ProgressCallback: Send + Sync {
    /// Called at regular intervals during an operation.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Discards all progress notifications. Default when nothing is configured.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Clones share state. The render engine checks the token before every
/// frame request, so cancelling stops new decodes immediately and the render
/// returns [`CompshotError::Cancelled`](crate::CompshotError::Cancelled) once
/// in-flight requests have finished.
///
/// # Example
///
/// ```
/// use compshot::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.is_cancelled());
///
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A fresh token that has not been cancelled.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. All clones observe it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether any clone has called [`cancel`](Self::cancel).
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts delivered frames and reports every `batch_size` of them.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    operation: OperationType,
    total: Option<u64>,
    delivered: u64,
    unreported: u64,
    batch_size: u64,
    started: Instant,
}

impl ProgressTracker {
    pub(crate) fn new(
        callback: Arc<dyn ProgressCallback>,
        operation: OperationType,
        total: Option<u64>,
        batch_size: u64,
    ) -> Self {
        Self {
            callback,
            operation,
            total,
            delivered: 0,
            unreported: 0,
            batch_size: batch_size.max(1),
            started: Instant::now(),
        }
    }

    /// Record one delivered frame and report when the batch is full.
    pub(crate) fn advance(&mut self, frame_index: u64) {
        self.delivered += 1;
        self.unreported += 1;

        if self.unreported == self.batch_size {
            self.emit(Some(frame_index));
        }
    }

    /// Emit a final report unless the last frame was already reported.
    /// A session that delivered nothing still reports once.
    pub(crate) fn finish(&mut self) {
        if self.unreported > 0 || self.delivered == 0 {
            self.emit(None);
        }
    }

    fn emit(&mut self, frame_index: Option<u64>) {
        self.unreported = 0;
        let elapsed = self.started.elapsed();

        let (percentage, estimated_remaining) = match self.total {
            Some(total) if total > 0 && self.delivered > 0 => {
                let done = self.delivered as f64 / total as f64;
                let left = total.saturating_sub(self.delivered) as f64 / self.delivered as f64;
                (Some((done * 100.0) as f32), Some(elapsed.mul_f64(left)))
            }
            Some(total) if total > 0 => (Some(0.0), None),
            _ => (None, None),
        };

        self.callback.on_progress(&ProgressInfo {
            operation: self.operation,
            current: self.delivered,
            total: self.total,
            percentage,
            elapsed,
            estimated_remaining,
            current_frame: frame_index,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct Recorder(Mutex<Vec<ProgressInfo>>);

    impl ProgressCallback for Recorder {
        fn on_progress(&self, info: &ProgressInfo) {
            self.0.lock().unwrap().push(info.clone());
        }
    }

    #[test]
    fn tracker_batches_reports() {
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let mut tracker =
            ProgressTracker::new(recorder.clone(), OperationType::Rendering, Some(5), 2);
        for index in 0..5 {
            tracker.advance(index);
        }
        tracker.finish();

        let infos = recorder.0.lock().unwrap();
        let currents: Vec<u64> = infos.iter().map(|info| info.current).collect();
        assert_eq!(currents, vec![2, 4, 5]);
        assert_eq!(infos[0].current_frame, Some(1));
        assert_eq!(infos.last().unwrap().percentage, Some(100.0));
    }

    #[test]
    fn finish_does_not_repeat_last_report() {
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let mut tracker =
            ProgressTracker::new(recorder.clone(), OperationType::Export, Some(2), 1);
        tracker.advance(0);
        tracker.advance(1);
        tracker.finish();
        assert_eq!(recorder.0.lock().unwrap().len(), 2);
    }
}
