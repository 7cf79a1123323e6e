//! Out-of-order frame rendering with in-order delivery.
//!
//! [`Renderer`] asks a [`FrameSource`] for frames from a pool of worker
//! threads, so decodes overlap and finish in whatever order the decoder
//! manages. Completed frames are parked in an index-keyed buffer and the
//! calling thread drains that buffer strictly in order: for every frame
//! `0..N` it updates the timecodes, writes the optional y4m and timecode
//! records, and runs the registered callbacks exactly once.
//!
//! A frame may only be requested while fewer than `max_concurrency` frames
//! are requested but not yet delivered. This keeps both the number of
//! decodes in flight and the reorder buffer bounded by `max_concurrency`,
//! however far a slow frame lags behind its successors.
//!
//! # Example
//!
//! ```no_run
//! use std::fs::File;
//!
//! use compshot::{CompshotError, OutputFormat, Renderer, VideoFile};
//!
//! let clip = VideoFile::open_with_format("input.mkv", OutputFormat::Yuv420p)?;
//! let mut y4m = File::create("out.y4m")?;
//! let mut timecodes = File::create("timecodes.txt")?;
//!
//! let times = Renderer::new(&clip)
//!     .with_output(&mut y4m)
//!     .with_timecodes(&mut timecodes)
//!     .with_callback(|index, frame| {
//!         println!("frame {index}: {} bytes", frame.data_len());
//!         Ok(())
//!     })
//!     .run()?;
//! println!("clip lasts {:?} seconds", times.last());
//! # Ok::<(), CompshotError>(())
//! ```

use std::collections::HashMap;
use std::io::Write;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Condvar, Mutex, MutexGuard};

use crate::clip::{Frame, FrameSource};
use crate::configuration::RenderOptions;
use crate::error::CompshotError;
use crate::progress::ProgressTracker;
use crate::timecodes::{Recorded, TIMECODE_V2_HEADER, TimecodeSink, Timecodes, format_line};
use crate::y4m;

/// A per-frame callback. Runs on the thread that called
/// [`Renderer::run`], once per frame, in index order.
pub type FrameCallback<'a> = Box<dyn FnMut(u64, &Frame) -> Result<(), CompshotError> + 'a>;

/// Outcome of a render session.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSummary {
    /// Cumulative timestamps in seconds: entry `i` is the start of frame
    /// `i`, the last entry is the end of the clip. Empty when any frame
    /// lacked duration metadata.
    pub timecodes: Vec<f64>,
    /// Frames delivered.
    pub frames_rendered: u64,
    /// Requests allowed in flight.
    pub concurrency: usize,
    /// Largest number of completed frames ever waiting in the reorder buffer.
    pub peak_buffered: usize,
}

/// Builder and entry point for one render session.
pub struct Renderer<'a, S: FrameSource + ?Sized> {
    source: &'a S,
    options: RenderOptions,
    output: Option<Box<dyn Write + 'a>>,
    timecodes: Option<Box<dyn TimecodeSink + 'a>>,
    callbacks: Vec<FrameCallback<'a>>,
}

impl<'a, S: FrameSource + ?Sized> Renderer<'a, S> {
    /// Prepare a render of every frame of `source`.
    pub fn new(source: &'a S) -> Self {
        Self {
            source,
            options: RenderOptions::new(),
            output: None,
            timecodes: None,
            callbacks: Vec::new(),
        }
    }

    /// Use these options (progress, cancellation, concurrency).
    #[must_use]
    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    /// Stream the clip as y4m into `output`.
    ///
    /// The clip must have a fixed planar YUV or greyscale format; see
    /// [`y4m::stream_header`].
    #[must_use]
    pub fn with_output(mut self, output: impl Write + 'a) -> Self {
        self.output = Some(Box::new(output));
        self
    }

    /// Write v2 timecodes into `sink`.
    #[must_use]
    pub fn with_timecodes(mut self, sink: impl TimecodeSink + 'a) -> Self {
        self.timecodes = Some(Box::new(sink));
        self
    }

    /// Register a callback. Callbacks run in registration order.
    #[must_use]
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: FnMut(u64, &Frame) -> Result<(), CompshotError> + 'a,
    {
        self.callbacks.push(Box::new(callback));
        self
    }

    /// Render the clip and return its timecodes.
    ///
    /// # Errors
    ///
    /// - [`CompshotError::VariableFormat`], [`CompshotError::UnsupportedColorFamily`]
    ///   or [`CompshotError::UnsupportedSubsampling`] when an output sink is
    ///   set and the clip cannot be described as y4m. Nothing is decoded.
    /// - [`CompshotError::Cancelled`] when the cancellation token fires.
    /// - The first error returned by the source, a callback, or a sink.
    pub fn run(self) -> Result<Vec<f64>, CompshotError> {
        self.run_with_summary().map(|summary| summary.timecodes)
    }

    /// Render the clip and return timecodes plus session statistics.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Renderer::run).
    pub fn run_with_summary(self) -> Result<RenderSummary, CompshotError> {
        let Renderer {
            source,
            options,
            mut output,
            mut timecodes,
            callbacks,
        } = self;

        let info = source.info();
        let total = info.frame_count;

        if let Some(output) = output.as_mut() {
            let header = y4m::stream_header(info)?;
            output.write_all(header.as_bytes())?;
        }
        if let Some(sink) = timecodes.as_mut() {
            sink.write_all(TIMECODE_V2_HEADER.as_bytes())?;
        }

        let concurrency = options.resolve_concurrency(source.worker_count());
        let workers = (concurrency as u64).min(total) as usize;

        log::debug!(
            "Rendering {total} frames with {concurrency} requests in flight ({workers} workers)"
        );

        let shared = Shared::new();
        let mut delivery = Delivery {
            output,
            timecode_sink: timecodes,
            timecodes: Timecodes::new(),
            callbacks,
            tracker: ProgressTracker::new(
                options.progress.clone(),
                options.operation,
                Some(total),
                options.batch_size,
            ),
        };

        let drained = std::thread::scope(|scope| {
            for _ in 0..workers {
                let shared = &shared;
                let options = &options;
                scope.spawn(move || request_frames(source, shared, options, total, concurrency));
            }

            // Workers must be released even if a callback panics.
            let _stop = StopOnDrop(&shared);
            drain(&shared, &mut delivery, total)
        });
        let peak_buffered = drained?;

        delivery.finish()?;

        Ok(RenderSummary {
            timecodes: delivery.timecodes.into_vec(),
            frames_rendered: total,
            concurrency,
            peak_buffered,
        })
    }
}

/// Mutable state of one render session, guarded by [`Shared::state`].
#[derive(Default)]
struct RenderContext {
    /// Frames requested so far; also the next index to request.
    queued: u64,
    /// Frames delivered in order so far; also the next index to deliver.
    rendered: u64,
    /// Completed frames waiting for their turn.
    frames: HashMap<u64, Frame>,
    peak_buffered: usize,
    failure: Option<CompshotError>,
    stopped: bool,
}

impl RenderContext {
    fn fail(&mut self, error: CompshotError) {
        if self.failure.is_none() {
            self.failure = Some(error);
        }
    }
}

struct Shared {
    state: Mutex<RenderContext>,
    condition: Condvar,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: Mutex::new(RenderContext::default()),
            condition: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RenderContext> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn wait<'g>(&self, guard: MutexGuard<'g, RenderContext>) -> MutexGuard<'g, RenderContext> {
        self.condition
            .wait(guard)
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn stop(&self) {
        self.lock().stopped = true;
        self.condition.notify_all();
    }
}

struct StopOnDrop<'s>(&'s Shared);

impl Drop for StopOnDrop<'_> {
    fn drop(&mut self) {
        self.0.stop();
    }
}

/// Worker loop: claim the next index while the window has room, decode it,
/// park the result.
fn request_frames<S: FrameSource + ?Sized>(
    source: &S,
    shared: &Shared,
    options: &RenderOptions,
    total: u64,
    window: usize,
) {
    let window = window as u64;

    loop {
        let index = {
            let mut context = shared.lock();
            loop {
                if context.stopped || context.failure.is_some() || context.queued >= total {
                    return;
                }
                if context.queued - context.rendered < window {
                    break;
                }
                context = shared.wait(context);
            }

            if options.is_cancelled() {
                context.fail(CompshotError::Cancelled);
                drop(context);
                shared.condition.notify_all();
                return;
            }

            let index = context.queued;
            context.queued += 1;
            index
        };

        let result = catch_unwind(AssertUnwindSafe(|| source.get_frame(index)))
            .unwrap_or_else(|_| {
                Err(CompshotError::RenderAborted(format!(
                    "frame source panicked while decoding frame {index}"
                )))
            });

        let mut context = shared.lock();
        match result {
            Ok(frame) => {
                context.frames.insert(index, frame);
                context.peak_buffered = context.peak_buffered.max(context.frames.len());
                debug_assert!(context.frames.len() as u64 <= window);
            }
            Err(error) => context.fail(error),
        }
        drop(context);
        shared.condition.notify_all();
    }
}

/// Consumer loop: hand out frames in index order until all `total` are
/// delivered. Returns the peak reorder-buffer size.
fn drain(shared: &Shared, delivery: &mut Delivery<'_>, total: u64) -> Result<usize, CompshotError> {
    let mut context = shared.lock();

    loop {
        if let Some(error) = context.failure.take() {
            return Err(error);
        }
        if context.rendered == total {
            return Ok(context.peak_buffered);
        }

        let index = context.rendered;
        let Some(frame) = context.frames.remove(&index) else {
            context = shared.wait(context);
            continue;
        };

        // Callbacks and sinks run without the lock held.
        drop(context);
        let delivered = delivery.deliver(index, &frame);
        drop(frame);

        context = shared.lock();
        delivered?;
        context.rendered += 1;
        shared.condition.notify_all();
    }
}

/// Everything that happens to a frame once it is next in line.
struct Delivery<'a> {
    output: Option<Box<dyn Write + 'a>>,
    timecode_sink: Option<Box<dyn TimecodeSink + 'a>>,
    timecodes: Timecodes,
    callbacks: Vec<FrameCallback<'a>>,
    tracker: ProgressTracker,
}

impl Delivery<'_> {
    fn deliver(&mut self, index: u64, frame: &Frame) -> Result<(), CompshotError> {
        match self.timecodes.record(&frame.props) {
            Recorded::Start(start) => {
                if let Some(sink) = self.timecode_sink.as_mut() {
                    sink.write_all(format_line(start).as_bytes())?;
                }
            }
            Recorded::JustDisabled => {
                log::warn!("frame {index} is missing duration information, discarding timecodes");
                if let Some(mut sink) = self.timecode_sink.take() {
                    sink.discard()?;
                    sink.flush()?;
                }
            }
            Recorded::Disabled => {}
        }

        if let Some(output) = self.output.as_mut() {
            y4m::write_frame(output, frame)?;
        }

        for callback in &mut self.callbacks {
            callback(index, frame)?;
        }

        self.tracker.advance(index);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), CompshotError> {
        if let Some(output) = self.output.as_mut() {
            output.flush()?;
        }
        if let Some(sink) = self.timecode_sink.as_mut() {
            sink.flush()?;
        }
        self.tracker.finish();
        Ok(())
    }
}
