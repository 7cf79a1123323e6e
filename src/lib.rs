//! # compshot
//!
//! Screenshot comparisons of video encodes, powered by FFmpeg via the
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) crate.
//!
//! `compshot` picks representative frames from a reference clip (a spread
//! of dark and light scenes, a minimum time apart), exports those frames from
//! every clip as PNG stills, and can upload the set to slow.pics.
//!
//! Underneath sits a bounded-concurrency render engine: frames are decoded
//! out of order on worker threads and handed to callbacks, a y4m sink and a
//! timecode sink strictly in order.
//!
//! ## Quick Start
//!
//! ### Pick frames automatically
//!
//! ```no_run
//! use compshot::{OutputFormat, RenderOptions, SelectionOptions, VideoFile};
//!
//! let reference = VideoFile::open_with_format("source.mkv", OutputFormat::Yuv420p)?;
//! let frames = compshot::lazylist(&reference, &SelectionOptions::default(), &RenderOptions::new())?;
//! println!("{frames:?}");
//! # Ok::<(), compshot::CompshotError>(())
//! ```
//!
//! ### Render to y4m with timecodes
//!
//! ```no_run
//! use std::fs::File;
//!
//! use compshot::{Renderer, VideoFile};
//!
//! let clip = VideoFile::open("input.mkv")?;
//! let timecodes = Renderer::new(&clip)
//!     .with_output(File::create("out.y4m")?)
//!     .with_timecodes(File::create("timecodes.txt")?)
//!     .run()?;
//! # Ok::<(), compshot::CompshotError>(())
//! ```
//!
//! ### Compare encodes
//!
//! ```no_run
//! use compshot::{Comparison, ComparisonOptions, OutputFormat, VideoFile};
//!
//! let source = VideoFile::open_with_format("source.mkv", OutputFormat::Rgb24)?;
//! let encode = VideoFile::open_with_format("encode.mkv", OutputFormat::Rgb24)?;
//! Comparison::new(ComparisonOptions::new())
//!     .with_clip("source", &source)
//!     .with_clip("encode", &encode)
//!     .run()?;
//! # Ok::<(), compshot::CompshotError>(())
//! ```
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `async` | `RenderStream` and `TimecodesFuture` via Tokio |
//! | `upload` | slow.pics upload and Discord webhook via `reqwest` |
//! | `full` | Enables all of the above |
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed to build, and the `ffmpeg`
//! binary must be on `PATH` for [`Writer::RawPixelStream`].

pub mod adapters;
pub mod classify;
pub mod clip;
pub mod comparison;
pub mod configuration;
pub mod dedupe;
pub mod error;
pub mod ffmpeg;
pub mod media;
pub mod metadata;
pub mod progress;
pub mod render;
pub mod selection;
#[cfg(feature = "upload")]
pub mod slowpics;
#[cfg(feature = "async")]
pub mod stream;
pub mod timecodes;
mod utilities;
pub mod writer;
pub mod y4m;

pub use adapters::{AssumeFps, PlaneStats, SelectedFrames};
pub use classify::{Classifier, Pools};
pub use clip::{
    ClipInfo, ColorFamily, Frame, FrameProps, FrameSource, Plane, PropValue, Rational,
    VideoFormat,
};
pub use comparison::{Comparison, ComparisonOptions, ComparisonReport};
pub use configuration::{RenderOptions, SelectionOptions, Threshold};
pub use dedupe::{dedupe, subsample};
pub use error::{CompshotError, PoolKind};
pub use ffmpeg::{FfmpegLogLevel, set_ffmpeg_log_level};
pub use media::{OutputFormat, VideoFile};
pub use metadata::VideoMetadata;
pub use progress::{CancellationToken, OperationType, ProgressCallback, ProgressInfo};
pub use render::{FrameCallback, RenderSummary, Renderer};
pub use selection::{FrameList, Selection, lazylist, parse_frame_list, select};
#[cfg(feature = "upload")]
pub use slowpics::{UploadOptions, UploadReport, WebhookOutcome};
#[cfg(feature = "async")]
pub use stream::{RenderStream, TimecodesFuture};
pub use timecodes::TimecodeSink;
pub use writer::Writer;
