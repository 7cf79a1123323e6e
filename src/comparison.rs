//! Screenshot comparisons across several encodes.
//!
//! A [`Comparison`] resolves one list of frame numbers (usually picked
//! automatically from a reference clip), exports those frames from every
//! clip into `<folder>/<name>/`, and optionally uploads the set.
//!
//! # Example
//!
//! ```no_run
//! use compshot::{Comparison, ComparisonOptions, OutputFormat, VideoFile, Writer};
//!
//! let source = VideoFile::open_with_format("source.mkv", OutputFormat::Rgb24)?;
//! let encode = VideoFile::open_with_format("encode.mkv", OutputFormat::Rgb24)?;
//! let reference = VideoFile::open_with_format("source.mkv", OutputFormat::Yuv420p)?;
//!
//! let report = Comparison::new(ComparisonOptions::new().with_writer(Writer::PerFrameImage))
//!     .with_clip("source", &source)
//!     .with_clip("encode", &encode)
//!     .with_reference(&reference)
//!     .run()?;
//! println!("compared frames {:?}", report.frames);
//! # Ok::<(), compshot::CompshotError>(())
//! ```

use std::path::PathBuf;

use crate::clip::FrameSource;
use crate::configuration::RenderOptions;
use crate::error::CompshotError;
use crate::selection::FrameList;
use crate::writer::Writer;

#[cfg(feature = "upload")]
use crate::slowpics::{self, UploadOptions, UploadReport};

/// Settings for a [`Comparison`].
#[derive(Debug, Clone)]
#[must_use]
pub struct ComparisonOptions {
    /// Root output folder. Each clip gets a sub-folder named after it.
    pub folder: PathBuf,
    /// How stills are written.
    pub writer: Writer,
    /// First image number for [`Writer::PerFrameImage`].
    pub start: u64,
    /// Which frames to compare.
    pub frames: FrameList,
    /// Progress, cancellation and concurrency for every render.
    pub render: RenderOptions,
    /// Upload the result to slow.pics.
    #[cfg(feature = "upload")]
    pub upload: Option<UploadOptions>,
}

impl Default for ComparisonOptions {
    fn default() -> Self {
        Self {
            folder: PathBuf::from("comparison"),
            writer: Writer::default(),
            start: 1,
            frames: FrameList::default(),
            render: RenderOptions::default(),
            #[cfg(feature = "upload")]
            upload: None,
        }
    }
}

impl ComparisonOptions {
    /// Defaults: folder `comparison`, raw pixel stream writer, numbering
    /// from 1, automatic frame selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Root output folder.
    pub fn with_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.folder = folder.into();
        self
    }

    /// Still writer.
    pub fn with_writer(mut self, writer: Writer) -> Self {
        self.writer = writer;
        self
    }

    /// First image number for the per-frame writer.
    pub fn with_start(mut self, start: u64) -> Self {
        self.start = start;
        self
    }

    /// Frame list source.
    pub fn with_frames(mut self, frames: FrameList) -> Self {
        self.frames = frames;
        self
    }

    /// Render settings.
    pub fn with_render_options(mut self, render: RenderOptions) -> Self {
        self.render = render;
        self
    }

    /// Upload to slow.pics once every clip is exported.
    #[cfg(feature = "upload")]
    pub fn with_upload(mut self, upload: UploadOptions) -> Self {
        self.upload = Some(upload);
        self
    }
}

/// What a comparison produced.
#[derive(Debug, Clone)]
pub struct ComparisonReport {
    /// Frame numbers that were exported, in export order.
    pub frames: Vec<u64>,
    /// Each clip name with its written stills, in clip order.
    pub images: Vec<(String, Vec<PathBuf>)>,
    /// Upload result, when an upload was requested.
    #[cfg(feature = "upload")]
    pub upload: Option<UploadReport>,
}

/// Builder for one comparison run.
pub struct Comparison<'a> {
    clips: Vec<(String, &'a dyn FrameSource)>,
    reference: Option<&'a dyn FrameSource>,
    options: ComparisonOptions,
}

impl<'a> Comparison<'a> {
    /// Start an empty comparison.
    pub fn new(options: ComparisonOptions) -> Self {
        Self {
            clips: Vec::new(),
            reference: None,
            options,
        }
    }

    /// Add a clip. Clips are exported and uploaded in the order added.
    #[must_use]
    pub fn with_clip(mut self, name: impl Into<String>, clip: &'a dyn FrameSource) -> Self {
        self.clips.push((name.into(), clip));
        self
    }

    /// Clip used for automatic frame selection. Defaults to the first clip.
    #[must_use]
    pub fn with_reference(mut self, reference: &'a dyn FrameSource) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Resolve the frame list, export every clip, and upload if requested.
    ///
    /// # Errors
    ///
    /// - [`CompshotError::NoClips`] without clips.
    /// - Frame list, selection and export errors.
    /// - Upload errors (webhook failures are only reported).
    pub fn run(self) -> Result<ComparisonReport, CompshotError> {
        let Comparison {
            clips,
            reference,
            options,
        } = self;

        let (_, first) = clips.first().ok_or(CompshotError::NoClips)?;
        let reference = reference.unwrap_or(*first);

        let frames = options.frames.resolve(reference, &options.render)?;
        log::info!("Comparing {} frames across {} clips", frames.len(), clips.len());

        let mut images = Vec::with_capacity(clips.len());
        for (name, clip) in &clips {
            let directory = options.folder.join(name);
            let paths = options.writer.export(
                name,
                *clip,
                &frames,
                &directory,
                options.start,
                &options.render,
            )?;
            images.push((name.clone(), paths));
        }

        #[cfg(feature = "upload")]
        let upload = match &options.upload {
            Some(upload) => {
                let mut collected = Vec::with_capacity(clips.len());
                for (name, _) in &clips {
                    let stills = slowpics::collect_images(&options.folder.join(name))?;
                    collected.push((name.clone(), stills));
                }
                Some(slowpics::upload(&options.folder, &collected, upload, &options.render)?)
            }
            None => None,
        };

        Ok(ComparisonReport {
            frames,
            images,
            #[cfg(feature = "upload")]
            upload,
        })
    }
}
