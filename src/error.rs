//! Error types for the `compshot` crate.
//!
//! This module defines [`CompshotError`], the unified error type returned by
//! all fallible operations in the crate. Precondition violations (bad clip
//! formats, empty candidate pools, malformed frame lists) are reported through
//! dedicated variants so callers can tell them apart from decode or I/O
//! failures.

use std::{io::Error as IoError, path::PathBuf};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

use crate::clip::ColorFamily;

/// Which candidate pool a selection error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    /// Frames whose average brightness falls in the dark range.
    Dark,
    /// Frames whose average brightness falls in the light range.
    Light,
}

impl std::fmt::Display for PoolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolKind::Dark => f.write_str("dark"),
            PoolKind::Light => f.write_str("light"),
        }
    }
}

/// The unified error type for all `compshot` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CompshotError {
    /// The media file could not be opened.
    #[error("Failed to open media file at {path}: {reason}")]
    FileOpen {
        /// Path that was passed to [`crate::VideoFile::open`].
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The file does not contain a video stream.
    #[error("No video stream found in file")]
    NoVideoStream,

    /// A video frame could not be decoded.
    #[error("Failed to decode video frame: {0}")]
    VideoDecodeError(String),

    /// The requested frame number exceeds the clip length.
    #[error("Frame {frame_number} is out of range (clip has {total_frames} frames)")]
    FrameOutOfRange {
        /// The frame number that was requested.
        frame_number: u64,
        /// The total number of frames in the clip.
        total_frames: u64,
    },

    /// A fixed pixel layout is required but the clip has none.
    #[error("Cannot render a variable format clip to y4m")]
    VariableFormat,

    /// The clip's colour model cannot be written to the requested output.
    #[error("Can only render YUV or GRAY clips to y4m, not {0}")]
    UnsupportedColorFamily(ColorFamily),

    /// The chroma subsampling is not one of the recognised y4m layouts.
    #[error("Unsupported chroma subsampling (w={subsampling_w}, h={subsampling_h})")]
    UnsupportedSubsampling {
        /// Horizontal subsampling as a power of two.
        subsampling_w: u8,
        /// Vertical subsampling as a power of two.
        subsampling_h: u8,
    },

    /// Still export needs 8-bit RGB or greyscale frames.
    #[error("Cannot export {family} frames with {bits_per_sample}-bit samples as images")]
    UnsupportedExportFormat {
        /// Colour family of the offending clip.
        family: ColorFamily,
        /// Bits per sample of the offending clip.
        bits_per_sample: u8,
    },

    /// Classification found no frame for one of the pools.
    #[error("No {0} frames found in clip")]
    EmptyPool(PoolKind),

    /// A brightness threshold pair is unusable.
    #[error("Invalid threshold range [{start}, {end}]")]
    InvalidThreshold {
        /// Lower bound of the range.
        start: f64,
        /// Upper bound of the range.
        end: f64,
    },

    /// An external frame list could not be parsed.
    #[error("Invalid frame list at line {line}: {reason}")]
    InvalidFrameList {
        /// 1-based line number in the frame list file.
        line: usize,
        /// What was wrong with the line.
        reason: String,
    },

    /// No clips were given to a comparison.
    #[error("At least one clip is required")]
    NoClips,

    /// The external encoder process failed.
    #[error("Encoder error: {0}")]
    EncoderError(String),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// An error from the `image` crate while writing stills.
    #[error("Image processing error: {0}")]
    ImageError(#[from] ImageError),

    /// The operation was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,

    /// A render worker panicked and left the session unusable.
    #[error("Render aborted: {0}")]
    RenderAborted(String),

    /// Uploading the comparison failed.
    #[cfg(feature = "upload")]
    #[error("Upload error: {0}")]
    Upload(String),

    /// Delivering the webhook payload failed.
    #[cfg(feature = "upload")]
    #[error("Webhook error: {0}")]
    Webhook(String),
}

impl From<FfmpegError> for CompshotError {
    fn from(error: FfmpegError) -> Self {
        CompshotError::FfmpegError(error.to_string())
    }
}

#[cfg(feature = "upload")]
impl From<reqwest::Error> for CompshotError {
    fn from(error: reqwest::Error) -> Self {
        CompshotError::Upload(error.to_string())
    }
}
