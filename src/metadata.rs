//! Video stream metadata.
//!
//! Read once when a [`VideoFile`](crate::VideoFile) is opened and cached for
//! its lifetime.

use std::time::Duration;

use crate::clip::Rational;

/// Metadata for the decoded video stream.
///
/// # Example
///
/// ```no_run
/// use compshot::VideoFile;
///
/// let clip = VideoFile::open("input.mkv")?;
/// let metadata = clip.metadata();
/// println!("{}x{} @ {} fps", metadata.width, metadata.height, metadata.frame_rate);
/// # Ok::<(), compshot::CompshotError>(())
/// ```
#[derive(Debug, Clone)]
#[must_use]
pub struct VideoMetadata {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Average frame rate. Zero when the container does not declare one.
    pub frame_rate: Rational,
    /// Number of frames, from the container when declared, otherwise
    /// estimated from duration and frame rate.
    pub frame_count: u64,
    /// Stream duration.
    pub duration: Duration,
    /// Codec name (e.g. `"h264"`, `"hevc"`, `"av1"`).
    pub codec: String,
    /// Decoder pixel format name, if known (e.g. `"YUV420P10LE"`).
    pub pixel_format_name: Option<String>,
}

impl VideoMetadata {
    /// Frame rate as a float.
    pub fn frames_per_second(&self) -> f64 {
        self.frame_rate.as_f64()
    }
}
