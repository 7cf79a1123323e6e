//! Clip and frame model.
//!
//! A clip is an ordered, finite sequence of frames addressed by a 0-based
//! index. Frames are produced on demand by a [`FrameSource`], which is the
//! only capability the render engine needs from a decoder. Each [`Frame`]
//! carries its raw planes plus a [`FrameProps`] bag with per-frame metadata
//! such as duration and brightness statistics.

use std::{
    collections::HashMap,
    fmt::{Display, Formatter, Result as FmtResult},
    io::{Result as IoResult, Write},
    sync::Arc,
};

use crate::error::CompshotError;

/// Frame property holding the numerator of the frame duration in seconds.
pub const PROP_DURATION_NUM: &str = "DurationNum";
/// Frame property holding the denominator of the frame duration in seconds.
pub const PROP_DURATION_DEN: &str = "DurationDen";
/// Frame property holding the normalised mean of plane 0.
pub const PROP_PLANE_STATS_AVERAGE: &str = "PlaneStatsAverage";

/// A positive rational number, used for frame rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    /// Numerator.
    pub numerator: u64,
    /// Denominator. Zero means "unknown".
    pub denominator: u64,
}

impl Rational {
    /// Create a new rational.
    pub const fn new(numerator: u64, denominator: u64) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Value as a float, or `0.0` when the denominator is zero.
    pub fn as_f64(self) -> f64 {
        if self.denominator == 0 {
            0.0
        } else {
            self.numerator as f64 / self.denominator as f64
        }
    }
}

impl Display for Rational {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}:{}", self.numerator, self.denominator)
    }
}

/// Colour model of a pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorFamily {
    /// Single luma plane.
    Gray,
    /// Luma plane followed by two chroma planes.
    Yuv,
    /// Packed 8-bit RGB in a single plane.
    Rgb,
}

impl Display for ColorFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ColorFamily::Gray => f.write_str("GRAY"),
            ColorFamily::Yuv => f.write_str("YUV"),
            ColorFamily::Rgb => f.write_str("RGB"),
        }
    }
}

/// Fixed pixel layout of a clip or frame.
///
/// Subsampling values are powers of two: `subsampling_w = 1` halves the
/// chroma width. Samples wider than 8 bits are stored as little-endian
/// 16-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VideoFormat {
    /// Colour model.
    pub color_family: ColorFamily,
    /// Horizontal chroma subsampling (log2).
    pub subsampling_w: u8,
    /// Vertical chroma subsampling (log2).
    pub subsampling_h: u8,
    /// Significant bits per sample.
    pub bits_per_sample: u8,
}

impl VideoFormat {
    /// 8-bit single-plane greyscale.
    pub const GRAY8: VideoFormat = VideoFormat::new(ColorFamily::Gray, 0, 0, 8);
    /// 8-bit planar YUV 4:2:0.
    pub const YUV420P8: VideoFormat = VideoFormat::new(ColorFamily::Yuv, 1, 1, 8);
    /// 8-bit planar YUV 4:2:2.
    pub const YUV422P8: VideoFormat = VideoFormat::new(ColorFamily::Yuv, 1, 0, 8);
    /// 8-bit planar YUV 4:4:4.
    pub const YUV444P8: VideoFormat = VideoFormat::new(ColorFamily::Yuv, 0, 0, 8);
    /// 8-bit packed RGB.
    pub const RGB24: VideoFormat = VideoFormat::new(ColorFamily::Rgb, 0, 0, 8);

    /// Describe a format.
    pub const fn new(
        color_family: ColorFamily,
        subsampling_w: u8,
        subsampling_h: u8,
        bits_per_sample: u8,
    ) -> Self {
        Self {
            color_family,
            subsampling_w,
            subsampling_h,
            bits_per_sample,
        }
    }

    /// Bytes used to store one sample.
    pub fn bytes_per_sample(&self) -> usize {
        if self.bits_per_sample > 8 { 2 } else { 1 }
    }

    /// Number of planes a frame of this format carries.
    pub fn plane_count(&self) -> usize {
        match self.color_family {
            ColorFamily::Gray | ColorFamily::Rgb => 1,
            ColorFamily::Yuv => 3,
        }
    }

    /// Largest sample value representable at this bit depth.
    pub fn max_sample_value(&self) -> f64 {
        ((1_u64 << self.bits_per_sample) - 1) as f64
    }
}

/// Clip-level information shared by every frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipInfo {
    /// Number of frames in the clip.
    pub frame_count: u64,
    /// Frames per second.
    pub frame_rate: Rational,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Fixed pixel layout, or `None` for a variable format clip.
    pub format: Option<VideoFormat>,
}

/// A single value in a [`FrameProps`] bag.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    /// Integer property.
    Int(i64),
    /// Floating point property.
    Float(f64),
    /// Text property.
    Text(String),
}

/// Per-frame metadata, keyed by property name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameProps {
    values: HashMap<String, PropValue>,
}

impl FrameProps {
    /// Create an empty property bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a property, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: PropValue) {
        self.values.insert(key.into(), value);
    }

    /// Raw access to a property.
    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.values.get(key)
    }

    /// Integer property, if present and integral.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.values.get(key) {
            Some(PropValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    /// Float property. Integer values are widened.
    pub fn get_float(&self, key: &str) -> Option<f64> {
        match self.values.get(key) {
            Some(PropValue::Float(value)) => Some(*value),
            Some(PropValue::Int(value)) => Some(*value as f64),
            _ => None,
        }
    }

    /// Whether a property is present.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Frame duration in seconds, when both duration properties are set.
    pub fn duration_seconds(&self) -> Option<f64> {
        let numerator = self.get_int(PROP_DURATION_NUM)?;
        let denominator = self.get_int(PROP_DURATION_DEN)?;
        if denominator == 0 {
            return None;
        }
        Some(numerator as f64 / denominator as f64)
    }
}

/// One tightly packed image plane.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    /// Width in samples (pixels for planar formats).
    pub width: u32,
    /// Height in rows.
    pub height: u32,
    /// Row-major sample data without padding.
    pub data: Vec<u8>,
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Layout of `planes`.
    pub format: VideoFormat,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Planes in display order (Y, U, V for YUV).
    pub planes: Vec<Plane>,
    /// Frame metadata.
    pub props: FrameProps,
}

impl Frame {
    /// Write every plane in order, as raw bytes.
    pub fn write_planes<W: Write + ?Sized>(&self, writer: &mut W) -> IoResult<()> {
        for plane in &self.planes {
            writer.write_all(&plane.data)?;
        }
        Ok(())
    }

    /// Total size of the plane data in bytes.
    pub fn data_len(&self) -> usize {
        self.planes.iter().map(|plane| plane.data.len()).sum()
    }
}

/// Something that can produce decoded frames by index.
///
/// Implementations must be shareable across threads: the render engine calls
/// [`get_frame`](FrameSource::get_frame) from up to
/// [`worker_count`](FrameSource::worker_count) worker threads at once, and
/// the calls may complete in any order.
pub trait FrameSource: Send + Sync {
    /// Clip-level information.
    fn info(&self) -> &ClipInfo;

    /// Decode frame `index` (0-based).
    fn get_frame(&self, index: u64) -> Result<Frame, CompshotError>;

    /// How many frames this source is able to decode concurrently.
    fn worker_count(&self) -> usize {
        std::thread::available_parallelism()
            .map(|count| count.get())
            .unwrap_or(1)
    }
}

impl<S: FrameSource + ?Sized> FrameSource for &S {
    fn info(&self) -> &ClipInfo {
        (**self).info()
    }

    fn get_frame(&self, index: u64) -> Result<Frame, CompshotError> {
        (**self).get_frame(index)
    }

    fn worker_count(&self) -> usize {
        (**self).worker_count()
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn info(&self) -> &ClipInfo {
        (**self).info()
    }

    fn get_frame(&self, index: u64) -> Result<Frame, CompshotError> {
        (**self).get_frame(index)
    }

    fn worker_count(&self) -> usize {
        (**self).worker_count()
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Arc<S> {
    fn info(&self) -> &ClipInfo {
        (**self).info()
    }

    fn get_frame(&self, index: u64) -> Result<Frame, CompshotError> {
        (**self).get_frame(index)
    }

    fn worker_count(&self) -> usize {
        (**self).worker_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_requires_both_props() {
        let mut props = FrameProps::new();
        props.set(PROP_DURATION_NUM, PropValue::Int(1001));
        assert_eq!(props.duration_seconds(), None);

        props.set(PROP_DURATION_DEN, PropValue::Int(24000));
        let seconds = props.duration_seconds().unwrap();
        assert!((seconds - 1001.0 / 24000.0).abs() < 1e-12);
    }

    #[test]
    fn get_float_widens_integers() {
        let mut props = FrameProps::new();
        props.set("a", PropValue::Int(3));
        props.set("b", PropValue::Text("x".to_string()));
        assert_eq!(props.get_float("a"), Some(3.0));
        assert_eq!(props.get_float("b"), None);
        assert_eq!(props.get_int("missing"), None);
    }

    #[test]
    fn format_plane_counts() {
        assert_eq!(VideoFormat::GRAY8.plane_count(), 1);
        assert_eq!(VideoFormat::YUV420P8.plane_count(), 3);
        assert_eq!(VideoFormat::RGB24.plane_count(), 1);
        assert_eq!(VideoFormat::new(ColorFamily::Yuv, 1, 1, 10).bytes_per_sample(), 2);
        assert_eq!(VideoFormat::GRAY8.max_sample_value(), 255.0);
    }

    #[test]
    fn rational_zero_denominator() {
        assert_eq!(Rational::new(24, 0).as_f64(), 0.0);
        assert_eq!(Rational::new(24000, 1001).to_string(), "24000:1001");
    }
}
