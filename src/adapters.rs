//! Frame source adapters.
//!
//! Thin wrappers that change what a [`FrameSource`] reports without touching
//! the decoder: pick a subset of frames, attach brightness statistics, or
//! pretend the clip runs at a different frame rate.

use crate::clip::{
    ClipInfo, ColorFamily, Frame, FrameSource, PROP_DURATION_DEN, PROP_DURATION_NUM,
    PROP_PLANE_STATS_AVERAGE, PropValue, Rational,
};
use crate::error::CompshotError;

/// Exposes only the listed frames of an inner source, in list order.
///
/// Frame `i` of the adapter is frame `indices[i]` of the inner source.
/// Repeated and unsorted indices are allowed.
pub struct SelectedFrames<S> {
    inner: S,
    indices: Vec<u64>,
    info: ClipInfo,
}

impl<S: FrameSource> SelectedFrames<S> {
    /// Wrap `inner`, keeping only `indices`.
    ///
    /// # Errors
    ///
    /// [`CompshotError::FrameOutOfRange`] if an index is past the end of the
    /// inner clip.
    pub fn new(inner: S, indices: Vec<u64>) -> Result<Self, CompshotError> {
        let total_frames = inner.info().frame_count;
        if let Some(&frame_number) = indices.iter().find(|&&index| index >= total_frames) {
            return Err(CompshotError::FrameOutOfRange {
                frame_number,
                total_frames,
            });
        }

        let info = ClipInfo {
            frame_count: indices.len() as u64,
            ..inner.info().clone()
        };
        Ok(Self {
            inner,
            indices,
            info,
        })
    }

    /// Inner frame numbers, in output order.
    pub fn indices(&self) -> &[u64] {
        &self.indices
    }
}

impl<S: FrameSource> FrameSource for SelectedFrames<S> {
    fn info(&self) -> &ClipInfo {
        &self.info
    }

    fn get_frame(&self, index: u64) -> Result<Frame, CompshotError> {
        let inner_index = usize::try_from(index)
            .ok()
            .and_then(|position| self.indices.get(position))
            .copied()
            .ok_or(CompshotError::FrameOutOfRange {
                frame_number: index,
                total_frames: self.info.frame_count,
            })?;
        self.inner.get_frame(inner_index)
    }

    fn worker_count(&self) -> usize {
        self.inner.worker_count()
    }
}

/// Adds a `PlaneStatsAverage` property to every frame.
pub struct PlaneStats<S> {
    inner: S,
}

impl<S: FrameSource> PlaneStats<S> {
    /// Wrap `inner`.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: FrameSource> FrameSource for PlaneStats<S> {
    fn info(&self) -> &ClipInfo {
        self.inner.info()
    }

    fn get_frame(&self, index: u64) -> Result<Frame, CompshotError> {
        let mut frame = self.inner.get_frame(index)?;
        let average = plane_average(&frame);
        frame
            .props
            .set(PROP_PLANE_STATS_AVERAGE, PropValue::Float(average));
        Ok(frame)
    }

    fn worker_count(&self) -> usize {
        self.inner.worker_count()
    }
}

/// Mean sample value of the first plane, normalised to `[0, 1]`.
///
/// For packed RGB every channel sample counts. Empty planes yield `0.0`.
pub fn plane_average(frame: &Frame) -> f64 {
    let Some(plane) = frame.planes.first() else {
        return 0.0;
    };

    let (sum, count) = if frame.format.bytes_per_sample() == 2 {
        plane
            .data
            .chunks_exact(2)
            .fold((0_u64, 0_u64), |(sum, count), pair| {
                (sum + u64::from(u16::from_le_bytes([pair[0], pair[1]])), count + 1)
            })
    } else {
        let sum = plane.data.iter().map(|&sample| u64::from(sample)).sum();
        (sum, plane.data.len() as u64)
    };

    if count == 0 {
        return 0.0;
    }

    debug_assert!(
        frame.format.color_family != ColorFamily::Rgb || frame.planes.len() == 1,
        "packed RGB frames carry one plane"
    );
    sum as f64 / count as f64 / frame.format.max_sample_value()
}

/// Reports a different frame rate and rewrites frame durations to match.
pub struct AssumeFps<S> {
    inner: S,
    info: ClipInfo,
}

impl<S: FrameSource> AssumeFps<S> {
    /// Wrap `inner`, claiming `frame_rate`.
    pub fn new(inner: S, frame_rate: Rational) -> Self {
        let info = ClipInfo {
            frame_rate,
            ..inner.info().clone()
        };
        Self { inner, info }
    }
}

impl<S: FrameSource> FrameSource for AssumeFps<S> {
    fn info(&self) -> &ClipInfo {
        &self.info
    }

    fn get_frame(&self, index: u64) -> Result<Frame, CompshotError> {
        let mut frame = self.inner.get_frame(index)?;
        let rate = self.info.frame_rate;
        if rate.numerator > 0 && rate.denominator > 0 {
            frame
                .props
                .set(PROP_DURATION_NUM, PropValue::Int(rate.denominator as i64));
            frame
                .props
                .set(PROP_DURATION_DEN, PropValue::Int(rate.numerator as i64));
        }
        Ok(frame)
    }

    fn worker_count(&self) -> usize {
        self.inner.worker_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::{FrameProps, Plane, VideoFormat};

    struct Flat {
        info: ClipInfo,
        level: u8,
    }

    impl FrameSource for Flat {
        fn info(&self) -> &ClipInfo {
            &self.info
        }

        fn get_frame(&self, index: u64) -> Result<Frame, CompshotError> {
            let mut props = FrameProps::new();
            props.set("index", PropValue::Int(index as i64));
            Ok(Frame {
                format: VideoFormat::GRAY8,
                width: 2,
                height: 2,
                planes: vec![Plane {
                    width: 2,
                    height: 2,
                    data: vec![self.level; 4],
                }],
                props,
            })
        }
    }

    fn flat(level: u8) -> Flat {
        Flat {
            info: ClipInfo {
                frame_count: 10,
                frame_rate: Rational::new(24, 1),
                width: 2,
                height: 2,
                format: Some(VideoFormat::GRAY8),
            },
            level,
        }
    }

    #[test]
    fn selected_frames_remaps_indices() {
        let selected = SelectedFrames::new(flat(0), vec![7, 2, 7]).unwrap();
        assert_eq!(selected.info().frame_count, 3);
        let frame = selected.get_frame(0).unwrap();
        assert_eq!(frame.props.get_int("index"), Some(7));
        assert!(matches!(
            selected.get_frame(3),
            Err(CompshotError::FrameOutOfRange { frame_number: 3, .. })
        ));
    }

    #[test]
    fn selected_frames_rejects_out_of_range() {
        assert!(matches!(
            SelectedFrames::new(flat(0), vec![1, 10]),
            Err(CompshotError::FrameOutOfRange {
                frame_number: 10,
                total_frames: 10
            })
        ));
    }

    #[test]
    fn plane_stats_normalises() {
        let stats = PlaneStats::new(flat(51));
        let frame = stats.get_frame(0).unwrap();
        let average = frame.props.get_float(PROP_PLANE_STATS_AVERAGE).unwrap();
        assert!((average - 0.2).abs() < 1e-9);
    }

    #[test]
    fn high_bit_depth_average() {
        let frame = Frame {
            format: VideoFormat::new(ColorFamily::Gray, 0, 0, 10),
            width: 2,
            height: 1,
            planes: vec![Plane {
                width: 2,
                height: 1,
                data: vec![0xFF, 0x03, 0x00, 0x00],
            }],
            props: FrameProps::new(),
        };
        assert!((plane_average(&frame) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn assume_fps_rewrites_durations() {
        let clip = AssumeFps::new(flat(0), Rational::new(1, 1));
        assert_eq!(clip.info().frame_rate, Rational::new(1, 1));
        let frame = clip.get_frame(4).unwrap();
        assert_eq!(frame.props.duration_seconds(), Some(1.0));
    }
}
