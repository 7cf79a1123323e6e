//! Internal utility functions.
//!
//! Plane copying and timestamp conversion shared by the decoder and the
//! exporters.

use ffmpeg_next::{Rational as FfmpegRational, frame::Video as VideoFrame};

use crate::clip::{Plane, Rational};

/// FFmpeg's internal time base: seek positions are in microseconds.
const AV_TIME_BASE: f64 = 1_000_000.0;

/// Copy plane `index` of an FFmpeg frame into a tightly packed buffer.
///
/// FFmpeg rows are frequently padded (stride > row width). `row_bytes` is the
/// number of meaningful bytes per row.
pub(crate) fn copy_plane(video_frame: &VideoFrame, index: usize, row_bytes: usize) -> Plane {
    let width = video_frame.plane_width(index);
    let height = video_frame.plane_height(index);
    let stride = video_frame.stride(index);
    let data = video_frame.data(index);
    let rows = height as usize;

    let packed = if stride == row_bytes {
        data[..row_bytes * rows].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(row_bytes * rows);
        for row in data.chunks(stride).take(rows) {
            buffer.extend_from_slice(&row[..row_bytes]);
        }
        buffer
    };

    Plane {
        width,
        height,
        data: packed,
    }
}

/// Convert an FFmpeg rational, treating non-positive parts as unknown.
pub(crate) fn to_rational(value: FfmpegRational) -> Option<Rational> {
    let numerator = u64::try_from(value.numerator()).ok()?;
    let denominator = u64::try_from(value.denominator()).ok()?;
    (numerator > 0 && denominator > 0).then(|| Rational::new(numerator, denominator))
}

/// Seek position (in `AV_TIME_BASE` units) of a frame at a constant rate.
pub(crate) fn frame_number_to_seek_timestamp(frame_number: u64, frames_per_second: f64) -> i64 {
    if frames_per_second <= 0.0 {
        return 0;
    }
    (frame_number as f64 / frames_per_second * AV_TIME_BASE) as i64
}

/// Rescale a PTS value from stream time base to seconds.
pub(crate) fn pts_to_seconds(pts: i64, time_base: FfmpegRational) -> f64 {
    if time_base.denominator() == 0 {
        return 0.0;
    }
    pts as f64 * f64::from(time_base.numerator()) / f64::from(time_base.denominator())
}

/// Map a PTS to the nearest frame number at a constant rate.
///
/// Rounds rather than truncates so timestamps stored with a coarse time base
/// (e.g. 1/1000 for 23.976 fps) land on the right frame.
pub(crate) fn pts_to_frame_number(pts: i64, time_base: FfmpegRational, frames_per_second: f64) -> u64 {
    let frame = (pts_to_seconds(pts, time_base) * frames_per_second).round();
    if frame <= 0.0 { 0 } else { frame as u64 }
}
