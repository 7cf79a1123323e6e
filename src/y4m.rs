//! YUV4MPEG2 stream framing.
//!
//! A y4m stream is a one-line ASCII header followed by one `FRAME\n` record
//! per frame, each carrying the raw planes in display order. Only planar YUV
//! and greyscale layouts can be described by the header.

use std::io::{Result as IoResult, Write};

use crate::clip::{ClipInfo, ColorFamily, Frame, VideoFormat};
use crate::error::CompshotError;

const FRAME_MARKER: &[u8] = b"FRAME\n";

/// The `C` tag of the header for a given format.
///
/// # Errors
///
/// [`CompshotError::UnsupportedColorFamily`] for RGB, and
/// [`CompshotError::UnsupportedSubsampling`] for chroma layouts other than
/// 4:2:0, 4:2:2, 4:4:4, 4:1:0, 4:1:1 and 4:4:0.
pub fn colorspace_tag(format: &VideoFormat) -> Result<String, CompshotError> {
    let base = match format.color_family {
        ColorFamily::Gray => "mono",
        ColorFamily::Yuv => match (format.subsampling_w, format.subsampling_h) {
            (1, 1) => "420",
            (1, 0) => "422",
            (0, 0) => "444",
            (2, 2) => "410",
            (2, 0) => "411",
            (0, 1) => "440",
            (subsampling_w, subsampling_h) => {
                return Err(CompshotError::UnsupportedSubsampling {
                    subsampling_w,
                    subsampling_h,
                });
            }
        },
        other => return Err(CompshotError::UnsupportedColorFamily(other)),
    };

    if format.bits_per_sample > 8 {
        Ok(format!("{base}p{}", format.bits_per_sample))
    } else {
        Ok(base.to_string())
    }
}

/// Build the stream header for a clip.
///
/// # Errors
///
/// [`CompshotError::VariableFormat`] when the clip has no fixed format, plus
/// the errors of [`colorspace_tag`].
pub fn stream_header(info: &ClipInfo) -> Result<String, CompshotError> {
    let format = info.format.as_ref().ok_or(CompshotError::VariableFormat)?;
    let tag = colorspace_tag(format)?;
    Ok(format!(
        "YUV4MPEG2 C{tag} W{} H{} F{}:{} Ip A0:0\n",
        info.width, info.height, info.frame_rate.numerator, info.frame_rate.denominator,
    ))
}

/// Append one frame record.
pub fn write_frame<W: Write + ?Sized>(writer: &mut W, frame: &Frame) -> IoResult<()> {
    writer.write_all(FRAME_MARKER)?;
    frame.write_planes(writer)
}
