//! Screenshot export.
//!
//! A [`Writer`] turns a list of frame numbers of one clip into PNG files
//! named `<name>_<NNNNN>.png`. Both writers render through the out-of-order
//! engine, so frames are decoded concurrently while files are still written
//! in list order.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs,
    io::Write,
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    str::FromStr,
};

use image::{ImageFormat, RgbImage};

use crate::{
    adapters::{AssumeFps, SelectedFrames},
    clip::{ColorFamily, Frame, FrameSource, Rational, VideoFormat},
    configuration::RenderOptions,
    error::CompshotError,
    progress::OperationType,
    render::Renderer,
};

/// How stills are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Writer {
    /// Pipe raw RGB frames to an `ffmpeg` process that cuts one PNG per
    /// second of input. Images are numbered from 0.
    #[default]
    RawPixelStream,
    /// Encode each frame in-process with the `image` crate. Images are
    /// numbered from the export's `start` value.
    PerFrameImage,
}

impl Display for Writer {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Writer::RawPixelStream => f.write_str("raw"),
            Writer::PerFrameImage => f.write_str("image"),
        }
    }
}

impl FromStr for Writer {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "raw" | "ffmpeg" => Ok(Writer::RawPixelStream),
            "image" | "png" => Ok(Writer::PerFrameImage),
            other => Err(format!("unknown writer {other:?} (expected raw or image)")),
        }
    }
}

/// Path of still `number` of clip `name`.
pub fn image_path(directory: &Path, name: &str, number: u64) -> PathBuf {
    directory.join(format!("{name}_{number:05}.png"))
}

impl Writer {
    /// Export `frames` of `clip` into `directory`, creating it if needed.
    ///
    /// `clip` must produce 8-bit RGB or greyscale frames (open it with
    /// [`OutputFormat::Rgb24`](crate::OutputFormat::Rgb24)). `start` is the
    /// first image number for [`Writer::PerFrameImage`].
    ///
    /// Returns the written paths in `frames` order.
    ///
    /// # Errors
    ///
    /// - [`CompshotError::UnsupportedExportFormat`] for other layouts.
    /// - [`CompshotError::FrameOutOfRange`] for frames past the clip end.
    /// - [`CompshotError::EncoderError`] if `ffmpeg` cannot be started or
    ///   exits with a failure.
    /// - Render, I/O and image encoding errors.
    pub fn export<S: FrameSource + ?Sized>(
        &self,
        name: &str,
        clip: &S,
        frames: &[u64],
        directory: &Path,
        start: u64,
        options: &RenderOptions,
    ) -> Result<Vec<PathBuf>, CompshotError> {
        check_exportable(clip.info().format)?;
        fs::create_dir_all(directory)?;

        let selected = SelectedFrames::new(clip, frames.to_vec())?;
        let options = options.clone().with_operation(OperationType::Export);

        log::info!(
            "Exporting {} frames of {name} to {} ({self} writer)",
            frames.len(),
            directory.display()
        );

        match self {
            Writer::RawPixelStream => {
                let paths: Vec<PathBuf> = (0..frames.len() as u64)
                    .map(|number| image_path(directory, name, number))
                    .collect();
                export_raw_stream(&selected, &paths, &options)?;
                Ok(paths)
            }
            Writer::PerFrameImage => {
                let paths: Vec<PathBuf> = (0..frames.len() as u64)
                    .map(|number| image_path(directory, name, start + number))
                    .collect();
                export_images(&selected, &paths, &options)?;
                Ok(paths)
            }
        }
    }
}

fn check_exportable(format: Option<VideoFormat>) -> Result<(), CompshotError> {
    let format = format.ok_or(CompshotError::VariableFormat)?;
    match (format.color_family, format.bits_per_sample) {
        (ColorFamily::Rgb | ColorFamily::Gray, 8) => Ok(()),
        (family, bits_per_sample) => Err(CompshotError::UnsupportedExportFormat {
            family,
            bits_per_sample,
        }),
    }
}

/// Convert an 8-bit RGB or greyscale frame to an image.
///
/// # Errors
///
/// [`CompshotError::UnsupportedExportFormat`] for any other layout.
pub fn frame_to_image(frame: &Frame) -> Result<RgbImage, CompshotError> {
    check_exportable(Some(frame.format))?;

    let plane = frame.planes.first().ok_or_else(|| {
        CompshotError::VideoDecodeError("frame has no planes".to_string())
    })?;
    let data = match frame.format.color_family {
        ColorFamily::Gray => plane.data.iter().flat_map(|&luma| [luma; 3]).collect(),
        _ => plane.data.clone(),
    };

    RgbImage::from_raw(frame.width, frame.height, data).ok_or_else(|| {
        CompshotError::VideoDecodeError(format!(
            "frame data does not fill a {}x{} image",
            frame.width, frame.height
        ))
    })
}

fn export_images<S: FrameSource>(
    clip: &S,
    paths: &[PathBuf],
    options: &RenderOptions,
) -> Result<(), CompshotError> {
    Renderer::new(clip)
        .with_options(options.clone())
        .with_callback(|index, frame| {
            let path = &paths[index as usize];
            log::debug!("Saving frame {}/{} to {}", index + 1, paths.len(), path.display());
            frame_to_image(frame)?.save_with_format(path, ImageFormat::Png)?;
            Ok(())
        })
        .run()?;
    Ok(())
}

/// Arguments for an `ffmpeg` process reading `width`x`height` RGB at 1 fps
/// from stdin and writing one PNG per input second.
fn raw_stream_arguments(width: u32, height: u32, paths: &[PathBuf]) -> Vec<String> {
    let size = format!("{width}x{height}");
    let mut arguments: Vec<String> = [
        "-hide_banner",
        "-loglevel",
        "error",
        "-y",
        "-f",
        "rawvideo",
        "-video_size",
        size.as_str(),
        "-pixel_format",
        "rgb24",
        "-framerate",
        "1",
        "-i",
        "pipe:",
    ]
    .iter()
    .map(|argument| argument.to_string())
    .collect();

    for (second, path) in paths.iter().enumerate() {
        arguments.extend([
            "-pred".to_string(),
            "mixed".to_string(),
            "-ss".to_string(),
            second.to_string(),
            "-t".to_string(),
            "1".to_string(),
            path.to_string_lossy().into_owned(),
        ]);
    }
    arguments
}

fn export_raw_stream<S: FrameSource>(
    clip: &S,
    paths: &[PathBuf],
    options: &RenderOptions,
) -> Result<(), CompshotError> {
    if paths.is_empty() {
        return Ok(());
    }

    let clip = AssumeFps::new(clip, Rational::new(1, 1));
    let info = clip.info();
    let arguments = raw_stream_arguments(info.width, info.height, paths);

    let mut child = Command::new("ffmpeg")
        .args(&arguments)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|error| {
            CompshotError::EncoderError(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {error}"
            ))
        })?;

    let Some(mut stdin) = child.stdin.take() else {
        abandon(child);
        return Err(CompshotError::EncoderError(
            "failed to open ffmpeg stdin".to_string(),
        ));
    };

    let gray = info
        .format
        .is_some_and(|format| format.color_family == ColorFamily::Gray);
    let rendered = Renderer::new(&clip)
        .with_options(options.clone())
        .with_callback(|_, frame| {
            if gray {
                let image = frame_to_image(frame)?;
                stdin.write_all(image.as_raw())?;
            } else {
                frame.write_planes(&mut stdin)?;
            }
            Ok(())
        })
        .run();
    drop(stdin);

    if let Err(error) = rendered {
        abandon(child);
        return Err(error);
    }

    let output = child.wait_with_output().map_err(|error| {
        CompshotError::EncoderError(format!("failed to wait for ffmpeg to finish: {error}"))
    })?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CompshotError::EncoderError(format!(
            "ffmpeg exited with status {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(())
}

fn abandon(mut child: Child) {
    if let Err(error) = child.kill() {
        log::debug!("ffmpeg already exited: {error}");
    }
    let _ = child.wait();
}
