//! FFmpeg-backed [`FrameSource`].
//!
//! [`VideoFile`] opens the best video stream of a media file and decodes
//! frames by index. Decoding state lives in a small pool of independent
//! demuxer/decoder pairs so several render workers can decode at once. A
//! pair whose last decoded frame sits shortly before the requested one keeps
//! decoding forward; otherwise it seeks to the nearest keyframe before the
//! target.

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use ffmpeg_next::{
    Packet, Rational as FfmpegRational,
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
    util::error::EAGAIN,
};

use crate::{
    clip::{
        ClipInfo, ColorFamily, Frame, FrameProps, FrameSource, PROP_DURATION_DEN,
        PROP_DURATION_NUM, PropValue, Rational, VideoFormat,
    },
    error::CompshotError,
    metadata::VideoMetadata,
    utilities,
};

/// Frames a decoder will read through instead of seeking.
const SEEK_THRESHOLD: u64 = 48;

/// Pixel layout produced by [`VideoFile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// 8-bit luma only, expanded to full range by the scaler.
    Gray8,
    /// 8-bit 4:2:0 planar YUV.
    #[default]
    Yuv420p,
    /// 8-bit 4:2:2 planar YUV.
    Yuv422p,
    /// 8-bit 4:4:4 planar YUV.
    Yuv444p,
    /// 8-bit packed RGB, for still export.
    Rgb24,
}

impl OutputFormat {
    /// The [`VideoFormat`] of frames in this layout.
    pub fn video_format(self) -> VideoFormat {
        match self {
            OutputFormat::Gray8 => VideoFormat::GRAY8,
            OutputFormat::Yuv420p => VideoFormat::YUV420P8,
            OutputFormat::Yuv422p => VideoFormat::YUV422P8,
            OutputFormat::Yuv444p => VideoFormat::YUV444P8,
            OutputFormat::Rgb24 => VideoFormat::RGB24,
        }
    }

    fn pixel(self) -> Pixel {
        match self {
            OutputFormat::Gray8 => Pixel::GRAY8,
            OutputFormat::Yuv420p => Pixel::YUV420P,
            OutputFormat::Yuv422p => Pixel::YUV422P,
            OutputFormat::Yuv444p => Pixel::YUV444P,
            OutputFormat::Rgb24 => Pixel::RGB24,
        }
    }

    /// Bytes per pixel within one plane.
    fn samples_per_pixel(self) -> usize {
        match self {
            OutputFormat::Rgb24 => 3,
            _ => 1,
        }
    }
}

/// A video file exposed as a [`FrameSource`].
///
/// # Example
///
/// ```no_run
/// use compshot::{FrameSource, OutputFormat, VideoFile};
///
/// let clip = VideoFile::open_with_format("input.mkv", OutputFormat::Gray8)?;
/// let frame = clip.get_frame(1000)?;
/// println!("{} planes", frame.planes.len());
/// # Ok::<(), compshot::CompshotError>(())
/// ```
pub struct VideoFile {
    path: PathBuf,
    stream_index: usize,
    time_base: FfmpegRational,
    start_pts: i64,
    output: OutputFormat,
    metadata: VideoMetadata,
    info: ClipInfo,
    workers: usize,
    pool: Mutex<Vec<DecoderSlot>>,
}

impl Debug for VideoFile {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("VideoFile")
            .field("path", &self.path)
            .field("stream_index", &self.stream_index)
            .field("output", &self.output)
            .field("metadata", &self.metadata)
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

impl VideoFile {
    /// Open a file, producing 4:2:0 YUV frames.
    ///
    /// # Errors
    ///
    /// [`CompshotError::FileOpen`] if the file cannot be opened and
    /// [`CompshotError::NoVideoStream`] if it has no video.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CompshotError> {
        Self::open_with_format(path, OutputFormat::default())
    }

    /// Open a file, producing frames in `output` layout.
    ///
    /// # Errors
    ///
    /// Same as [`open`](VideoFile::open).
    pub fn open_with_format<P: AsRef<Path>>(
        path: P,
        output: OutputFormat,
    ) -> Result<Self, CompshotError> {
        let path = path.as_ref().to_path_buf();
        log::debug!("Opening video file: {}", path.display());

        ffmpeg_next::init().map_err(|error| CompshotError::FileOpen {
            path: path.clone(),
            reason: format!("FFmpeg initialisation failed: {error}"),
        })?;

        let input = ffmpeg_next::format::input(&path).map_err(|error| CompshotError::FileOpen {
            path: path.clone(),
            reason: error.to_string(),
        })?;

        let stream = input
            .streams()
            .best(Type::Video)
            .ok_or(CompshotError::NoVideoStream)?;
        let stream_index = stream.index();
        let time_base = stream.time_base();
        let start_pts = match stream.start_time() {
            i64::MIN => 0,
            start => start,
        };

        let decoder = CodecContext::from_parameters(stream.parameters())
            .and_then(|context| context.decoder().video())
            .map_err(|error| CompshotError::FileOpen {
                path: path.clone(),
                reason: format!("Failed to create video decoder: {error}"),
            })?;

        let frame_rate = utilities::to_rational(stream.avg_frame_rate())
            .or_else(|| utilities::to_rational(stream.rate()))
            .unwrap_or(Rational::new(0, 1));

        let duration = if stream.duration() > 0 {
            Duration::from_secs_f64(utilities::pts_to_seconds(stream.duration(), time_base))
        } else if input.duration() > 0 {
            Duration::from_micros(input.duration() as u64)
        } else {
            Duration::ZERO
        };

        let frame_count = match stream.frames() {
            frames if frames > 0 => frames as u64,
            _ => (duration.as_secs_f64() * frame_rate.as_f64()).round() as u64,
        };

        let pixel_format_name = match decoder.format() {
            Pixel::None => None,
            pixel => Some(format!("{pixel:?}")),
        };

        let metadata = VideoMetadata {
            width: decoder.width(),
            height: decoder.height(),
            frame_rate,
            frame_count,
            duration,
            codec: decoder
                .codec()
                .map(|codec| codec.name().to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            pixel_format_name,
        };

        let info = ClipInfo {
            frame_count,
            frame_rate,
            width: metadata.width,
            height: metadata.height,
            format: Some(output.video_format()),
        };

        log::info!(
            "Opened {}: {}x{}, {} frames at {} fps ({})",
            path.display(),
            metadata.width,
            metadata.height,
            frame_count,
            frame_rate,
            metadata.codec,
        );

        let workers = std::thread::available_parallelism()
            .map(|count| count.get())
            .unwrap_or(1);

        let file = Self {
            path,
            stream_index,
            time_base,
            start_pts,
            output,
            metadata,
            info,
            workers,
            pool: Mutex::new(Vec::new()),
        };

        // Hand the demuxer we already have to the pool.
        let slot = DecoderSlot::from_parts(&file, input, decoder)?;
        file.lock_pool().push(slot);
        Ok(file)
    }

    /// Limit how many frames may be decoded concurrently.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Cached stream metadata.
    pub fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    /// Path this file was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Layout of the produced frames.
    pub fn output_format(&self) -> OutputFormat {
        self.output
    }

    fn lock_pool(&self) -> MutexGuard<'_, Vec<DecoderSlot>> {
        self.pool
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take the decoder best placed to reach `index`, or open a new one.
    fn checkout(&self, index: u64) -> Result<DecoderSlot, CompshotError> {
        {
            let mut pool = self.lock_pool();
            let close = pool.iter().position(|slot| slot.reaches_without_seek(index));
            if let Some(position) = close.or_else(|| pool.len().checked_sub(1)) {
                return Ok(pool.swap_remove(position));
            }
        }

        log::debug!("Opening an additional decoder for {}", self.path.display());
        let input = ffmpeg_next::format::input(&self.path)?;
        let stream = input
            .stream(self.stream_index)
            .ok_or(CompshotError::NoVideoStream)?;
        let decoder = CodecContext::from_parameters(stream.parameters())?
            .decoder()
            .video()?;
        DecoderSlot::from_parts(self, input, decoder)
    }

    fn frame_props(&self) -> FrameProps {
        let mut props = FrameProps::new();
        let rate = self.info.frame_rate;
        if rate.numerator > 0 && rate.denominator > 0 {
            props.set(PROP_DURATION_NUM, PropValue::Int(rate.denominator as i64));
            props.set(PROP_DURATION_DEN, PropValue::Int(rate.numerator as i64));
        }
        props
    }
}

impl FrameSource for VideoFile {
    fn info(&self) -> &ClipInfo {
        &self.info
    }

    fn get_frame(&self, index: u64) -> Result<Frame, CompshotError> {
        if index >= self.info.frame_count {
            return Err(CompshotError::FrameOutOfRange {
                frame_number: index,
                total_frames: self.info.frame_count,
            });
        }

        let mut slot = self.checkout(index)?;
        let decoded = slot.decode(self, index)?;

        let format = self.output.video_format();
        let row_bytes = self.output.samples_per_pixel();
        let planes = (0..format.plane_count())
            .map(|plane| {
                let width = decoded.plane_width(plane) as usize;
                utilities::copy_plane(&decoded, plane, width * row_bytes)
            })
            .collect();

        // Only a slot that decoded cleanly goes back to the pool.
        self.lock_pool().push(slot);

        debug_assert!(format.color_family != ColorFamily::Rgb || format.plane_count() == 1);
        Ok(Frame {
            format,
            width: self.info.width,
            height: self.info.height,
            planes,
            props: self.frame_props(),
        })
    }

    fn worker_count(&self) -> usize {
        self.workers
    }
}

/// One demuxer/decoder/scaler chain and its position in the stream.
struct DecoderSlot {
    input: Input,
    decoder: VideoDecoder,
    scaler: ScalingContext,
    /// Frame number of the last frame handed out.
    last_decoded: Option<u64>,
    /// Set once the demuxer has run out of packets.
    drained: bool,
}

impl DecoderSlot {
    fn from_parts(
        file: &VideoFile,
        input: Input,
        decoder: VideoDecoder,
    ) -> Result<Self, CompshotError> {
        let scaler = ScalingContext::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            file.output.pixel(),
            file.info.width,
            file.info.height,
            ScalingFlags::BICUBIC,
        )?;
        Ok(Self {
            input,
            decoder,
            scaler,
            last_decoded: None,
            drained: false,
        })
    }

    fn reaches_without_seek(&self, index: u64) -> bool {
        self.last_decoded
            .is_some_and(|last| last < index && index - last <= SEEK_THRESHOLD)
    }

    /// Decode frame `index` and return it converted to the output layout.
    fn decode(&mut self, file: &VideoFile, index: u64) -> Result<VideoFrame, CompshotError> {
        if !self.reaches_without_seek(index) {
            self.seek(file, index)?;
        }

        let frames_per_second = file.info.frame_rate.as_f64();
        let mut decoded = VideoFrame::empty();

        loop {
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    let pts = decoded.timestamp().or(decoded.pts()).unwrap_or(file.start_pts);
                    let number = utilities::pts_to_frame_number(
                        pts - file.start_pts,
                        file.time_base,
                        frames_per_second,
                    );
                    if number < index {
                        continue;
                    }
                    // A seek can land past a frame missing from the stream;
                    // the first frame at or after the target stands in for it.
                    self.last_decoded = Some(number.max(index));
                    let mut converted = VideoFrame::empty();
                    self.scaler.run(&decoded, &mut converted)?;
                    return Ok(converted);
                }
                Err(ffmpeg_next::Error::Other { errno }) if errno == EAGAIN => {
                    self.feed(file.stream_index)?;
                }
                Err(ffmpeg_next::Error::Eof) => {
                    return Err(CompshotError::VideoDecodeError(format!(
                        "Could not locate frame {index} in {}",
                        file.path.display()
                    )));
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    /// Send the next packet of the video stream, or end-of-stream.
    fn feed(&mut self, stream_index: usize) -> Result<(), CompshotError> {
        if self.drained {
            return Err(CompshotError::VideoDecodeError(
                "decoder asked for input after end of stream".to_string(),
            ));
        }

        let mut packet = Packet::empty();
        loop {
            match packet.read(&mut self.input) {
                Ok(()) if packet.stream() == stream_index => {
                    return Ok(self.decoder.send_packet(&packet)?);
                }
                Ok(()) => continue,
                Err(ffmpeg_next::Error::Eof) => {
                    self.drained = true;
                    return Ok(self.decoder.send_eof()?);
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    fn seek(&mut self, file: &VideoFile, index: u64) -> Result<(), CompshotError> {
        let target = utilities::frame_number_to_seek_timestamp(index, file.info.frame_rate.as_f64());
        self.input.seek(target, ..target)?;
        self.decoder.flush();
        self.last_decoded = None;
        self.drained = false;
        Ok(())
    }
}
