//! Frame selection and comparison export tests.
//!
//! The test clip alternates one second of dark frames with one second of
//! light frames at 10 fps, so the expected pools are easy to write down.

use std::fs;
use std::path::Path;

use compshot::{
    ClipInfo, Comparison, ComparisonOptions, CompshotError, Frame, FrameList, FrameProps,
    FrameSource, Plane, PoolKind, Rational, RenderOptions, SelectionOptions, VideoFormat, Writer,
};

const DARK: u8 = 40;
const LIGHT: u8 = 160;
const MID: u8 = 110;

/// 4x2 greyscale clip whose frame values come from a closure.
struct Pattern {
    info: ClipInfo,
    value: fn(u64) -> u8,
}

impl Pattern {
    fn new(frame_count: u64, value: fn(u64) -> u8) -> Self {
        Self {
            info: ClipInfo {
                frame_count,
                frame_rate: Rational::new(10, 1),
                width: 4,
                height: 2,
                format: Some(VideoFormat::GRAY8),
            },
            value,
        }
    }
}

impl FrameSource for Pattern {
    fn info(&self) -> &ClipInfo {
        &self.info
    }

    fn get_frame(&self, index: u64) -> Result<Frame, CompshotError> {
        Ok(Frame {
            format: VideoFormat::GRAY8,
            width: 4,
            height: 2,
            planes: vec![Plane {
                width: 4,
                height: 2,
                data: vec![(self.value)(index); 8],
            }],
            props: FrameProps::new(),
        })
    }

    fn worker_count(&self) -> usize {
        4
    }
}

fn alternating(index: u64) -> u8 {
    if (index / 10) % 2 == 0 { DARK } else { LIGHT }
}

fn one_second_gap() -> SelectionOptions {
    SelectionOptions::new().with_min_gap_seconds(1.0)
}

// ── Automatic selection ────────────────────────────────────────────

#[test]
fn select_thins_and_splits_pools() {
    let clip = Pattern::new(100, alternating);
    let selection = compshot::select(&clip, &one_second_gap(), &RenderOptions::new()).unwrap();

    assert_eq!(selection.min_gap_frames, 10);
    assert_eq!(selection.dark, vec![0, 20, 40, 60, 80]);

    // Five light candidates survive the gap; four are sampled.
    assert_eq!(selection.light.len(), 4);
    for frame in &selection.light {
        assert!([10, 30, 50, 70, 90].contains(frame), "unexpected {frame}");
    }
}

#[test]
fn lazylist_is_dark_then_light() {
    let clip = Pattern::new(100, alternating);
    let options = one_second_gap().with_light_frames(10);

    let frames = compshot::lazylist(&clip, &options, &RenderOptions::new()).unwrap();
    assert_eq!(frames, vec![0, 20, 40, 60, 80, 10, 30, 50, 70, 90]);
}

#[test]
fn selection_is_reproducible() {
    let clip = Pattern::new(100, alternating);
    let options = one_second_gap().with_dark_frames(2).with_light_frames(2);

    let first = compshot::lazylist(&clip, &options, &RenderOptions::new()).unwrap();
    let second = compshot::lazylist(
        &clip,
        &options,
        &RenderOptions::new().with_max_concurrency(1),
    )
    .unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len(), 4);
}

#[test]
fn clip_without_light_frames_fails() {
    let clip = Pattern::new(30, |_| DARK);
    let result = compshot::lazylist(&clip, &one_second_gap(), &RenderOptions::new());
    assert!(matches!(result, Err(CompshotError::EmptyPool(PoolKind::Light))));
}

#[test]
fn mid_grey_frames_belong_to_neither_pool() {
    let clip = Pattern::new(30, |index| if index == 0 { DARK } else { MID });
    let result = compshot::select(&clip, &one_second_gap(), &RenderOptions::new());
    assert!(matches!(result, Err(CompshotError::EmptyPool(PoolKind::Light))));
}

#[test]
fn invalid_thresholds_are_rejected_before_rendering() {
    let clip = Pattern::new(30, alternating);
    let options = SelectionOptions::new().with_dark_range(0.5, 0.1);
    let result = compshot::select(&clip, &options, &RenderOptions::new());
    assert!(matches!(result, Err(CompshotError::InvalidThreshold { .. })));
}

// ── Frame lists ────────────────────────────────────────────────────

#[test]
fn frame_list_file_resolves_without_rendering() {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("frames.txt");
    fs::write(&path, "12 0.5 scene\n\n7\n").unwrap();

    let clip = Pattern::new(0, alternating);
    let frames = FrameList::file(&path)
        .resolve(&clip, &RenderOptions::new())
        .unwrap();
    assert_eq!(frames, vec![12, 7]);
}

#[test]
fn missing_frame_list_file_is_io_error() {
    let clip = Pattern::new(10, alternating);
    let result = FrameList::file("does/not/exist.txt").resolve(&clip, &RenderOptions::new());
    assert!(matches!(result, Err(CompshotError::IoError(_))));
}

// ── Comparison export ──────────────────────────────────────────────

fn read_luma(path: &Path) -> u8 {
    let image = image::open(path).unwrap().to_rgb8();
    image.get_pixel(0, 0)[0]
}

#[test]
fn comparison_exports_every_clip() {
    let directory = tempfile::tempdir().unwrap();
    let source = Pattern::new(100, alternating);
    let encode = Pattern::new(100, |index| alternating(index) + 1);

    let report = Comparison::new(
        ComparisonOptions::new()
            .with_folder(directory.path())
            .with_writer(Writer::PerFrameImage)
            .with_frames(FrameList::Explicit(vec![15, 3])),
    )
    .with_clip("src", &source)
    .with_clip("enc", &encode)
    .run()
    .unwrap();

    assert_eq!(report.frames, vec![15, 3]);
    assert_eq!(report.images.len(), 2);

    let (name, paths) = &report.images[0];
    assert_eq!(name, "src");
    assert_eq!(
        paths,
        &vec![
            directory.path().join("src").join("src_00001.png"),
            directory.path().join("src").join("src_00002.png"),
        ]
    );
    assert_eq!(read_luma(&paths[0]), LIGHT);
    assert_eq!(read_luma(&paths[1]), DARK);

    let (name, paths) = &report.images[1];
    assert_eq!(name, "enc");
    assert_eq!(read_luma(&paths[0]), LIGHT + 1);
}

#[test]
fn comparison_selects_from_reference() {
    let directory = tempfile::tempdir().unwrap();
    let clip = Pattern::new(100, alternating);

    let report = Comparison::new(
        ComparisonOptions::new()
            .with_folder(directory.path())
            .with_writer(Writer::PerFrameImage)
            .with_start(0)
            .with_frames(FrameList::Auto(one_second_gap().with_light_frames(10))),
    )
    .with_clip("only", &clip)
    .run()
    .unwrap();

    assert_eq!(report.frames.len(), 10);
    let (_, paths) = &report.images[0];
    assert_eq!(paths[0], directory.path().join("only").join("only_00000.png"));
    assert_eq!(read_luma(&paths[0]), DARK);
    assert_eq!(read_luma(&paths[9]), LIGHT);
}

#[test]
fn comparison_needs_a_clip() {
    let result = Comparison::new(ComparisonOptions::new()).run();
    assert!(matches!(result, Err(CompshotError::NoClips)));
}

#[test]
fn export_past_clip_end_fails() {
    let directory = tempfile::tempdir().unwrap();
    let clip = Pattern::new(10, alternating);

    let result = Writer::PerFrameImage.export(
        "short",
        &clip,
        &[3, 10],
        directory.path(),
        1,
        &RenderOptions::new(),
    );
    assert!(matches!(
        result,
        Err(CompshotError::FrameOutOfRange {
            frame_number: 10,
            total_frames: 10
        })
    ));
}
