//! Async render tests.

#![cfg(feature = "async")]

use std::sync::Arc;

use tokio_stream::StreamExt;

use compshot::{
    ClipInfo, CompshotError, Frame, FrameProps, FrameSource, Plane, PropValue, Rational,
    RenderOptions, RenderStream, TimecodesFuture, VideoFormat,
};
use compshot::clip::{PROP_DURATION_DEN, PROP_DURATION_NUM};

struct Counter {
    info: ClipInfo,
    fail_at: Option<u64>,
}

impl Counter {
    fn new(frame_count: u64) -> Self {
        Self {
            info: ClipInfo {
                frame_count,
                frame_rate: Rational::new(2, 1),
                width: 1,
                height: 1,
                format: Some(VideoFormat::GRAY8),
            },
            fail_at: None,
        }
    }
}

impl FrameSource for Counter {
    fn info(&self) -> &ClipInfo {
        &self.info
    }

    fn get_frame(&self, index: u64) -> Result<Frame, CompshotError> {
        if self.fail_at == Some(index) {
            return Err(CompshotError::VideoDecodeError("corrupt".to_string()));
        }
        let mut props = FrameProps::new();
        props.set(PROP_DURATION_NUM, PropValue::Int(1));
        props.set(PROP_DURATION_DEN, PropValue::Int(2));
        Ok(Frame {
            format: VideoFormat::GRAY8,
            width: 1,
            height: 1,
            planes: vec![Plane {
                width: 1,
                height: 1,
                data: vec![index as u8],
            }],
            props,
        })
    }

    fn worker_count(&self) -> usize {
        3
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn stream_yields_frames_in_order() {
    let mut stream = RenderStream::with_capacity(Arc::new(Counter::new(50)), RenderOptions::new(), 2);

    let mut indices = Vec::new();
    while let Some(item) = stream.next().await {
        let (index, frame) = item.unwrap();
        assert_eq!(frame.planes[0].data[0], index as u8);
        indices.push(index);
    }
    assert_eq!(indices, (0..50).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread")]
async fn stream_ends_with_source_error() {
    let mut source = Counter::new(20);
    source.fail_at = Some(4);
    let mut stream = RenderStream::new(source, RenderOptions::new());

    let mut items = Vec::new();
    while let Some(item) = stream.next().await {
        items.push(item);
    }

    let last = items.pop().unwrap();
    assert!(matches!(last, Err(CompshotError::VideoDecodeError(_))));
    assert!(items.iter().all(|item| item.is_ok()));
    assert!(items.len() <= 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn dropping_stream_stops_render() {
    let mut stream = RenderStream::with_capacity(Counter::new(10_000), RenderOptions::new(), 1);
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.0, 0);
    drop(stream);
}

#[tokio::test(flavor = "multi_thread")]
async fn timecodes_future_resolves() {
    let timecodes = TimecodesFuture::new(Counter::new(4), RenderOptions::new())
        .await
        .unwrap();
    assert_eq!(timecodes, vec![0.0, 0.5, 1.0, 1.5, 2.0]);
}
