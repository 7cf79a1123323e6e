//! Async rendering.
//!
//! [`RenderStream`] yields the frames of a render session, in order, to async
//! code. [`TimecodesFuture`] runs a whole session in the background and
//! resolves to its timecodes. Both run the blocking render engine on
//! `tokio::task::spawn_blocking`; the stream hands frames back through a
//! bounded channel so a slow consumer holds the render back instead of
//! piling frames up in memory.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tokio_stream::StreamExt;
//!
//! use compshot::{CompshotError, RenderOptions, RenderStream, VideoFile};
//!
//! # async fn example() -> Result<(), CompshotError> {
//! let clip = Arc::new(VideoFile::open("input.mkv")?);
//! let mut stream = RenderStream::new(clip, RenderOptions::new());
//!
//! while let Some(result) = stream.next().await {
//!     let (index, frame) = result?;
//!     println!("frame {index}: {} bytes", frame.data_len());
//! }
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::mpsc::{Receiver, Sender};
use tokio::task::JoinHandle;
use tokio_stream::Stream;

use crate::clip::{Frame, FrameSource};
use crate::configuration::RenderOptions;
use crate::error::CompshotError;
use crate::render::Renderer;

/// Default bounded-channel capacity for [`RenderStream`].
const DEFAULT_CHANNEL_CAPACITY: usize = 8;

type StreamItem = Result<(u64, Frame), CompshotError>;

/// In-order frames of a render session running on a blocking thread.
///
/// Dropping the stream closes the channel; the render stops at the next
/// delivered frame.
pub struct RenderStream {
    receiver: Receiver<StreamItem>,
    #[allow(dead_code)]
    handle: JoinHandle<()>,
}

impl RenderStream {
    /// Start rendering `source` with the default channel capacity.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new<S: FrameSource + 'static>(source: S, options: RenderOptions) -> Self {
        Self::with_capacity(source, options, DEFAULT_CHANNEL_CAPACITY)
    }

    /// Start rendering `source`, buffering at most `capacity` delivered
    /// frames ahead of the consumer.
    pub fn with_capacity<S: FrameSource + 'static>(
        source: S,
        options: RenderOptions,
        capacity: usize,
    ) -> Self {
        let (sender, receiver) = tokio::sync::mpsc::channel(capacity.max(1));

        let handle = tokio::task::spawn_blocking(move || {
            if let Err(error) = render_blocking(&source, options, &sender) {
                // The receiver may already be gone.
                let _ = sender.blocking_send(Err(error));
            }
        });

        Self { receiver, handle }
    }
}

impl Stream for RenderStream {
    type Item = StreamItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

fn render_blocking<S: FrameSource>(
    source: &S,
    options: RenderOptions,
    sender: &Sender<StreamItem>,
) -> Result<(), CompshotError> {
    Renderer::new(source)
        .with_options(options)
        .with_callback(|index, frame| {
            sender
                .blocking_send(Ok((index, frame.clone())))
                .map_err(|_| CompshotError::Cancelled)
        })
        .run()?;
    Ok(())
}

/// Timecodes of a render session running on a blocking thread.
pub struct TimecodesFuture {
    handle: JoinHandle<Result<Vec<f64>, CompshotError>>,
}

impl TimecodesFuture {
    /// Start rendering `source`. Must be called from within a Tokio runtime.
    pub fn new<S: FrameSource + 'static>(source: S, options: RenderOptions) -> Self {
        let handle = tokio::task::spawn_blocking(move || {
            Renderer::new(&source).with_options(options).run()
        });
        Self { handle }
    }
}

impl Future for TimecodesFuture {
    type Output = Result<Vec<f64>, CompshotError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(|result| {
            result.unwrap_or_else(|error| Err(CompshotError::RenderAborted(error.to_string())))
        })
    }
}
