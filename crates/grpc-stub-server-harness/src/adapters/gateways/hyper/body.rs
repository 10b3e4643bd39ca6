use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use hyper::body::{Body, Bytes, Frame};
use tokio::sync::mpsc;

/// Response body fed frame by frame from the call task
pub(super) struct ChannelBody {
    frames: Option<mpsc::Receiver<Frame<Bytes>>>,
}

impl ChannelBody {
    pub(super) fn new(frames: mpsc::Receiver<Frame<Bytes>>) -> Self {
        Self {
            frames: Some(frames),
        }
    }

    /// Body of a trailers-only response
    pub(super) fn empty() -> Self {
        Self { frames: None }
    }
}

impl Body for ChannelBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let Some(frames) = self.frames.as_mut() else {
            return Poll::Ready(None);
        };
        match frames.poll_recv(cx) {
            Poll::Ready(Some(frame)) => Poll::Ready(Some(Ok(frame))),
            Poll::Ready(None) => {
                self.frames = None;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.frames.is_none()
    }
}
