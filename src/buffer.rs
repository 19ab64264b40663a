//! Latest-frame buffers
//!
//! One single-slot buffer exists per stream kind. The publisher side is owned by whichever
//! task decodes that kind (the drain task for H.264 color, the receive task for depth and
//! still-image color). Readers get the most recent frame as an `Arc<Frame>`, or nothing.
//!
//! Frames are immutable once built and are swapped in whole, so a reader can never observe
//! a partially written frame, and only one frame per kind is ever retained.

use futures::{Stream, StreamExt, stream::BoxStream};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::trace;

use crate::stream::ThrottleExt;
use crate::types::{Frame, UpdateRate};

type Slot = Option<Arc<Frame>>;

/// Create a connected publisher/reader pair with an empty slot
pub fn latest_frame() -> (FramePublisher, LatestFrame) {
    let (tx, rx) = watch::channel(None);
    (FramePublisher { tx: Arc::new(tx) }, LatestFrame { rx })
}

/// Writer side of a latest-frame buffer
#[derive(Clone)]
pub struct FramePublisher {
    tx: Arc<watch::Sender<Slot>>,
}

impl FramePublisher {
    /// Replace the slot with `frame`, returning the shared handle that was stored
    pub fn publish(&self, frame: Frame) -> Arc<Frame> {
        let frame = Arc::new(frame);
        trace!(width = frame.width(), height = frame.height(), "Publishing frame");
        self.tx.send_replace(Some(Arc::clone(&frame)));
        frame
    }

    /// New reader attached to this slot
    pub fn subscribe(&self) -> LatestFrame {
        LatestFrame { rx: self.tx.subscribe() }
    }
}

/// Reader side of a latest-frame buffer
#[derive(Clone)]
pub struct LatestFrame {
    rx: watch::Receiver<Slot>,
}

impl LatestFrame {
    /// Most recent frame, if any has been published
    pub fn snapshot(&self) -> Option<Arc<Frame>> {
        self.rx.borrow().clone()
    }

    /// Wait for the next publication
    ///
    /// Returns `None` once the publisher is gone.
    pub async fn changed(&mut self) -> Option<Arc<Frame>> {
        self.rx.changed().await.ok()?;
        self.rx.borrow_and_update().clone()
    }

    /// Stream of published frames
    ///
    /// Yields the current frame immediately when one exists. With [`UpdateRate::Max`] below
    /// `source_hz`, frames are throttled with latest-wins semantics. The stream ends when the
    /// publisher is dropped.
    pub fn frames(&self, rate: UpdateRate, source_hz: f64) -> BoxStream<'static, Arc<Frame>> {
        let frames = watch_frames(self.rx.clone());

        match rate.throttle_interval(source_hz) {
            None => frames.boxed(),
            Some(interval) => frames.throttle(interval).boxed(),
        }
    }
}

fn watch_frames(rx: watch::Receiver<Slot>) -> impl Stream<Item = Arc<Frame>> + Send + 'static {
    WatchStream::new(rx).filter_map(|slot| async move { slot })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PixelFormat;
    use std::time::Duration;

    fn gray(value: u8) -> Frame {
        Frame::new(2, 2, PixelFormat::Gray8, vec![value; 4]).unwrap()
    }

    #[test]
    fn empty_until_published() {
        let (publisher, latest) = latest_frame();
        assert!(latest.snapshot().is_none());

        publisher.publish(gray(1));
        publisher.publish(gray(2));

        let frame = latest.snapshot().unwrap();
        assert_eq!(frame.data(), &[2, 2, 2, 2]);
    }

    #[test]
    fn snapshot_outlives_replacement() {
        let (publisher, latest) = latest_frame();
        publisher.publish(gray(1));
        let held = latest.snapshot().unwrap();

        publisher.publish(gray(9));

        assert_eq!(held.data(), &[1, 1, 1, 1]);
        assert_eq!(latest.snapshot().unwrap().data(), &[9, 9, 9, 9]);
    }

    #[tokio::test]
    async fn changed_wakes_on_publish_and_ends_with_publisher() {
        let (publisher, mut latest) = latest_frame();
        let subscriber = publisher.subscribe();

        let waiter = tokio::spawn(async move { latest.changed().await });
        tokio::task::yield_now().await;
        publisher.publish(gray(5));

        let frame = waiter.await.unwrap().unwrap();
        assert_eq!(frame.data()[0], 5);

        let mut latest = subscriber;
        drop(publisher);
        assert_eq!(latest.changed().await.unwrap().data()[0], 5);
        assert!(latest.changed().await.is_none());
    }

    #[tokio::test]
    async fn native_stream_yields_current_then_updates() {
        let (publisher, latest) = latest_frame();
        publisher.publish(gray(1));

        let mut frames = latest.frames(UpdateRate::Native, 30.0);
        let first = frames.next().await.unwrap();
        assert_eq!(first.data()[0], 1);

        publisher.publish(gray(2));
        let second = tokio::time::timeout(Duration::from_secs(1), frames.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.data()[0], 2);

        drop(publisher);
        assert!(frames.next().await.is_none());
    }

    #[tokio::test]
    async fn throttled_stream_keeps_latest() {
        let (publisher, latest) = latest_frame();
        for value in 1..=3 {
            publisher.publish(gray(value));
        }

        let mut frames = latest.frames(UpdateRate::Max(10), 30.0);
        let frame = tokio::time::timeout(Duration::from_secs(1), frames.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.data()[0], 3);
    }
}
