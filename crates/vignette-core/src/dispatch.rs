//! Delivery of finished images to consumers.
//!
//! A loader task hands its artifact to a [`TargetDispatcher`] and awaits
//! the dispatcher's completion before reporting the load complete, so the
//! consumer side (a UI context, a channel, a test harness) controls where
//! and when the image is actually consumed.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::types::DecodedImage;

/// Trait implemented by consumers of finished images.
#[async_trait]
pub trait TargetDispatcher: Send + Sync {
    /// Deliver a finished artifact. The loader task awaits this call
    /// before it declares the load complete.
    async fn deliver(&self, image: &Arc<DecodedImage>, is_animated: bool);
}

/// Dispatcher that drops images on the floor; useful when the caller only
/// wants the returned artifact.
pub struct NoopDispatcher;

#[async_trait]
impl TargetDispatcher for NoopDispatcher {
    async fn deliver(&self, _image: &Arc<DecodedImage>, _is_animated: bool) {}
}

/// A delivered artifact with its animation flag.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub image: Arc<DecodedImage>,
    pub is_animated: bool,
}

/// Dispatcher that forwards finished images over a bounded channel,
/// suspending the loader task until the consumer side has room.
pub struct ChannelDispatcher {
    tx: mpsc::Sender<Delivery>,
}

impl ChannelDispatcher {
    /// Create a dispatcher and the receiving end of its channel.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<Delivery>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl TargetDispatcher for ChannelDispatcher {
    async fn deliver(&self, image: &Arc<DecodedImage>, is_animated: bool) {
        // A dropped receiver means the consumer went away; the load
        // itself still succeeded.
        let _ = self
            .tx
            .send(Delivery {
                image: image.clone(),
                is_animated,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Frame;
    use image::DynamicImage;

    fn artifact() -> Arc<DecodedImage> {
        Arc::new(DecodedImage::single(
            Frame::new(DynamicImage::new_rgb8(2, 2)),
            Some("png".to_string()),
        ))
    }

    #[tokio::test]
    async fn test_channel_dispatcher_forwards_delivery() {
        let (dispatcher, mut rx) = ChannelDispatcher::new(4);
        let image = artifact();

        dispatcher.deliver(&image, false).await;

        let delivery = rx.recv().await.unwrap();
        assert!(Arc::ptr_eq(&delivery.image, &image));
        assert!(!delivery.is_animated);
    }

    #[tokio::test]
    async fn test_channel_dispatcher_survives_dropped_receiver() {
        let (dispatcher, rx) = ChannelDispatcher::new(1);
        drop(rx);
        // Must not panic or hang
        dispatcher.deliver(&artifact(), true).await;
    }

    #[tokio::test]
    async fn test_noop_dispatcher_completes() {
        NoopDispatcher.deliver(&artifact(), false).await;
    }
}
