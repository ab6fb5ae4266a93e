//! In-memory `SyncTransport` backed by channels.

use async_trait::async_trait;
use tokio::sync::mpsc;

use storyloom_core::error::SyncError;
use storyloom_sync::wire::{Frame, SyncTransport};

/// One end of an in-memory frame channel.
#[derive(Debug)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Frame>,
    rx: mpsc::UnboundedReceiver<Frame>,
}

impl ChannelTransport {
    /// Drains every frame currently queued on this end without awaiting.
    pub fn drain(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

/// Builds a connected pair of transports: frames sent on one end arrive
/// on the other.
#[must_use]
pub fn transport_pair() -> (ChannelTransport, ChannelTransport) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (
        ChannelTransport { tx: a_tx, rx: a_rx },
        ChannelTransport { tx: b_tx, rx: b_rx },
    )
}

#[async_trait]
impl SyncTransport for ChannelTransport {
    async fn send(&mut self, frame: Frame) -> Result<(), SyncError> {
        self.tx
            .send(frame)
            .map_err(|_| SyncError::NetworkUnavailable("channel closed".to_owned()))
    }

    async fn recv(&mut self) -> Result<Option<Frame>, SyncError> {
        Ok(self.rx.recv().await)
    }
}
