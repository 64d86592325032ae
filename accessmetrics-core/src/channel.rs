//! Bounded channels between pipeline stages.
//!
//! Every stage hand-off (ingest to partition workers, workers to the reduce
//! stage, operator to the sink) goes through one of these. A full channel
//! blocks the sender, so a slow sink throttles ingestion instead of letting
//! results pile up in memory.

use crate::types::StreamElement;
use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver, Sender};

/// Default channel buffer size.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Sender side of a stage channel.
pub struct LocalChannelSender<T> {
    sender: Sender<StreamElement<T>>,
}

// Manual impl: cloning a sender must not require `T: Clone`.
impl<T> Clone for LocalChannelSender<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T> LocalChannelSender<T> {
    /// Send a stream element. Blocks while the channel is full.
    pub fn send(&self, element: StreamElement<T>) -> Result<()> {
        self.sender
            .send(element)
            .map_err(|_| anyhow!("Channel closed: receiver dropped"))
    }

    pub fn send_record(&self, value: T) -> Result<()> {
        self.send(StreamElement::Record(value))
    }

    /// Try to send without blocking. Fails if the channel is full or closed.
    pub fn try_send(&self, element: StreamElement<T>) -> Result<()> {
        self.sender
            .try_send(element)
            .map_err(|e| anyhow!("Failed to send: {}", e))
    }

    /// Number of elements waiting in the channel.
    pub fn len(&self) -> usize {
        self.sender.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sender.is_empty()
    }
}

/// Receiver side of a stage channel.
pub struct LocalChannelReceiver<T> {
    pub(crate) receiver: Receiver<StreamElement<T>>,
}

impl<T> LocalChannelReceiver<T> {
    /// Receive the next element. Blocks until one is available.
    pub fn recv(&self) -> Result<StreamElement<T>> {
        self.receiver
            .recv()
            .map_err(|_| anyhow!("Channel closed: sender dropped"))
    }
}

/// Create a bounded channel pair with the given capacity.
///
/// # Backpressure
/// When the channel is full, `send()` blocks until the receiver catches up.
pub fn local_channel<T>(capacity: usize) -> (LocalChannelSender<T>, LocalChannelReceiver<T>) {
    let (sender, receiver) = bounded(capacity.max(1));
    (
        LocalChannelSender { sender },
        LocalChannelReceiver { receiver },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_channel_send_recv() {
        let (sender, receiver) = local_channel::<i32>(10);
        sender.send_record(42).unwrap();

        match receiver.recv().unwrap() {
            StreamElement::Record(value) => assert_eq!(value, 42),
            other => panic!("Expected Record, got {:?}", other),
        }
    }

    #[test]
    fn test_local_channel_watermark_and_end() {
        let (sender, receiver) = local_channel::<i32>(10);
        sender.send(StreamElement::watermark(1000)).unwrap();
        sender.send(StreamElement::End).unwrap();

        match receiver.recv().unwrap() {
            StreamElement::Watermark(wm) => assert_eq!(wm.timestamp, 1000),
            other => panic!("Expected Watermark, got {:?}", other),
        }
        assert_eq!(receiver.recv().unwrap(), StreamElement::End);
    }

    #[test]
    fn test_local_channel_backpressure() {
        let (sender, receiver) = local_channel::<i32>(2);
        sender.send_record(1).unwrap();
        sender.send_record(2).unwrap();
        assert_eq!(sender.len(), 2);

        // Full: a non-blocking send fails.
        assert!(sender.try_send(StreamElement::record(3)).is_err());

        receiver.recv().unwrap();
        sender.try_send(StreamElement::record(3)).unwrap();
    }

    #[test]
    fn test_local_channel_closed() {
        let (sender, receiver) = local_channel::<i32>(10);
        sender.send_record(42).unwrap();
        drop(sender);

        // Buffered elements are still delivered after the sender is gone.
        assert!(matches!(receiver.recv().unwrap(), StreamElement::Record(42)));
        assert!(receiver.recv().is_err());
    }

    #[test]
    fn test_send_to_dropped_receiver_fails() {
        let (sender, receiver) = local_channel::<i32>(10);
        drop(receiver);
        assert!(sender.send_record(1).is_err());
    }
}
