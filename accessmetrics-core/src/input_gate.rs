//! Merged reading from several upstream stage channels.
//!
//! The reduce stage reads partial aggregates and watermarks from every
//! partition worker through one gate. The gate selects fairly across the
//! channels that are still open and remembers which ones have ended.

use crate::channel::LocalChannelReceiver;
use crate::types::StreamElement;
use anyhow::{anyhow, Result};
use crossbeam_channel::Select;

/// Channel identifier (index in the input gate).
pub type ChannelIndex = usize;

pub struct InputGate<T> {
    channels: Vec<LocalChannelReceiver<T>>,
    ended_channels: Vec<bool>,
    ended_count: usize,
}

impl<T> InputGate<T> {
    pub fn new(channels: Vec<LocalChannelReceiver<T>>) -> Self {
        let num_channels = channels.len();
        Self {
            channels,
            ended_channels: vec![false; num_channels],
            ended_count: 0,
        }
    }

    /// Next element from any channel that has not ended, with the index of
    /// the channel it came from.
    ///
    /// Each channel's `End` is returned once, so the caller can retire that
    /// upstream. Returns `Ok(None)` once every channel has ended, and an
    /// error if a channel disconnects without sending `End`.
    pub fn next(&mut self) -> Result<Option<(ChannelIndex, StreamElement<T>)>> {
        if self.all_ended() {
            return Ok(None);
        }

        let mut select = Select::new();
        let mut active_indices = Vec::with_capacity(self.channels.len());
        for (idx, receiver) in self.channels.iter().enumerate() {
            if !self.ended_channels[idx] {
                select.recv(&receiver.receiver);
                active_indices.push(idx);
            }
        }

        let oper = select.select();
        let channel_idx = active_indices[oper.index()];
        let element = oper
            .recv(&self.channels[channel_idx].receiver)
            .map_err(|_| anyhow!("Channel {} closed unexpectedly", channel_idx))?;

        if matches!(element, StreamElement::End) {
            self.mark_ended(channel_idx);
        }
        Ok(Some((channel_idx, element)))
    }

    pub fn mark_ended(&mut self, channel_idx: ChannelIndex) {
        if !self.ended_channels[channel_idx] {
            self.ended_channels[channel_idx] = true;
            self.ended_count += 1;
        }
    }

    pub fn all_ended(&self) -> bool {
        self.ended_count == self.channels.len()
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::local_channel;

    #[test]
    fn test_input_gate_single_channel() {
        let (sender, receiver) = local_channel::<i32>(10);
        let mut gate = InputGate::new(vec![receiver]);

        sender.send_record(42).unwrap();
        sender.send(StreamElement::End).unwrap();

        let (ch, elem) = gate.next().unwrap().unwrap();
        assert_eq!(ch, 0);
        assert_eq!(elem, StreamElement::Record(42));

        let (ch, elem) = gate.next().unwrap().unwrap();
        assert_eq!(ch, 0);
        assert_eq!(elem, StreamElement::End);
        assert!(gate.all_ended());
        assert!(gate.next().unwrap().is_none());
    }

    #[test]
    fn test_input_gate_multiple_channels() {
        let (sender1, receiver1) = local_channel::<i32>(10);
        let (sender2, receiver2) = local_channel::<i32>(10);
        let mut gate = InputGate::new(vec![receiver1, receiver2]);
        assert_eq!(gate.num_channels(), 2);

        sender1.send_record(1).unwrap();
        sender2.send_record(2).unwrap();

        let mut values = vec![];
        for _ in 0..2 {
            if let Some((ch, StreamElement::Record(v))) = gate.next().unwrap() {
                assert_eq!(ch as i32 + 1, v);
                values.push(v);
            }
        }
        values.sort();
        assert_eq!(values, vec![1, 2]);
    }

    #[test]
    fn test_input_gate_partial_end() {
        let (sender1, receiver1) = local_channel::<i32>(10);
        let (sender2, receiver2) = local_channel::<i32>(10);
        let mut gate = InputGate::new(vec![receiver1, receiver2]);

        sender1.send(StreamElement::End).unwrap();
        drop(sender1);
        sender2.send_record(7).unwrap();

        let mut saw_end = false;
        let mut saw_record = false;
        for _ in 0..2 {
            match gate.next().unwrap() {
                Some((0, StreamElement::End)) => saw_end = true,
                Some((1, StreamElement::Record(7))) => saw_record = true,
                other => panic!("unexpected {:?}", other),
            }
        }
        assert!(saw_end && saw_record);
        assert!(!gate.all_ended());

        // The dropped channel is no longer polled.
        sender2.send(StreamElement::End).unwrap();
        assert_eq!(gate.next().unwrap(), Some((1, StreamElement::End)));
        assert!(gate.all_ended());
    }

    #[test]
    fn test_input_gate_disconnect_without_end_is_error() {
        let (sender, receiver) = local_channel::<i32>(10);
        let mut gate = InputGate::new(vec![receiver]);
        drop(sender);
        assert!(gate.next().is_err());
    }
}
