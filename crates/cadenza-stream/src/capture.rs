//! Real-time capture tap.
//!
//! Runs inside the host's render callback: passes input through to output
//! unmodified and posts a copy of the input block to the analysis side.
//! Posting never blocks and never waits on the consumer.

use crate::SampleBlock;
use crossbeam_channel::{unbounded, Receiver, Sender};

/// Pass-through tap for the real-time render callback.
///
/// The only work done on the audio thread is the output copy and the send of
/// one forwarded block; allocation is limited to that forwarded copy (the
/// channel itself is unbounded, so the producer never parks).
pub struct CaptureTap {
    tx: Sender<SampleBlock>,
    sequence: u64,
}

impl CaptureTap {
    /// Create a tap and the receiver its blocks arrive on, in capture order.
    pub fn new() -> (Self, Receiver<SampleBlock>) {
        let (tx, rx) = unbounded();
        (Self { tx, sequence: 0 }, rx)
    }

    /// Process one render quantum.
    ///
    /// Copies each input channel to the matching output channel (channels with
    /// no input are left untouched), then posts the input as a `SampleBlock`.
    /// A quantum with no input channels posts nothing. A disconnected consumer
    /// is ignored: forwarding is this layer's whole job, and there is nothing
    /// useful it can do about a dead consumer from the render callback.
    pub fn process(&mut self, input: &[&[f32]], output: &mut [&mut [f32]]) {
        for (channel, out) in output.iter_mut().enumerate() {
            if let Some(inp) = input.get(channel) {
                let n = inp.len().min(out.len());
                out[..n].copy_from_slice(&inp[..n]);
            }
        }

        if input.is_empty() {
            return;
        }

        let channels: Vec<Vec<f32>> = input.iter().map(|c| c.to_vec()).collect();
        let block = SampleBlock::new(channels, self.sequence);
        self.sequence += 1;
        let _ = self.tx.try_send(block);
    }
}
