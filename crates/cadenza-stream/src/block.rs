//! Sample blocks captured from the render callback.

/// An ordered block of single-precision samples for one or more channels.
///
/// Blocks are created inside the real-time render callback, stamped with a
/// monotonically increasing sequence number, and handed off to analysis
/// contexts. A block is never mutated after it has been sent.
#[derive(Debug, Clone)]
pub struct SampleBlock {
    channels: Vec<Vec<f32>>,
    sequence: u64,
}

impl SampleBlock {
    pub fn new(channels: Vec<Vec<f32>>, sequence: u64) -> Self {
        Self { channels, sequence }
    }

    /// Build a single-channel block from a mono buffer.
    pub fn mono(samples: Vec<f32>, sequence: u64) -> Self {
        Self {
            channels: vec![samples],
            sequence,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Arrival order stamp assigned by the capture tap.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(|c| c.as_slice())
    }

    /// Samples per channel. Channels are expected to be equal length; the
    /// shortest channel bounds the frame count.
    pub fn frames(&self) -> usize {
        self.channels.iter().map(|c| c.len()).min().unwrap_or(0)
    }

    /// Equal-weight mono fold-down: the arithmetic mean of all channels at
    /// each sample index. A single-channel block passes through as a copy.
    pub fn downmix(&self) -> Vec<f32> {
        match self.channels.len() {
            0 => Vec::new(),
            1 => self.channels[0].clone(),
            n => {
                let frames = self.frames();
                let scale = 1.0 / n as f32;
                (0..frames)
                    .map(|i| self.channels.iter().map(|c| c[i]).sum::<f32>() * scale)
                    .collect()
            }
        }
    }
}
