//! Accumulation of variable-size sample chunks into fixed-duration windows.

/// Accumulates mono sample chunks until a fixed-duration window has filled.
///
/// Each `push` appends a chunk; once the running count reaches the configured
/// threshold, everything buffered since the last seal is concatenated into one
/// window (which may exceed the threshold - the final chunk is not split) and
/// internal state resets to empty.
///
/// There is no back-pressure: the buffer grows without bound between seals.
/// The producer side is a real-time capture path that must never be blocked,
/// so bounding has to happen, if at all, by the consumer keeping pace.
#[derive(Debug)]
pub struct WindowAccumulator {
    chunks: Vec<Vec<f32>>,
    buffered: usize,
    window_samples: usize,
}

impl WindowAccumulator {
    /// Window threshold is `round(window_secs * sample_rate)` samples.
    pub fn new(window_secs: f64, sample_rate: u32) -> Self {
        Self {
            chunks: Vec::new(),
            buffered: 0,
            window_samples: (window_secs * sample_rate as f64).round() as usize,
        }
    }

    pub fn window_samples(&self) -> usize {
        self.window_samples
    }

    /// Samples buffered since the last seal.
    pub fn buffered(&self) -> usize {
        self.buffered
    }

    /// Append a chunk. Returns the sealed window when the threshold is
    /// reached, otherwise `None`.
    pub fn push(&mut self, samples: Vec<f32>) -> Option<Vec<f32>> {
        self.buffered += samples.len();
        self.chunks.push(samples);

        if self.buffered < self.window_samples {
            return None;
        }

        let mut window = Vec::with_capacity(self.buffered);
        for chunk in self.chunks.drain(..) {
            window.extend_from_slice(&chunk);
        }
        self.buffered = 0;
        Some(window)
    }

    /// Discard everything buffered since the last seal.
    pub fn reset(&mut self) {
        self.chunks.clear();
        self.buffered = 0;
    }
}
