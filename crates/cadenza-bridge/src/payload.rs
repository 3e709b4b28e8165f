//! Submission payloads.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

/// A sealed analysis window plus the features already extracted for it,
/// forwarded to the external process for emotion estimation.
///
/// Frames are large (seconds of raw samples) and are always staged through a
/// temp file rather than sent inline.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureFrame {
    pub samples: Vec<f32>,
    #[serde(rename = "sampleRate")]
    pub sample_rate: u32,
    #[serde(rename = "totalSamples")]
    pub total_samples: usize,
    pub bpm: u32,
    pub key: String,
}

impl FeatureFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32, bpm: u32, key: String) -> Self {
        let total_samples = samples.len();
        Self {
            samples,
            sample_rate,
            total_samples,
            bpm,
            key,
        }
    }
}

/// One submission to the external process.
#[derive(Debug, Clone)]
pub enum Payload {
    /// A feature frame; staged to a temp file, referenced by path on the
    /// wire. The consumer deletes the file once read.
    Frame(FeatureFrame),
    /// A small control payload written inline as a single line.
    Control(serde_json::Value),
}

static FRAME_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A unique staging path for one frame file.
pub(crate) fn frame_path() -> PathBuf {
    let n = FRAME_COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("cadenza_frame_{}_{}.json", std::process::id(), n))
}
