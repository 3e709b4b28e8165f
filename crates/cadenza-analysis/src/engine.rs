//! Feature engine contract and result types.

use thiserror::Error;

/// Errors surfaced by a feature engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine could not be constructed or initialized.
    #[error("engine initialization failed: {0}")]
    Init(String),

    /// A single analysis pass failed. Subsequent passes may still succeed.
    #[error("analysis failed: {0}")]
    Analysis(String),
}

/// Raw engine output: tempo estimate plus tonic/scale.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFeatures {
    pub bpm: f64,
    /// Tonic, e.g. `"C"` or `"F#"`.
    pub key: String,
    /// Scale, e.g. `"major"` or `"minor"`.
    pub scale: String,
}

/// Analysis result for one window or one whole file.
///
/// Tempo is rounded to the nearest integer BPM; `key` combines tonic and
/// scale (`"C major"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSummary {
    pub bpm: u32,
    pub key: String,
}

impl From<RawFeatures> for FeatureSummary {
    fn from(raw: RawFeatures) -> Self {
        Self {
            bpm: raw.bpm.round().max(0.0) as u32,
            key: format!("{} {}", raw.key, raw.scale),
        }
    }
}

/// Key/BPM estimation over a mono sample buffer.
///
/// Implementations are opaque analysis backends (spectral estimators, WASM
/// engines, test stubs). `analyze` runs synchronously on the calling worker
/// thread; failures must come back as `EngineError`, never panics.
pub trait FeatureEngine: Send {
    fn analyze(&mut self, samples: &[f32], sample_rate: u32) -> Result<RawFeatures, EngineError>;
}
