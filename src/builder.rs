//! Builder for configuring and constructing a `CadenzaEngine`.

use crate::{CadenzaEngine, Error, Result};
use cadenza_analysis::{AnalysisConfig, EngineError, FeatureEngine};
use cadenza_bridge::BridgeConfig;
use std::sync::Arc;

/// Shared constructor for feature engines; each worker wraps its own copy.
pub type SharedEngineFactory =
    Arc<dyn Fn(u32) -> std::result::Result<Box<dyn FeatureEngine>, EngineError> + Send + Sync>;

/// The feature engine factory is the one required piece: the key/BPM
/// estimator is an external collaborator and has to be injected.
/// Emotion forwarding stays disabled until a bridge is configured.
///
/// # Example
///
/// ```ignore
/// use cadenza::CadenzaEngine;
/// use std::sync::Arc;
///
/// let engine = CadenzaEngine::builder()
///     .sample_rate(44100)
///     .feature_engine(Arc::new(|rate| MyEngine::open(rate)))
///     .bridge(BridgeConfig::new("python3", "resources/script.py"))
///     .build()?;
/// ```
pub struct CadenzaBuilder {
    pub(crate) sample_rate: u32,
    pub(crate) analysis: AnalysisConfig,
    pub(crate) emotion_window_secs: f64,
    pub(crate) bridge: Option<BridgeConfig>,
    pub(crate) engine_factory: Option<SharedEngineFactory>,
}

impl Default for CadenzaBuilder {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            analysis: AnalysisConfig::default(),
            emotion_window_secs: 3.0,
            bridge: None,
            engine_factory: None,
        }
    }
}

impl CadenzaBuilder {
    /// Default: 44100
    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = rate;
        self
    }

    /// Window and decimation configuration for the feature workers.
    pub fn analysis(mut self, config: AnalysisConfig) -> Self {
        self.analysis = config;
        self
    }

    /// Seconds of audio accumulated per emotion frame. Default: 3.0
    pub fn emotion_window_secs(mut self, secs: f64) -> Self {
        self.emotion_window_secs = secs;
        self
    }

    /// Configure the external analysis process. Without this,
    /// `start_emotion_analysis` is rejected.
    pub fn bridge(mut self, config: BridgeConfig) -> Self {
        self.bridge = Some(config);
        self
    }

    /// The key/BPM estimation backend. Required.
    pub fn feature_engine(mut self, factory: SharedEngineFactory) -> Self {
        self.engine_factory = Some(factory);
        self
    }

    pub fn build(self) -> Result<CadenzaEngine> {
        if self.engine_factory.is_none() {
            return Err(Error::Config(
                "a feature engine factory is required; call .feature_engine(...)".into(),
            ));
        }
        CadenzaEngine::from_builder(self)
    }
}
