//! # Cadenza - Streaming Audio Feature Pipeline
//!
//! Turns a continuous real-time sample stream into discrete analysis results
//! (tempo, key, emotion estimates) and precisely-timed musical events, across
//! isolated execution contexts and without ever stalling the capture side.
//!
//! ## Architecture
//!
//! Cadenza is an umbrella crate that coordinates:
//! - **cadenza-stream** - capture tap, sample blocks, window accumulation
//! - **cadenza-analysis** - background feature workers (key/BPM over sealed
//!   windows, plus one-shot full-file analysis)
//! - **cadenza-bridge** - the long-lived external analysis process, spoken to
//!   over a line-framed JSON protocol on standard streams
//! - **cadenza-midi** - score loading, tempo-aware tick conversion, and the
//!   playback scheduler
//!
//! ## Quick Start
//!
//! ```ignore
//! use cadenza::CadenzaEngine;
//! use std::sync::Arc;
//!
//! let engine = CadenzaEngine::builder()
//!     .sample_rate(44100)
//!     .feature_engine(Arc::new(|rate| MyEngine::open(rate)))
//!     .build()?;
//!
//! // Hand the tap to the host's render callback.
//! let mut tap = engine.take_capture_tap().unwrap();
//! // ... host calls tap.process(inputs, outputs) per render quantum ...
//!
//! // Results arrive as events and as lock-free latest values.
//! for event in engine.events().iter() {
//!     println!("{event:?}");
//! }
//! ```

pub mod builder;
pub mod engine;
pub mod error;

pub use builder::{CadenzaBuilder, SharedEngineFactory};
pub use engine::{CadenzaEngine, EmotionEstimate, EngineEvent};
pub use error::{Error, Result};

// Re-export of the subsystem crates for direct access
pub use cadenza_analysis as analysis;
pub use cadenza_bridge as bridge;
pub use cadenza_midi as midi;
pub use cadenza_stream as stream;

// Stream types
pub use cadenza_stream::{CaptureTap, SampleBlock, WindowAccumulator};

// Analysis types
pub use cadenza_analysis::{
    AnalysisConfig, EngineError, FeatureEngine, FeatureSummary, RawFeatures,
};

// Bridge types
pub use cadenza_bridge::{BridgeConfig, BridgeEvent, FeatureFrame, Payload, SubprocessBridge};

// MIDI types
pub use cadenza_midi::{
    EventScheduler, NoteEvent, NoteSink, PlaybackHandle, Score, TempoChange, TempoMap,
};
