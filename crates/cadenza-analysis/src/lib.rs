//! # Cadenza Analysis
//!
//! Background feature analysis for the streaming pipeline:
//! - **FeatureEngine**: the opaque key/BPM estimation contract (bring your own
//!   backend - the engine is a collaborator, not reimplemented here)
//! - **FeatureWorker**: a message-driven state machine on its own thread that
//!   accumulates capture chunks into analysis windows and runs the engine
//! - **decimate**: linear-average sample-rate reduction applied before
//!   analysis when the capture rate exceeds the engine's preferred rate
//!
//! Workers process one message at a time to completion. Analysis failures are
//! reported per window and never terminate the worker.

pub mod decimate;
pub mod engine;
pub mod worker;

pub use decimate::decimate;
pub use engine::{EngineError, FeatureEngine, FeatureSummary, RawFeatures};
pub use worker::{AnalysisConfig, EngineFactory, FeatureWorker, WorkerMessage, WorkerReply};
