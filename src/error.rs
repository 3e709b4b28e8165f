//! Centralized error type for the cadenza umbrella crate.
//!
//! Wraps subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Bridge: {0}")]
    Bridge(#[from] cadenza_bridge::Error),

    #[error("MIDI: {0}")]
    Midi(#[from] cadenza_midi::Error),

    #[error("engine configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
