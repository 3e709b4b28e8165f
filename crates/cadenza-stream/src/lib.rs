//! # Cadenza Stream
//!
//! Stream segmentation for real-time audio analysis:
//! - **SampleBlock**: per-channel sample blocks handed off from the render callback
//! - **CaptureTap**: pass-through tap that forwards blocks without blocking the
//!   real-time context
//! - **WindowAccumulator**: accumulates variable-size chunks into fixed-duration
//!   analysis windows
//!
//! The capture side never blocks and never drops: blocks travel over an
//! unbounded channel in capture order, and the accumulator's buffer growth
//! between seals is unbounded by contract.

pub mod accumulator;
pub mod block;
pub mod capture;

pub use accumulator::WindowAccumulator;
pub use block::SampleBlock;
pub use capture::CaptureTap;
