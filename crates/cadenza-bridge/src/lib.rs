//! # Cadenza Bridge
//!
//! Manages one long-lived external analysis process per session:
//! - version gate before the first spawn (`<executable> --version` must report
//!   an expected build)
//! - newline-framed JSON submissions over the process's stdin; large sample
//!   payloads are staged in a temp file and referenced by path so the line
//!   protocol never carries multi-megabyte lines
//! - response framing that splits stdout on newlines, holds back the trailing
//!   partial line, and turns unparseable lines into structured errors without
//!   stopping the stream
//! - crash recovery: process exit emits one terminal event and degrades the
//!   handle so a later `ensure_started` may respawn
//!
//! Spawning is an explicit, gated action: `submit` while no process is live is
//! rejected rather than auto-spawning.

pub mod bridge;
pub mod error;
pub mod event;
pub mod framing;
pub mod payload;

pub use bridge::{BridgeConfig, SubprocessBridge};
pub use error::{Error, Result};
pub use event::BridgeEvent;
pub use framing::LineDecoder;
pub use payload::{FeatureFrame, Payload};
