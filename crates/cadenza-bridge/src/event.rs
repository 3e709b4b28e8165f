//! Events emitted by the bridge's reader threads.

/// One event from the external process.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    /// One complete, well-formed response line.
    Response(serde_json::Value),

    /// A complete line that failed to parse as JSON. Later lines keep
    /// flowing; this is per-line, not terminal.
    ProtocolError { error: String, output: String },

    /// The process exited (crash or normal termination). Terminal for this
    /// process instance; `ensure_started` may respawn. Carries whatever the
    /// process wrote to its error stream. Not emitted on explicit shutdown.
    Exited {
        code: Option<i32>,
        error_output: String,
    },
}
