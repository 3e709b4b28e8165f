//! Error types for the subprocess bridge.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Running `<executable> --version` failed outright.
    #[error("failed to verify {executable} version: {reason}")]
    VersionCheckFailed { executable: PathBuf, reason: String },

    /// The executable runs but is not the expected build.
    #[error("{executable} reported an unexpected version: expected output containing {expected:?}, found {found:?}")]
    VersionMismatch {
        executable: PathBuf,
        expected: String,
        found: String,
    },

    /// The analysis script the process should run does not exist.
    #[error("analysis script not found at {0}")]
    ScriptNotFound(PathBuf),

    /// A submit was attempted with no live process. Spawning is explicit;
    /// call `ensure_started` first.
    #[error("analysis process not initialized")]
    NotInitialized,

    #[error("failed to spawn analysis process: {0}")]
    Spawn(std::io::Error),

    /// Writing a submission to the process's stdin failed (the process has
    /// usually died; an exit event follows).
    #[error("failed to write to analysis process: {0}")]
    Stdin(std::io::Error),

    /// Staging a large payload to a temp file failed.
    #[error("failed to stage payload file: {0}")]
    Payload(std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
