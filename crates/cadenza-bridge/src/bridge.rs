//! Lifecycle and submission management for the external analysis process.

use crate::error::{Error, Result};
use crate::event::BridgeEvent;
use crate::framing::LineDecoder;
use crate::payload::{self, Payload};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{error, info, warn};

/// Where the external process lives and what build it must be.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub executable: PathBuf,
    pub script: PathBuf,
    /// Substring that `<executable> --version` must report before the
    /// long-lived process is ever spawned.
    pub expected_version: String,
}

impl BridgeConfig {
    pub fn new(executable: impl Into<PathBuf>, script: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            script: script.into(),
            expected_version: "Python 3.9".to_string(),
        }
    }

    pub fn expected_version(mut self, version: impl Into<String>) -> Self {
        self.expected_version = version.into();
        self
    }
}

/// Lifecycle of the managed process, modeled explicitly: either no process
/// exists, or one is live with its streams and reader thread attached.
enum ProcessState {
    Absent,
    Ready(ProcessHandle),
}

struct ProcessHandle {
    child: Arc<Mutex<Child>>,
    stdin: ChildStdin,
    alive: Arc<AtomicBool>,
    expected_exit: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

/// Manages exactly one external analysis process.
///
/// All lifecycle operations and submissions take `&mut self`: the bridge is a
/// single-consumer, strictly serialized control surface. Responses carry no
/// correlation IDs; they are assumed to arrive in submission order, which
/// serialized submission makes well-defined.
pub struct SubprocessBridge {
    state: ProcessState,
    events_tx: Sender<BridgeEvent>,
    events_rx: Receiver<BridgeEvent>,
}

impl SubprocessBridge {
    pub fn new() -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            state: ProcessState::Absent,
            events_tx,
            events_rx,
        }
    }

    /// The event stream: responses, per-line protocol errors, and terminal
    /// exit events. Single consumer by convention.
    pub fn events(&self) -> Receiver<BridgeEvent> {
        self.events_rx.clone()
    }

    /// Whether a live process is attached.
    pub fn is_ready(&self) -> bool {
        matches!(&self.state, ProcessState::Ready(h) if h.alive.load(Ordering::Acquire))
    }

    /// Verify the executable and spawn the long-lived process.
    ///
    /// A no-op when a live process is already attached. The version gate runs
    /// before every spawn: `<executable> --version` must report output
    /// containing `config.expected_version`, otherwise nothing is spawned.
    pub fn ensure_started(&mut self, config: &BridgeConfig) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }
        self.clear_dead_handle();

        check_version(config)?;
        if !config.script.exists() {
            return Err(Error::ScriptNotFound(config.script.clone()));
        }

        info!(
            executable = %config.executable.display(),
            script = %config.script.display(),
            "starting analysis process"
        );
        let handle = spawn_process(config, self.events_tx.clone())?;
        self.state = ProcessState::Ready(handle);
        Ok(())
    }

    /// Write one submission as a newline-terminated JSON line.
    ///
    /// Feature frames are staged to a temp file and only the file path goes
    /// over the pipe; the consumer deletes the file once read. Rejected with
    /// `NotInitialized` when no live process is attached.
    pub fn submit(&mut self, payload: &Payload) -> Result<()> {
        if !self.is_ready() {
            self.clear_dead_handle();
            return Err(Error::NotInitialized);
        }

        let line = match payload {
            Payload::Frame(frame) => {
                let path = payload::frame_path();
                let file = File::create(&path).map_err(Error::Payload)?;
                serde_json::to_writer(BufWriter::new(file), frame)
                    .map_err(|e| Error::Payload(e.into()))?;
                serde_json::json!({ "filePath": path })
            }
            Payload::Control(value) => value.clone(),
        };

        let ProcessState::Ready(handle) = &mut self.state else {
            return Err(Error::NotInitialized);
        };
        let mut text =
            serde_json::to_string(&line).map_err(|e| Error::Payload(e.into()))?;
        text.push('\n');
        handle.stdin.write_all(text.as_bytes()).map_err(Error::Stdin)?;
        handle.stdin.flush().map_err(Error::Stdin)
    }

    /// Kill the process and detach. No exit event is emitted for an explicit
    /// shutdown.
    pub fn shutdown(&mut self) {
        if let ProcessState::Ready(mut handle) =
            std::mem::replace(&mut self.state, ProcessState::Absent)
        {
            handle.expected_exit.store(true, Ordering::Release);
            if let Ok(mut child) = handle.child.lock() {
                let _ = child.kill();
            }
            if let Some(reader) = handle.reader.take() {
                let _ = reader.join();
            }
        }
    }

    /// Drop a handle whose process has already died, so the state reads
    /// `Absent` and a later `ensure_started` respawns.
    fn clear_dead_handle(&mut self) {
        let dead = matches!(&self.state, ProcessState::Ready(h) if !h.alive.load(Ordering::Acquire));
        if dead {
            if let ProcessState::Ready(mut handle) =
                std::mem::replace(&mut self.state, ProcessState::Absent)
            {
                if let Some(reader) = handle.reader.take() {
                    let _ = reader.join();
                }
            }
        }
    }
}

impl Default for SubprocessBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SubprocessBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn check_version(config: &BridgeConfig) -> Result<()> {
    let output = Command::new(&config.executable)
        .arg("--version")
        .output()
        .map_err(|e| Error::VersionCheckFailed {
            executable: config.executable.clone(),
            reason: e.to_string(),
        })?;

    // Interpreter version banners go to stdout or stderr depending on the
    // build; accept either.
    let mut found = String::from_utf8_lossy(&output.stdout).into_owned();
    found.push_str(&String::from_utf8_lossy(&output.stderr));

    if !found.contains(&config.expected_version) {
        return Err(Error::VersionMismatch {
            executable: config.executable.clone(),
            expected: config.expected_version.clone(),
            found: found.trim().to_string(),
        });
    }
    Ok(())
}

fn spawn_process(config: &BridgeConfig, events: Sender<BridgeEvent>) -> Result<ProcessHandle> {
    let mut child = Command::new(&config.executable)
        .arg(&config.script)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(Error::Spawn)?;

    let stdin = child.stdin.take().expect("BUG: stdin was piped");
    let stdout = child.stdout.take().expect("BUG: stdout was piped");
    let stderr = child.stderr.take().expect("BUG: stderr was piped");

    let alive = Arc::new(AtomicBool::new(true));
    let expected_exit = Arc::new(AtomicBool::new(false));
    let child = Arc::new(Mutex::new(child));

    // Diagnostic text accumulates until exit, then rides the terminal event.
    let stderr_thread = thread::Builder::new()
        .name("cadenza-bridge-stderr".into())
        .spawn(move || {
            let mut reader = stderr;
            let mut text = String::new();
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => text.push_str(&String::from_utf8_lossy(&buf[..n])),
                }
            }
            text
        })
        .map_err(Error::Spawn)?;

    let reader_alive = Arc::clone(&alive);
    let reader_expected = Arc::clone(&expected_exit);
    let reader_child = Arc::clone(&child);
    let reader = thread::Builder::new()
        .name("cadenza-bridge-stdout".into())
        .spawn(move || {
            let mut reader = stdout;
            let mut decoder = LineDecoder::new();
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        for line in decoder.feed(&buf[..n]) {
                            match serde_json::from_str::<serde_json::Value>(&line) {
                                Ok(value) => {
                                    let _ = events.send(BridgeEvent::Response(value));
                                }
                                Err(e) => {
                                    warn!("unparseable line from analysis process: {line:?}");
                                    let _ = events.send(BridgeEvent::ProtocolError {
                                        error: format!("invalid JSON from analysis process: {e}"),
                                        output: line,
                                    });
                                }
                            }
                        }
                    }
                }
            }

            // Stdout EOF means the process is gone (or closed its end).
            reader_alive.store(false, Ordering::Release);
            let code = reader_child
                .lock()
                .ok()
                .and_then(|mut c| c.wait().ok())
                .and_then(|status| status.code());
            let error_output = stderr_thread.join().unwrap_or_default();

            if !reader_expected.load(Ordering::Acquire) {
                error!(?code, "analysis process exited");
                let _ = events.send(BridgeEvent::Exited { code, error_output });
            }
        })
        .map_err(Error::Spawn)?;

    Ok(ProcessHandle {
        child,
        stdin,
        alive,
        expected_exit,
        reader: Some(reader),
    })
}
