//! CadenzaEngine: wires the capture tap, analysis workers, subprocess bridge,
//! and score playback together.

use crate::builder::CadenzaBuilder;
use crate::error::{Error, Result};
use arc_swap::ArcSwapOption;
use cadenza_analysis::{EngineFactory, FeatureSummary, FeatureWorker, WorkerReply};
use cadenza_bridge::{BridgeEvent, FeatureFrame, Payload, SubprocessBridge};
use cadenza_midi::{EventScheduler, NoteEvent, NoteSink, PlaybackHandle, Score};
use cadenza_stream::{CaptureTap, SampleBlock, WindowAccumulator};
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Valence/arousal estimate from the external analysis process.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EmotionEstimate {
    pub valence: f64,
    pub arousal: f64,
    pub emotion: String,
}

/// Discrete results and failures surfaced to the embedding layer.
///
/// Errors cross context boundaries as events, never as panics: an analysis
/// failure or process crash is reported here and the pipeline keeps running
/// (or, for a crash, waits for an explicit restart).
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Features for one sealed capture window.
    ChunkFeatures(FeatureSummary),
    /// Features for a one-shot full-file analysis.
    FileFeatures(FeatureSummary),
    /// A single window or file failed to analyze; later ones are unaffected.
    AnalysisError(String),
    /// Emotion estimate for one forwarded frame.
    Emotion(EmotionEstimate),
    /// The external process reported or produced an error for one line.
    RemoteError {
        error: String,
        output: Option<String>,
    },
    /// A response that matched no known shape.
    BridgeResponse(serde_json::Value),
    /// The external process exited; `start_emotion_analysis` may respawn it.
    ProcessExited {
        code: Option<i32>,
        error_output: String,
    },
}

/// Poll granularity for pump threads checking the shutdown flag.
const PUMP_TICK: Duration = Duration::from_millis(200);

/// The pipeline orchestrator.
///
/// Owns one chunked feature worker fed from the capture tap, one full-file
/// worker for one-shot analysis, the subprocess bridge for emotion
/// estimation, and the playback scheduler. Latest results are published
/// lock-free; everything is also surfaced as `EngineEvent`s.
pub struct CadenzaEngine {
    sample_rate: u32,
    chunk_worker: FeatureWorker,
    file_worker: FeatureWorker,
    bridge: Arc<Mutex<SubprocessBridge>>,
    bridge_config: Option<cadenza_bridge::BridgeConfig>,
    capture_tap: Mutex<Option<CaptureTap>>,
    latest_features: Arc<ArcSwapOption<FeatureSummary>>,
    latest_file_features: Arc<ArcSwapOption<FeatureSummary>>,
    latest_emotion: Arc<ArcSwapOption<EmotionEstimate>>,
    events_rx: Receiver<EngineEvent>,
    playback: Mutex<Option<PlaybackHandle>>,
    shutdown: Arc<AtomicBool>,
    pumps: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for CadenzaEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CadenzaEngine")
            .field("sample_rate", &self.sample_rate)
            .finish_non_exhaustive()
    }
}

impl CadenzaEngine {
    pub fn builder() -> CadenzaBuilder {
        CadenzaBuilder::default()
    }

    pub(crate) fn from_builder(builder: CadenzaBuilder) -> Result<Self> {
        let factory = builder
            .engine_factory
            .ok_or_else(|| Error::Config("feature engine factory is required".into()))?;

        let chunk_factory: EngineFactory = {
            let factory = factory.clone();
            Box::new(move |rate| factory(rate))
        };
        let file_factory: EngineFactory = Box::new(move |rate| factory(rate));

        let chunk_worker =
            FeatureWorker::spawn("cadenza-chunk-analysis", builder.analysis, chunk_factory);
        let file_worker =
            FeatureWorker::spawn("cadenza-file-analysis", builder.analysis, file_factory);

        let (capture_tap, capture_rx) = CaptureTap::new();
        let bridge = Arc::new(Mutex::new(SubprocessBridge::new()));
        let (events_tx, events_rx) = unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));

        let latest_features = Arc::new(ArcSwapOption::from(None));
        let latest_file_features = Arc::new(ArcSwapOption::from(None));
        let latest_emotion = Arc::new(ArcSwapOption::from(None));

        let bridge_events = bridge.lock().expect("BUG: fresh bridge lock").events();
        let pumps = vec![
            spawn_capture_pump(
                capture_rx,
                &chunk_worker,
                Arc::clone(&bridge),
                Arc::clone(&latest_features),
                builder.emotion_window_secs,
                builder.sample_rate,
                Arc::clone(&shutdown),
            ),
            spawn_reply_pump(
                "cadenza-feature-events",
                chunk_worker.replies(),
                Arc::clone(&latest_features),
                events_tx.clone(),
                Arc::clone(&shutdown),
            ),
            spawn_reply_pump(
                "cadenza-file-events",
                file_worker.replies(),
                Arc::clone(&latest_file_features),
                events_tx.clone(),
                Arc::clone(&shutdown),
            ),
            spawn_bridge_pump(
                bridge_events,
                Arc::clone(&latest_emotion),
                events_tx,
                Arc::clone(&shutdown),
            ),
        ];

        let engine = Self {
            sample_rate: builder.sample_rate,
            chunk_worker,
            file_worker,
            bridge,
            bridge_config: builder.bridge,
            capture_tap: Mutex::new(Some(capture_tap)),
            latest_features,
            latest_file_features,
            latest_emotion,
            events_rx,
            playback: Mutex::new(None),
            shutdown,
            pumps,
        };
        engine.chunk_worker.init(engine.sample_rate);
        engine.file_worker.init(engine.sample_rate);
        Ok(engine)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Hand the capture tap to the host's render callback. Available once.
    pub fn take_capture_tap(&self) -> Option<CaptureTap> {
        self.capture_tap.lock().expect("capture tap lock").take()
    }

    /// Run one-shot analysis over a whole signal (initial file load path).
    pub fn analyze_file(&self, block: SampleBlock) {
        self.file_worker.analyze_buffer(block);
    }

    /// Start (or restart, after a crash) the external emotion process.
    pub fn start_emotion_analysis(&self) -> Result<()> {
        let config = self.bridge_config.as_ref().ok_or_else(|| {
            Error::Config("no bridge configured; call CadenzaBuilder::bridge(...)".into())
        })?;
        self.bridge
            .lock()
            .expect("bridge lock")
            .ensure_started(config)?;
        Ok(())
    }

    /// Kill the external process. No exit event is emitted.
    pub fn stop_emotion_analysis(&self) {
        self.bridge.lock().expect("bridge lock").shutdown();
    }

    /// The engine's event stream. Single consumer by convention.
    pub fn events(&self) -> Receiver<EngineEvent> {
        self.events_rx.clone()
    }

    /// Latest chunk features, if any window has sealed and analyzed.
    pub fn chunk_features(&self) -> Option<FeatureSummary> {
        self.latest_features.load_full().map(|a| (*a).clone())
    }

    /// Latest full-file features.
    pub fn file_features(&self) -> Option<FeatureSummary> {
        self.latest_file_features.load_full().map(|a| (*a).clone())
    }

    /// Latest emotion estimate.
    pub fn emotion(&self) -> Option<EmotionEstimate> {
        self.latest_emotion.load_full().map(|a| (*a).clone())
    }

    /// Load a score and start playing it through `sink`.
    ///
    /// Any playback already running is cancelled first. Returns the parsed
    /// score so callers can render it.
    pub fn play_score(&self, path: impl AsRef<Path>, sink: Arc<dyn NoteSink>) -> Result<Score> {
        let score = Score::load(path)?;
        self.play_notes(&score.notes, sink);
        Ok(score)
    }

    /// Start playing an already-resolved note list.
    pub fn play_notes(&self, notes: &[NoteEvent], sink: Arc<dyn NoteSink>) {
        let handle = EventScheduler::start(notes, sink);
        let mut playback = self.playback.lock().expect("playback lock");
        if let Some(old) = playback.replace(handle) {
            old.cancel();
        }
    }

    /// Cancel every pending playback callback.
    pub fn stop_playback(&self) {
        if let Some(handle) = self.playback.lock().expect("playback lock").take() {
            handle.cancel();
        }
    }
}

impl Drop for CadenzaEngine {
    fn drop(&mut self) {
        self.stop_playback();
        self.shutdown.store(true, Ordering::Release);
        for pump in self.pumps.drain(..) {
            let _ = pump.join();
        }
        self.bridge.lock().expect("bridge lock").shutdown();
        // Workers shut down when their fields drop (senders close).
    }
}

/// Pumps captured blocks into the chunk worker and seals emotion frames for
/// the external process.
fn spawn_capture_pump(
    capture_rx: Receiver<SampleBlock>,
    chunk_worker: &FeatureWorker,
    bridge: Arc<Mutex<SubprocessBridge>>,
    latest_features: Arc<ArcSwapOption<FeatureSummary>>,
    emotion_window_secs: f64,
    sample_rate: u32,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    let worker_tx = chunk_worker.sender();
    thread::Builder::new()
        .name("cadenza-capture-pump".into())
        .spawn(move || {
            let mut emotion_acc = WindowAccumulator::new(emotion_window_secs, sample_rate);
            while !shutdown.load(Ordering::Acquire) {
                let block = match capture_rx.recv_timeout(PUMP_TICK) {
                    Ok(block) => block,
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                    Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                };

                let mono = block.downmix();
                let _ = worker_tx.send(cadenza_analysis::WorkerMessage::Chunk(block));

                if let Some(window) = emotion_acc.push(mono) {
                    forward_emotion_frame(window, sample_rate, &bridge, &latest_features);
                }
            }
        })
        .expect("failed to spawn capture pump thread")
}

fn forward_emotion_frame(
    window: Vec<f32>,
    sample_rate: u32,
    bridge: &Arc<Mutex<SubprocessBridge>>,
    latest_features: &Arc<ArcSwapOption<FeatureSummary>>,
) {
    // The external process classifies against the already-extracted features;
    // until a first window has analyzed there is nothing useful to send.
    let Some(features) = latest_features.load_full() else {
        debug!("no features yet, skipping emotion frame");
        return;
    };

    let frame = FeatureFrame::new(window, sample_rate, features.bpm, features.key.clone());
    match bridge
        .lock()
        .expect("bridge lock")
        .submit(&Payload::Frame(frame))
    {
        Ok(()) => {}
        Err(cadenza_bridge::Error::NotInitialized) => {
            debug!("emotion process not running, dropping frame");
        }
        Err(e) => warn!("failed to forward emotion frame: {e}"),
    }
}

/// Relays worker replies into the engine event stream and the latest-result
/// slot.
fn spawn_reply_pump(
    name: &str,
    replies: Receiver<WorkerReply>,
    latest: Arc<ArcSwapOption<FeatureSummary>>,
    events: Sender<EngineEvent>,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            while !shutdown.load(Ordering::Acquire) {
                let reply = match replies.recv_timeout(PUMP_TICK) {
                    Ok(reply) => reply,
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                    Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                };
                match reply {
                    WorkerReply::Initialized => debug!("analysis worker initialized"),
                    WorkerReply::ChunkFeatures(summary) => {
                        latest.store(Some(Arc::new(summary.clone())));
                        let _ = events.send(EngineEvent::ChunkFeatures(summary));
                    }
                    WorkerReply::FileFeatures(summary) => {
                        latest.store(Some(Arc::new(summary.clone())));
                        let _ = events.send(EngineEvent::FileFeatures(summary));
                    }
                    WorkerReply::Error(message) => {
                        let _ = events.send(EngineEvent::AnalysisError(message));
                    }
                }
            }
        })
        .expect("failed to spawn reply pump thread")
}

/// Relays bridge events, decoding emotion estimates where they parse.
fn spawn_bridge_pump(
    bridge_events: Receiver<BridgeEvent>,
    latest_emotion: Arc<ArcSwapOption<EmotionEstimate>>,
    events: Sender<EngineEvent>,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name("cadenza-bridge-pump".into())
        .spawn(move || {
            while !shutdown.load(Ordering::Acquire) {
                let event = match bridge_events.recv_timeout(PUMP_TICK) {
                    Ok(event) => event,
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
                    Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                };
                let engine_event = translate_bridge_event(event, &latest_emotion);
                let _ = events.send(engine_event);
            }
        })
        .expect("failed to spawn bridge pump thread")
}

fn translate_bridge_event(
    event: BridgeEvent,
    latest_emotion: &Arc<ArcSwapOption<EmotionEstimate>>,
) -> EngineEvent {
    match event {
        BridgeEvent::Response(value) => {
            if let Ok(emotion) = serde_json::from_value::<EmotionEstimate>(value.clone()) {
                latest_emotion.store(Some(Arc::new(emotion.clone())));
                return EngineEvent::Emotion(emotion);
            }
            if let Some(error) = value.get("error").and_then(|e| e.as_str()) {
                return EngineEvent::RemoteError {
                    error: error.to_string(),
                    output: value
                        .get("output")
                        .and_then(|o| o.as_str())
                        .map(str::to_string),
                };
            }
            EngineEvent::BridgeResponse(value)
        }
        BridgeEvent::ProtocolError { error, output } => EngineEvent::RemoteError {
            error,
            output: Some(output),
        },
        BridgeEvent::Exited { code, error_output } => {
            EngineEvent::ProcessExited { code, error_output }
        }
    }
}
