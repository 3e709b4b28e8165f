//! Message-driven analysis worker.
//!
//! Each worker runs on its own thread, owns its accumulator and engine
//! exclusively, and processes one message at a time to completion. Analysis
//! failures become `Error` replies; the worker itself keeps running.

use crate::decimate::decimate;
use crate::engine::{EngineError, FeatureEngine, FeatureSummary};
use cadenza_stream::{SampleBlock, WindowAccumulator};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Constructs the analysis engine for a given capture sample rate.
///
/// Called on the worker thread when `Init` arrives. May fail; `Init` can then
/// be retried.
pub type EngineFactory =
    Box<dyn FnMut(u32) -> Result<Box<dyn FeatureEngine>, EngineError> + Send>;

/// Analysis window and rate configuration.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisConfig {
    /// Seconds of audio accumulated per analysis window (default: 15.0).
    pub window_secs: f64,
    /// Preferred engine sample rate; windows captured above it are decimated
    /// down before analysis (default: 22050).
    pub target_sample_rate: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_secs: 15.0,
            target_sample_rate: 22050,
        }
    }
}

/// Commands accepted by a worker.
pub enum WorkerMessage {
    /// Initialize the engine for the given capture sample rate.
    Init { sample_rate: u32 },
    /// A capture chunk for windowed analysis.
    Chunk(SampleBlock),
    /// A whole signal to analyze once, bypassing the accumulator.
    FullBuffer(SampleBlock),
}

/// Replies emitted by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerReply {
    Initialized,
    /// Features for one sealed analysis window.
    ChunkFeatures(FeatureSummary),
    /// Features for a one-shot full-buffer analysis.
    FileFeatures(FeatureSummary),
    Error(String),
}

enum State {
    Uninitialized,
    Initializing,
    Ready {
        engine: Box<dyn FeatureEngine>,
        accumulator: WindowAccumulator,
        sample_rate: u32,
    },
}

/// Handle to a running analysis worker thread.
///
/// Dropping the handle closes the command channel; the worker drains what it
/// has and exits, discarding any partially accumulated window.
pub struct FeatureWorker {
    tx: Option<Sender<WorkerMessage>>,
    replies: Receiver<WorkerReply>,
    thread: Option<JoinHandle<()>>,
}

impl FeatureWorker {
    /// Spawn a named worker thread.
    pub fn spawn(name: &str, config: AnalysisConfig, factory: EngineFactory) -> Self {
        let (tx, rx) = unbounded::<WorkerMessage>();
        let (reply_tx, reply_rx) = unbounded::<WorkerReply>();

        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(rx, reply_tx, config, factory))
            .expect("failed to spawn analysis worker thread");

        Self {
            tx: Some(tx),
            replies: reply_rx,
            thread: Some(thread),
        }
    }

    /// The worker's command sender.
    pub fn sender(&self) -> Sender<WorkerMessage> {
        self.tx.as_ref().expect("worker sender taken").clone()
    }

    /// The worker's reply stream. Single consumer by convention.
    pub fn replies(&self) -> Receiver<WorkerReply> {
        self.replies.clone()
    }

    pub fn init(&self, sample_rate: u32) {
        self.send(WorkerMessage::Init { sample_rate });
    }

    pub fn push_chunk(&self, block: SampleBlock) {
        self.send(WorkerMessage::Chunk(block));
    }

    pub fn analyze_buffer(&self, block: SampleBlock) {
        self.send(WorkerMessage::FullBuffer(block));
    }

    fn send(&self, message: WorkerMessage) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(message);
        }
    }

    /// Shut the worker down and wait for it to exit.
    pub fn join(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.tx.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for FeatureWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    rx: Receiver<WorkerMessage>,
    replies: Sender<WorkerReply>,
    config: AnalysisConfig,
    mut factory: EngineFactory,
) {
    let mut state = State::Uninitialized;

    while let Ok(message) = rx.recv() {
        match message {
            WorkerMessage::Init { sample_rate } => match state {
                State::Ready { .. } => {
                    // Already initialized; nothing to rebuild.
                    let _ = replies.send(WorkerReply::Initialized);
                }
                _ => {
                    state = State::Initializing;
                    match factory(sample_rate) {
                        Ok(engine) => {
                            debug!(sample_rate, "analysis engine initialized");
                            state = State::Ready {
                                engine,
                                accumulator: WindowAccumulator::new(
                                    config.window_secs,
                                    sample_rate,
                                ),
                                sample_rate,
                            };
                            let _ = replies.send(WorkerReply::Initialized);
                        }
                        Err(e) => {
                            warn!("analysis engine initialization failed: {e}");
                            state = State::Uninitialized;
                            let _ = replies.send(WorkerReply::Error(e.to_string()));
                        }
                    }
                }
            },

            WorkerMessage::Chunk(block) => match &mut state {
                State::Ready {
                    engine,
                    accumulator,
                    sample_rate,
                } => {
                    if let Some(window) = accumulator.push(block.downmix()) {
                        let reply = match run_engine(
                            engine.as_mut(),
                            &window,
                            *sample_rate,
                            config.target_sample_rate,
                        ) {
                            Ok(summary) => WorkerReply::ChunkFeatures(summary),
                            Err(e) => WorkerReply::Error(e.to_string()),
                        };
                        let _ = replies.send(reply);
                    }
                }
                _ => {
                    let _ = replies.send(WorkerReply::Error(
                        "analysis engine not initialized".into(),
                    ));
                }
            },

            WorkerMessage::FullBuffer(block) => match &mut state {
                State::Ready {
                    engine,
                    sample_rate,
                    ..
                } => {
                    let samples = block.downmix();
                    let reply = match run_engine(
                        engine.as_mut(),
                        &samples,
                        *sample_rate,
                        config.target_sample_rate,
                    ) {
                        Ok(summary) => WorkerReply::FileFeatures(summary),
                        Err(e) => WorkerReply::Error(e.to_string()),
                    };
                    let _ = replies.send(reply);
                }
                _ => {
                    let _ = replies.send(WorkerReply::Error(
                        "analysis engine not initialized".into(),
                    ));
                }
            },
        }
    }
}

/// Shared analysis routine for the chunked and full-buffer paths.
fn run_engine(
    engine: &mut dyn FeatureEngine,
    samples: &[f32],
    capture_rate: u32,
    target_rate: u32,
) -> Result<FeatureSummary, EngineError> {
    let (data, rate) = if capture_rate > target_rate {
        (decimate(samples, capture_rate, target_rate), target_rate)
    } else {
        (samples.to_vec(), capture_rate)
    };
    engine.analyze(&data, rate).map(FeatureSummary::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RawFeatures;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Records the buffers it is asked to analyze.
    struct StubEngine {
        seen: Arc<std::sync::Mutex<Vec<(usize, u32)>>>,
        fail_next: Arc<AtomicUsize>,
    }

    impl FeatureEngine for StubEngine {
        fn analyze(
            &mut self,
            samples: &[f32],
            sample_rate: u32,
        ) -> Result<RawFeatures, EngineError> {
            if self.fail_next.load(Ordering::SeqCst) > 0 {
                self.fail_next.fetch_sub(1, Ordering::SeqCst);
                return Err(EngineError::Analysis("stub failure".into()));
            }
            self.seen.lock().unwrap().push((samples.len(), sample_rate));
            Ok(RawFeatures {
                bpm: 120.0,
                key: "C".into(),
                scale: "major".into(),
            })
        }
    }

    fn stub_worker(
        config: AnalysisConfig,
    ) -> (
        FeatureWorker,
        Arc<std::sync::Mutex<Vec<(usize, u32)>>>,
        Arc<AtomicUsize>,
    ) {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let fail_next = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        let fail2 = fail_next.clone();
        let factory: EngineFactory = Box::new(move |_rate| {
            Ok(Box::new(StubEngine {
                seen: seen2.clone(),
                fail_next: fail2.clone(),
            }) as Box<dyn FeatureEngine>)
        });
        let worker = FeatureWorker::spawn("test-analysis", config, factory);
        (worker, seen, fail_next)
    }

    fn recv(replies: &Receiver<WorkerReply>) -> WorkerReply {
        replies
            .recv_timeout(Duration::from_secs(5))
            .expect("expected a worker reply")
    }

    #[test]
    fn chunk_before_init_is_rejected_without_crashing() {
        let (worker, _, _) = stub_worker(AnalysisConfig::default());
        let replies = worker.replies();

        worker.push_chunk(SampleBlock::mono(vec![0.0; 16], 0));
        assert!(matches!(recv(&replies), WorkerReply::Error(_)));

        // Worker still alive: init succeeds afterwards.
        worker.init(8);
        assert_eq!(recv(&replies), WorkerReply::Initialized);
    }

    #[test]
    fn failed_init_can_be_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts2 = attempts.clone();
        let factory: EngineFactory = Box::new(move |_rate| {
            if attempts2.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(EngineError::Init("backend unavailable".into()))
            } else {
                Ok(Box::new(StubEngine {
                    seen: Arc::new(std::sync::Mutex::new(Vec::new())),
                    fail_next: Arc::new(AtomicUsize::new(0)),
                }) as Box<dyn FeatureEngine>)
            }
        });
        let worker = FeatureWorker::spawn("test-analysis", AnalysisConfig::default(), factory);
        let replies = worker.replies();

        worker.init(44100);
        assert!(matches!(recv(&replies), WorkerReply::Error(_)));
        worker.init(44100);
        assert_eq!(recv(&replies), WorkerReply::Initialized);
    }

    #[test]
    fn chunks_accumulate_into_windows() {
        // 1 s window at 8 Hz = 8 samples; capture rate below target, so the
        // engine sees the window undecimated.
        let config = AnalysisConfig {
            window_secs: 1.0,
            target_sample_rate: 22050,
        };
        let (worker, seen, _) = stub_worker(config);
        let replies = worker.replies();
        worker.init(8);
        assert_eq!(recv(&replies), WorkerReply::Initialized);

        for i in 0..3 {
            worker.push_chunk(SampleBlock::mono(vec![0.1; 3], i));
        }
        let reply = recv(&replies);
        assert_eq!(
            reply,
            WorkerReply::ChunkFeatures(FeatureSummary {
                bpm: 120,
                key: "C major".into(),
            })
        );
        // Third push sealed at 9 samples (threshold 8, overshoot kept).
        assert_eq!(seen.lock().unwrap().as_slice(), &[(9, 8)]);
    }

    #[test]
    fn windows_are_decimated_to_the_target_rate() {
        let config = AnalysisConfig {
            window_secs: 1.0,
            target_sample_rate: 4,
        };
        let (worker, seen, _) = stub_worker(config);
        let replies = worker.replies();
        worker.init(8);
        assert_eq!(recv(&replies), WorkerReply::Initialized);

        worker.push_chunk(SampleBlock::mono(vec![0.0; 8], 0));
        assert!(matches!(recv(&replies), WorkerReply::ChunkFeatures(_)));
        // 8 samples at 8 Hz decimated to 4 Hz -> 4 samples.
        assert_eq!(seen.lock().unwrap().as_slice(), &[(4, 4)]);
    }

    #[test]
    fn analysis_failure_does_not_stop_later_windows() {
        let config = AnalysisConfig {
            window_secs: 0.5,
            target_sample_rate: 22050,
        };
        let (worker, seen, fail_next) = stub_worker(config);
        let replies = worker.replies();
        worker.init(8);
        assert_eq!(recv(&replies), WorkerReply::Initialized);

        fail_next.store(1, Ordering::SeqCst);
        worker.push_chunk(SampleBlock::mono(vec![0.0; 4], 0));
        assert!(matches!(recv(&replies), WorkerReply::Error(_)));

        worker.push_chunk(SampleBlock::mono(vec![0.0; 4], 1));
        assert!(matches!(recv(&replies), WorkerReply::ChunkFeatures(_)));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn full_buffer_bypasses_the_accumulator() {
        let config = AnalysisConfig {
            window_secs: 1.0,
            target_sample_rate: 22050,
        };
        let (worker, seen, _) = stub_worker(config);
        let replies = worker.replies();
        worker.init(8);
        assert_eq!(recv(&replies), WorkerReply::Initialized);

        // Partially fill the window, then run a one-shot analysis.
        worker.push_chunk(SampleBlock::mono(vec![0.0; 3], 0));
        worker.analyze_buffer(SampleBlock::mono(vec![0.0; 5], 1));
        assert!(matches!(recv(&replies), WorkerReply::FileFeatures(_)));
        assert_eq!(seen.lock().unwrap().as_slice(), &[(5, 8)]);

        // Chunking state is untouched: 5 more samples seal the 8-sample
        // window at 3 + 5.
        worker.push_chunk(SampleBlock::mono(vec![0.0; 5], 2));
        assert!(matches!(recv(&replies), WorkerReply::ChunkFeatures(_)));
        assert_eq!(seen.lock().unwrap().last(), Some(&(8, 8)));
    }

    #[test]
    fn stereo_chunks_are_downmixed_before_accumulation() {
        let config = AnalysisConfig {
            window_secs: 0.5,
            target_sample_rate: 22050,
        };
        let (worker, seen, _) = stub_worker(config);
        let replies = worker.replies();
        worker.init(8);
        assert_eq!(recv(&replies), WorkerReply::Initialized);

        // 4 stereo frames fold down to 4 mono samples, sealing the window.
        let block = SampleBlock::new(vec![vec![1.0; 4], vec![-1.0; 4]], 0);
        worker.push_chunk(block);
        assert!(matches!(recv(&replies), WorkerReply::ChunkFeatures(_)));
        assert_eq!(seen.lock().unwrap().as_slice(), &[(4, 8)]);
    }

    #[test]
    fn dropping_the_handle_stops_the_worker() {
        let (worker, _, _) = stub_worker(AnalysisConfig::default());
        drop(worker);
    }
}
