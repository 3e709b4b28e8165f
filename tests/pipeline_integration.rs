//! End-to-end pipeline tests: capture tap through analysis workers, emotion
//! forwarding, and playback.

use cadenza::{
    AnalysisConfig, BridgeConfig, CadenzaEngine, EngineError, EngineEvent, FeatureEngine,
    NoteEvent, NoteSink, RawFeatures, SharedEngineFactory,
};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Deterministic stand-in for the external key/BPM estimator.
struct StubEngine;

impl FeatureEngine for StubEngine {
    fn analyze(&mut self, _samples: &[f32], _sample_rate: u32) -> Result<RawFeatures, EngineError> {
        Ok(RawFeatures {
            bpm: 98.0,
            key: "D".into(),
            scale: "minor".into(),
        })
    }
}

fn stub_factory() -> SharedEngineFactory {
    Arc::new(|_rate| Ok(Box::new(StubEngine) as Box<dyn FeatureEngine>))
}

/// Drive the tap like a host render callback: two channels, `frames` samples.
fn render_quantum(tap: &mut cadenza::CaptureTap, frames: usize) {
    let left = vec![0.25f32; frames];
    let right = vec![-0.25f32; frames];
    let mut out_l = vec![0.0f32; frames];
    let mut out_r = vec![0.0f32; frames];
    let mut outputs: Vec<&mut [f32]> = vec![&mut out_l, &mut out_r];
    tap.process(&[&left[..], &right[..]], &mut outputs);
    // Pass-through is unconditional.
    assert_eq!(out_l, left);
    assert_eq!(out_r, right);
}

/// Wait for the first event matching `pred`, discarding others.
fn wait_for_event(
    events: &crossbeam_channel::Receiver<EngineEvent>,
    mut pred: impl FnMut(&EngineEvent) -> bool,
) -> EngineEvent {
    let deadline = Instant::now() + EVENT_TIMEOUT;
    loop {
        let remaining = deadline
            .checked_duration_since(Instant::now())
            .expect("timed out waiting for engine event");
        let event = events
            .recv_timeout(remaining)
            .expect("timed out waiting for engine event");
        if pred(&event) {
            return event;
        }
    }
}

#[test]
fn chunked_capture_produces_features() {
    init_tracing();
    // 50-sample analysis window at 1 kHz.
    let engine = CadenzaEngine::builder()
        .sample_rate(1000)
        .analysis(AnalysisConfig {
            window_secs: 0.05,
            target_sample_rate: 22050,
        })
        .feature_engine(stub_factory())
        .build()
        .unwrap();

    let mut tap = engine.take_capture_tap().expect("tap available once");
    assert!(engine.take_capture_tap().is_none());

    let events = engine.events();
    for _ in 0..3 {
        render_quantum(&mut tap, 20);
    }

    let event = wait_for_event(&events, |e| matches!(e, EngineEvent::ChunkFeatures(_)));
    let EngineEvent::ChunkFeatures(summary) = event else {
        unreachable!()
    };
    assert_eq!(summary.bpm, 98);
    assert_eq!(summary.key, "D minor");

    assert_eq!(engine.chunk_features().map(|f| f.bpm), Some(98));
    assert!(engine.file_features().is_none());
}

#[test]
fn full_file_analysis_is_one_shot() {
    let engine = CadenzaEngine::builder()
        .sample_rate(1000)
        .feature_engine(stub_factory())
        .build()
        .unwrap();

    let events = engine.events();
    engine.analyze_file(cadenza::SampleBlock::mono(vec![0.1; 500], 0));

    let event = wait_for_event(&events, |e| matches!(e, EngineEvent::FileFeatures(_)));
    let EngineEvent::FileFeatures(summary) = event else {
        unreachable!()
    };
    assert_eq!(summary.key, "D minor");
    assert_eq!(engine.file_features().map(|f| f.bpm), Some(98));
    // The chunked path is untouched by one-shot analysis.
    assert!(engine.chunk_features().is_none());
}

#[test]
fn engine_requires_a_feature_engine() {
    let err = CadenzaEngine::builder().build().unwrap_err();
    assert!(matches!(err, cadenza::Error::Config(_)));
}

#[test]
fn emotion_analysis_requires_a_bridge_config() {
    let engine = CadenzaEngine::builder()
        .feature_engine(stub_factory())
        .build()
        .unwrap();
    assert!(matches!(
        engine.start_emotion_analysis(),
        Err(cadenza::Error::Config(_))
    ));
}

#[derive(Default)]
struct RecordingSink {
    calls: Mutex<Vec<(bool, u8)>>,
}

impl NoteSink for RecordingSink {
    fn note_on(&self, note: u8, _velocity: u8) {
        self.calls.lock().unwrap().push((true, note));
    }
    fn note_off(&self, note: u8) {
        self.calls.lock().unwrap().push((false, note));
    }
}

#[test]
fn playback_fires_and_stop_cancels() {
    let engine = CadenzaEngine::builder()
        .feature_engine(stub_factory())
        .build()
        .unwrap();

    let sink = Arc::new(RecordingSink::default());
    let notes = [NoteEvent {
        note: 60,
        start_secs: 0.0,
        duration_secs: 0.05,
        velocity: 100,
    }];
    engine.play_notes(&notes, sink.clone());
    std::thread::sleep(Duration::from_millis(500));
    assert_eq!(
        sink.calls.lock().unwrap().as_slice(),
        &[(true, 60), (false, 60)]
    );

    // Cancelling before anything fires yields silence.
    let silent = Arc::new(RecordingSink::default());
    let far_notes = [NoteEvent {
        note: 72,
        start_secs: 2.0,
        duration_secs: 0.5,
        velocity: 100,
    }];
    engine.play_notes(&far_notes, silent.clone());
    engine.stop_playback();
    std::thread::sleep(Duration::from_millis(100));
    assert!(silent.calls.lock().unwrap().is_empty());
}

#[test]
fn emotion_frames_reach_the_external_process() {
    init_tracing();
    // The "external process" is a bash echo loop: every submitted line comes
    // straight back, so the file reference the bridge wrote is observable.
    let mut script = tempfile::NamedTempFile::new().unwrap();
    writeln!(script, "while IFS= read -r line; do echo \"$line\"; done").unwrap();

    let engine = CadenzaEngine::builder()
        .sample_rate(1000)
        .analysis(AnalysisConfig {
            window_secs: 0.05,
            target_sample_rate: 22050,
        })
        .emotion_window_secs(0.2)
        .bridge(BridgeConfig::new("bash", script.path()).expected_version("bash"))
        .feature_engine(stub_factory())
        .build()
        .unwrap();

    engine.start_emotion_analysis().unwrap();
    let events = engine.events();
    let mut tap = engine.take_capture_tap().unwrap();

    // Phase 1: seal a feature window so frames have bpm/key attached.
    for _ in 0..3 {
        render_quantum(&mut tap, 20);
    }
    wait_for_event(&events, |e| matches!(e, EngineEvent::ChunkFeatures(_)));

    // Phase 2: fill the 200-sample emotion window.
    for _ in 0..12 {
        render_quantum(&mut tap, 20);
    }

    let event = wait_for_event(&events, |e| matches!(e, EngineEvent::BridgeResponse(_)));
    let EngineEvent::BridgeResponse(value) = event else {
        unreachable!()
    };
    let path = value["filePath"].as_str().expect("frame file reference");
    let staged: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(staged["sampleRate"], 1000);
    assert_eq!(staged["bpm"], 98);
    assert_eq!(staged["key"], "D minor");
    assert!(staged["totalSamples"].as_u64().unwrap() >= 200);
    let _ = std::fs::remove_file(path);

    engine.stop_emotion_analysis();
}
