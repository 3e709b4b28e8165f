//! Timed note playback.
//!
//! One driving thread owns a min-heap of pending fires and re-arms itself for
//! the nearest one; cancellation invalidates everything pending through a
//! single flag + condvar wake.

use crate::note::NoteEvent;
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;

/// Receives note callbacks at their scheduled times.
///
/// The synthesizer contract: implementations must tolerate being called from
/// the scheduler thread.
pub trait NoteSink: Send + Sync {
    fn note_on(&self, note: u8, velocity: u8);
    fn note_off(&self, note: u8);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    NoteOn { velocity: u8 },
    NoteOff,
}

/// One pending timer fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fire {
    at: Duration,
    /// Insertion order; breaks time ties so a zero-length note still fires
    /// on before off.
    seq: u64,
    note: u8,
    action: Action,
}

// BinaryHeap is a max-heap; invert so the earliest fire is on top.
impl Ord for Fire {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Fire {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

struct Shared {
    cancelled: Mutex<bool>,
    wake: Condvar,
}

/// Schedules note events for real-time replay.
pub struct EventScheduler;

impl EventScheduler {
    /// Start replaying `notes` against `sink`, all times relative to now.
    ///
    /// Every note contributes one note-on fire at its onset and one note-off
    /// fire at onset + duration. Fires happen in time order; no reordering or
    /// coalescing beyond that.
    pub fn start(notes: &[NoteEvent], sink: Arc<dyn NoteSink>) -> PlaybackHandle {
        let mut heap = BinaryHeap::with_capacity(notes.len() * 2);
        let mut seq = 0u64;
        for note in notes {
            heap.push(Fire {
                at: Duration::from_secs_f64(note.start_secs.max(0.0)),
                seq,
                note: note.note,
                action: Action::NoteOn {
                    velocity: note.velocity,
                },
            });
            heap.push(Fire {
                at: Duration::from_secs_f64(note.end_secs().max(0.0)),
                seq: seq + 1,
                note: note.note,
                action: Action::NoteOff,
            });
            seq += 2;
        }

        debug!(pending = heap.len(), "starting playback");

        let shared = Arc::new(Shared {
            cancelled: Mutex::new(false),
            wake: Condvar::new(),
        });
        let thread_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("cadenza-scheduler".into())
            .spawn(move || run_timer(heap, thread_shared, sink))
            .expect("failed to spawn scheduler thread");

        PlaybackHandle {
            shared,
            thread: Some(thread),
        }
    }
}

fn run_timer(mut heap: BinaryHeap<Fire>, shared: Arc<Shared>, sink: Arc<dyn NoteSink>) {
    let start = Instant::now();

    loop {
        let fire = {
            let mut cancelled = shared.cancelled.lock();
            loop {
                if *cancelled {
                    return;
                }
                let Some(next) = heap.peek() else {
                    return;
                };
                let now = start.elapsed();
                if next.at <= now {
                    break heap.pop().expect("peeked fire is poppable");
                }
                let wait = next.at - now;
                let _ = shared.wake.wait_for(&mut cancelled, wait);
            }
        };

        // The sink runs outside the lock; it may take its own time without
        // delaying cancellation.
        match fire.action {
            Action::NoteOn { velocity } => sink.note_on(fire.note, velocity),
            Action::NoteOff => sink.note_off(fire.note),
        }
    }
}

/// Cancels every pending fire when dropped or on `cancel()`.
pub struct PlaybackHandle {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl PlaybackHandle {
    /// Invalidate every pending fire. Idempotent.
    pub fn cancel(&self) {
        let mut cancelled = self.shared.cancelled.lock();
        *cancelled = true;
        self.shared.wake.notify_all();
    }

    /// Whether the driving thread is still alive (fires remain pending).
    pub fn is_active(&self) -> bool {
        self.thread
            .as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for PlaybackHandle {
    fn drop(&mut self) {
        self.cancel();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        On(u8, u8),
        Off(u8),
    }

    #[derive(Default)]
    struct RecordingSink {
        calls: StdMutex<Vec<Call>>,
    }

    impl NoteSink for RecordingSink {
        fn note_on(&self, note: u8, velocity: u8) {
            self.calls.lock().unwrap().push(Call::On(note, velocity));
        }
        fn note_off(&self, note: u8) {
            self.calls.lock().unwrap().push(Call::Off(note));
        }
    }

    fn note(note: u8, start_secs: f64, duration_secs: f64) -> NoteEvent {
        NoteEvent {
            note,
            start_secs,
            duration_secs,
            velocity: 100,
        }
    }

    #[test]
    fn cancel_before_first_fire_means_zero_callbacks() {
        let sink = Arc::new(RecordingSink::default());
        let handle = EventScheduler::start(&[note(60, 0.3, 0.1)], sink.clone());

        handle.cancel();
        std::thread::sleep(Duration::from_millis(600));
        assert!(sink.calls.lock().unwrap().is_empty());
        assert!(!handle.is_active());
    }

    #[test]
    fn note_on_fires_before_note_off() {
        let sink = Arc::new(RecordingSink::default());
        let handle = EventScheduler::start(&[note(60, 0.0, 0.05)], sink.clone());

        std::thread::sleep(Duration::from_millis(500));
        drop(handle);
        assert_eq!(
            sink.calls.lock().unwrap().as_slice(),
            &[Call::On(60, 100), Call::Off(60)]
        );
    }

    #[test]
    fn zero_length_note_still_fires_in_order() {
        let sink = Arc::new(RecordingSink::default());
        let handle = EventScheduler::start(&[note(72, 0.0, 0.0)], sink.clone());

        std::thread::sleep(Duration::from_millis(300));
        drop(handle);
        assert_eq!(
            sink.calls.lock().unwrap().as_slice(),
            &[Call::On(72, 100), Call::Off(72)]
        );
    }

    #[test]
    fn fires_follow_time_order_across_notes() {
        let sink = Arc::new(RecordingSink::default());
        let notes = [note(60, 0.0, 0.30), note(64, 0.1, 0.05)];
        let handle = EventScheduler::start(&notes, sink.clone());

        std::thread::sleep(Duration::from_millis(800));
        drop(handle);
        assert_eq!(
            sink.calls.lock().unwrap().as_slice(),
            &[
                Call::On(60, 100),
                Call::On(64, 100),
                Call::Off(64),
                Call::Off(60),
            ]
        );
    }

    #[test]
    fn empty_schedule_finishes_immediately() {
        let sink = Arc::new(RecordingSink::default());
        let handle = EventScheduler::start(&[], sink);
        std::thread::sleep(Duration::from_millis(100));
        assert!(!handle.is_active());
    }

    #[test]
    fn cancel_is_idempotent() {
        let sink = Arc::new(RecordingSink::default());
        let handle = EventScheduler::start(&[note(60, 5.0, 1.0)], sink.clone());
        handle.cancel();
        handle.cancel();
        drop(handle);
        assert!(sink.calls.lock().unwrap().is_empty());
    }
}
