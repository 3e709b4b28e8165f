//! Score loading: SMF parsing, tempo resolution, note pairing.
//!
//! Tempo changes are scanned from every track up front and merged into one
//! tick-sorted map; each track is then walked once against that map to
//! resolve tick times into absolute seconds.

use crate::error::{Error, Result};
use crate::note::NoteEvent;
use midly::{MetaMessage, MidiMessage, Smf, Timing, Track, TrackEventKind};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// One tempo change at an absolute tick position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempoChange {
    pub tick: u64,
    pub us_per_beat: u32,
}

/// Merged, tick-sorted tempo changes for a whole file.
///
/// Shared read-only across all tracks during conversion.
#[derive(Debug, Clone, Default)]
pub struct TempoMap {
    changes: Vec<TempoChange>,
}

impl TempoMap {
    /// Tempo in effect before the first change: 120 BPM.
    pub const DEFAULT_US_PER_BEAT: u32 = 500_000;

    /// Scan every track's delta times once, recording each tempo meta event
    /// at its absolute tick. Changes are stable-sorted by tick, so ties keep
    /// encounter order.
    pub fn build(tracks: &[Track]) -> Self {
        let mut changes = Vec::new();
        for track in tracks {
            let mut tick = 0u64;
            for event in track {
                tick += u64::from(event.delta.as_int());
                if let TrackEventKind::Meta(MetaMessage::Tempo(us_per_beat)) = event.kind {
                    changes.push(TempoChange {
                        tick,
                        us_per_beat: us_per_beat.as_int(),
                    });
                }
            }
        }
        changes.sort_by_key(|c| c.tick);
        Self { changes }
    }

    pub fn changes(&self) -> &[TempoChange] {
        &self.changes
    }
}

fn seconds_per_tick(us_per_beat: u32, ticks_per_beat: u16) -> f64 {
    us_per_beat as f64 / 1_000_000.0 / ticks_per_beat as f64
}

/// Pair a single track's note-ons and note-offs into absolute-time notes.
///
/// The walk keeps an elapsed-seconds accumulator and a pointer into the tempo
/// map; every tempo change reached is folded into the accumulator using the
/// tempo active *before* it, then becomes the active tempo.
///
/// Pairing rules:
/// - a note-on with velocity 0 counts as a note-off (running-status shorthand)
/// - a second note-on for a pitch still open replaces the pending one: last
///   note-on wins
/// - a note-on never closed by end of track is discarded
pub fn notes_for_track(
    track: &Track,
    tempo_map: &TempoMap,
    ticks_per_beat: u16,
) -> Vec<NoteEvent> {
    let changes = tempo_map.changes();
    let mut next_change = 0usize;
    let mut us_per_beat = TempoMap::DEFAULT_US_PER_BEAT;
    let mut elapsed_secs = 0.0f64;
    let mut last_tempo_tick = 0u64;

    let mut tick = 0u64;
    let mut open: HashMap<u8, (f64, u8)> = HashMap::new();
    let mut notes = Vec::new();

    for event in track {
        tick += u64::from(event.delta.as_int());

        while next_change < changes.len() && changes[next_change].tick <= tick {
            let change = changes[next_change];
            elapsed_secs += (change.tick - last_tempo_tick) as f64
                * seconds_per_tick(us_per_beat, ticks_per_beat);
            last_tempo_tick = change.tick;
            us_per_beat = change.us_per_beat;
            next_change += 1;
        }

        let time_secs = elapsed_secs
            + (tick - last_tempo_tick) as f64 * seconds_per_tick(us_per_beat, ticks_per_beat);

        if let TrackEventKind::Midi { message, .. } = event.kind {
            match message {
                MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                    open.insert(key.as_int(), (time_secs, vel.as_int()));
                }
                MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                    if let Some((start_secs, velocity)) = open.remove(&key.as_int()) {
                        notes.push(NoteEvent {
                            note: key.as_int(),
                            start_secs,
                            duration_secs: time_secs - start_secs,
                            velocity,
                        });
                    }
                }
                _ => {}
            }
        }
    }

    notes
}

/// A parsed MIDI file with every note resolved to seconds.
#[derive(Debug, Clone)]
pub struct Score {
    /// All notes across all tracks, sorted by onset.
    pub notes: Vec<NoteEvent>,
    /// Ticks per quarter note.
    pub ticks_per_beat: u16,
    /// Time of the last note-off, in seconds.
    pub duration_secs: f64,
}

impl Score {
    /// Load and parse a MIDI file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        Self::parse(&data)
    }

    /// Parse a MIDI file from bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let smf = Smf::parse(data)?;

        let ticks_per_beat = match smf.header.timing {
            Timing::Metrical(tpb) => tpb.as_int(),
            Timing::Timecode(_, _) => return Err(Error::UnsupportedTiming),
        };

        let tempo_map = TempoMap::build(&smf.tracks);
        debug!(
            tracks = smf.tracks.len(),
            ticks_per_beat,
            tempo_changes = tempo_map.changes().len(),
            "parsing MIDI file"
        );

        let mut notes: Vec<NoteEvent> = smf
            .tracks
            .iter()
            .flat_map(|track| notes_for_track(track, &tempo_map, ticks_per_beat))
            .collect();
        notes.sort_by(|a, b| {
            a.start_secs
                .partial_cmp(&b.start_secs)
                .expect("note times are never NaN")
        });

        let duration_secs = notes.iter().map(NoteEvent::end_secs).fold(0.0, f64::max);
        debug!(notes = notes.len(), duration_secs, "parsed MIDI file");

        Ok(Self {
            notes,
            ticks_per_beat,
            duration_secs,
        })
    }
}
