//! # Cadenza MIDI
//!
//! Converts Standard MIDI Files into absolute-time note events and replays
//! them in real time:
//! - **TempoMap**: merged, tick-sorted tempo changes scanned from every track
//! - **Score**: parsed file with note-on/off pairs resolved to seconds
//! - **EventScheduler**: a min-heap of pending fires driven by one re-arming
//!   thread, cancelable as a unit
//!
//! Parsing uses the `midly` crate and converts SMF events to our internal
//! `NoteEvent` representation.

pub mod error;
pub mod note;
pub mod scheduler;
pub mod score;

pub use error::{Error, Result};
pub use note::NoteEvent;
pub use scheduler::{EventScheduler, NoteSink, PlaybackHandle};
pub use score::{notes_for_track, Score, TempoChange, TempoMap};
