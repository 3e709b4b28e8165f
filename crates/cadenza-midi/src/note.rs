//! Absolute-time note events.

/// One note resolved to wall-clock time: a paired note-on/note-off.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    /// MIDI note number (0-127).
    pub note: u8,
    /// Onset in seconds from the start of the score.
    pub start_secs: f64,
    /// Length in seconds (>= 0).
    pub duration_secs: f64,
    /// Velocity of the opening note-on (1-127).
    pub velocity: u8,
}

impl NoteEvent {
    /// When the matching note-off fires.
    pub fn end_secs(&self) -> f64 {
        self.start_secs + self.duration_secs
    }
}
