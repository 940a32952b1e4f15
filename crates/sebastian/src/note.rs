use crate::meta::MetaContext;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Absolute time in MIDI ticks from the start of the song.
pub type Tick = u64;

/// Identity of a note for counting purposes: duration first, then pitch.
///
/// Channel is constant within a validated track and velocity is payload, so
/// neither takes part in equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NoteKey {
    pub duration: Tick,
    pub pitch: u8,
}

/// A single played pitch with resolved timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub start_time: Tick,
    pub duration: Tick,
    pub pitch: u8,
    pub velocity: u8,
    pub channel: u8,
    /// Ticks back to the previous sound event in the same track.
    pub pause_to_previous_note: Tick,
    /// Ticks forward to the next sound event in the same track.
    pub pause_to_next_note: Tick,
    /// Effective context when the note started.
    pub meta_context: MetaContext,
}

impl Note {
    pub fn new(start_time: Tick, pitch: u8, velocity: u8, channel: u8) -> Self {
        Self {
            start_time,
            duration: 0,
            pitch,
            velocity,
            channel,
            pause_to_previous_note: 0,
            pause_to_next_note: 0,
            meta_context: MetaContext::default(),
        }
    }

    pub fn with_context(mut self, meta_context: MetaContext) -> Self {
        self.meta_context = meta_context;
        self
    }

    pub fn with_duration(mut self, duration: Tick) -> Self {
        self.duration = duration;
        self
    }

    pub fn key(&self) -> NoteKey {
        NoteKey {
            duration: self.duration,
            pitch: self.pitch,
        }
    }

    pub fn end_time(&self) -> Tick {
        self.start_time + self.duration
    }
}

/// Notes sharing one start tick within a track: a single note or a chord.
///
/// Immutable once built. Notes are kept in canonical order (by [`NoteKey`],
/// then channel and velocity), and equality and hashing look only at the
/// sorted keys, so the same chord compares equal whatever order its notes
/// were added in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoundEvent {
    start_time: Tick,
    notes: Vec<Note>,
    keys: Vec<NoteKey>,
}

impl SoundEvent {
    pub fn start_time(&self) -> Tick {
        self.start_time
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn keys(&self) -> &[NoteKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn is_chord(&self) -> bool {
        self.notes.len() > 1
    }

    pub fn shortest_pause_to_next_note(&self) -> Tick {
        self.notes
            .iter()
            .map(|n| n.pause_to_next_note)
            .min()
            .unwrap_or(0)
    }

    pub fn pause_to_previous_note(&self) -> Tick {
        self.notes
            .iter()
            .map(|n| n.pause_to_previous_note)
            .min()
            .unwrap_or(0)
    }

    pub fn longest_duration(&self) -> Tick {
        self.notes.iter().map(|n| n.duration).max().unwrap_or(0)
    }

    /// Context captured by the first note in canonical order.
    pub fn meta_context(&self) -> Option<&MetaContext> {
        self.notes.first().map(|n| &n.meta_context)
    }

    pub fn channel(&self) -> Option<u8> {
        self.notes.first().map(|n| n.channel)
    }

    /// Copy with new neighbour pauses on every note.
    pub fn with_pauses(&self, previous: Tick, next: Tick) -> SoundEvent {
        let notes = self
            .notes
            .iter()
            .map(|note| Note {
                pause_to_previous_note: previous,
                pause_to_next_note: next,
                ..note.clone()
            })
            .collect();
        SoundEvent {
            start_time: self.start_time,
            notes,
            keys: self.keys.clone(),
        }
    }

    /// Copy moved to another start tick.
    pub fn at(&self, start_time: Tick) -> SoundEvent {
        let notes = self
            .notes
            .iter()
            .map(|note| Note {
                start_time,
                ..note.clone()
            })
            .collect();
        SoundEvent {
            start_time,
            notes,
            keys: self.keys.clone(),
        }
    }
}

impl PartialEq for SoundEvent {
    fn eq(&self, other: &Self) -> bool {
        self.keys == other.keys
    }
}

impl Eq for SoundEvent {}

impl Hash for SoundEvent {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.keys.hash(state);
    }
}

/// Collects notes for one tick while a track is being read.
#[derive(Debug, Clone)]
pub struct SoundEventBuilder {
    start_time: Tick,
    notes: Vec<Note>,
}

impl SoundEventBuilder {
    pub fn new(start_time: Tick) -> Self {
        Self {
            start_time,
            notes: Vec::new(),
        }
    }

    pub fn start_time(&self) -> Tick {
        self.start_time
    }

    /// Add a note; its start time is pinned to the builder's tick.
    pub fn push(&mut self, mut note: Note) {
        note.start_time = self.start_time;
        self.notes.push(note);
    }

    pub fn extend(&mut self, notes: impl IntoIterator<Item = Note>) {
        for note in notes {
            self.push(note);
        }
    }

    /// Most recently added note with this pitch.
    pub fn note_mut(&mut self, pitch: u8) -> Option<&mut Note> {
        self.notes.iter_mut().rev().find(|n| n.pitch == pitch)
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn finalize(mut self) -> SoundEvent {
        self.notes.sort_by_key(|n| (n.key(), n.channel, n.velocity));
        let keys = self.notes.iter().map(Note::key).collect();
        SoundEvent {
            start_time: self.start_time,
            notes: self.notes,
            keys,
        }
    }
}

impl From<&SoundEvent> for SoundEventBuilder {
    fn from(event: &SoundEvent) -> Self {
        Self {
            start_time: event.start_time,
            notes: event.notes.clone(),
        }
    }
}
