//! Frames: fixed-length runs of consecutive sound events, the n-gram unit.

use crate::note::{SoundEvent, Tick};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A sound event with the tempo active when it started and its neighbour pauses.
///
/// Identity is the sound event's identity. Tempo and pauses are payload taken
/// from whichever occurrence was seen first.
#[derive(Debug, Clone)]
pub struct FrameComponent {
    sound_event: Arc<SoundEvent>,
    tempo: Option<u32>,
    pause_to_previous: Tick,
    pause_to_next: Tick,
}

impl FrameComponent {
    pub fn from_sound_event(sound_event: SoundEvent) -> Self {
        let tempo = sound_event.meta_context().and_then(|c| c.tempo);
        let pause_to_previous = sound_event.pause_to_previous_note();
        let pause_to_next = sound_event.shortest_pause_to_next_note();
        Self {
            sound_event: Arc::new(sound_event),
            tempo,
            pause_to_previous,
            pause_to_next,
        }
    }

    pub fn sound_event(&self) -> &SoundEvent {
        &self.sound_event
    }

    pub fn tempo(&self) -> Option<u32> {
        self.tempo
    }

    pub fn pause_to_previous(&self) -> Tick {
        self.pause_to_previous
    }

    pub fn pause_to_next(&self) -> Tick {
        self.pause_to_next
    }
}

impl PartialEq for FrameComponent {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.sound_event, &other.sound_event) || self.sound_event == other.sound_event
    }
}

impl Eq for FrameComponent {}

impl Hash for FrameComponent {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sound_event.hash(state);
    }
}

/// An ordered tuple of components. Order matters for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frame {
    components: Vec<FrameComponent>,
}

impl Frame {
    pub fn new(components: Vec<FrameComponent>) -> Self {
        Self { components }
    }

    pub fn components(&self) -> &[FrameComponent] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn first(&self) -> Option<&FrameComponent> {
        self.components.first()
    }

    pub fn last(&self) -> Option<&FrameComponent> {
        self.components.last()
    }

    /// Every component after the first.
    pub fn tail(&self) -> &[FrameComponent] {
        self.components.get(1..).unwrap_or(&[])
    }
}

/// Training statistics for one distinct frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    /// Occurrences across all training tracks.
    pub count: u64,
    /// Order of first appearance; breaks count ties.
    pub insertion_index: usize,
}

impl FrameStats {
    pub fn new(insertion_index: usize) -> Self {
        Self {
            count: 0,
            insertion_index,
        }
    }
}
