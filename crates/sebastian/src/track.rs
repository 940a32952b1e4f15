//! Per-instrument timelines of sound events.

use crate::frame::FrameComponent;
use crate::note::{Note, SoundEvent, SoundEventBuilder, Tick};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Accumulates notes for one source track.
///
/// Note durations are only known once the matching note-off arrives, so slots
/// stay open here and are frozen into [`SoundEvent`]s by [`build`](Self::build).
#[derive(Debug, Default)]
pub struct TrackBuilder {
    slots: BTreeMap<Tick, SoundEventBuilder>,
    channel: Option<u8>,
}

impl TrackBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_note(&mut self, note: Note) {
        self.channel.get_or_insert(note.channel);
        self.slots
            .entry(note.start_time)
            .or_insert_with(|| SoundEventBuilder::new(note.start_time))
            .push(note);
    }

    /// Set the duration of the latest note with `pitch` started at `start`.
    /// Returns false if no such note exists.
    pub fn set_note_duration(&mut self, start: Tick, pitch: u8, duration: Tick) -> bool {
        match self.slots.get_mut(&start).and_then(|slot| slot.note_mut(pitch)) {
            Some(note) => {
                note.duration = duration;
                true
            }
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Channel of the first note added.
    pub fn channel(&self) -> Option<u8> {
        self.channel
    }

    pub fn build(self, instrument: u8) -> Track {
        let channel = self.channel.unwrap_or(0);
        Track::from_slots(instrument, channel, self.slots)
    }
}

/// One instrument's time-ordered sound events.
///
/// Ticks are strictly increasing and every note carries pauses consistent
/// with its neighbours: for adjacent events at `t1 < t2`, notes at `t1` have
/// `pause_to_next_note == t2 - t1` and notes at `t2` have
/// `pause_to_previous_note == t2 - t1`. The first event's previous pause is
/// zero and the last event's next pause is its longest note duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    instrument: u8,
    channel: u8,
    events: BTreeMap<Tick, SoundEvent>,
}

impl Track {
    fn from_slots(instrument: u8, channel: u8, slots: BTreeMap<Tick, SoundEventBuilder>) -> Self {
        let finalized: Vec<(Tick, SoundEvent)> = slots
            .into_iter()
            .filter(|(_, slot)| !slot.is_empty())
            .map(|(tick, slot)| (tick, slot.finalize()))
            .collect();

        let mut events = BTreeMap::new();
        for (i, (tick, event)) in finalized.iter().enumerate() {
            let previous = if i == 0 { 0 } else { tick - finalized[i - 1].0 };
            let next = match finalized.get(i + 1) {
                Some((next_tick, _)) => next_tick - tick,
                None => event.longest_duration(),
            };
            events.insert(*tick, event.with_pauses(previous, next));
        }

        Self {
            instrument,
            channel,
            events,
        }
    }

    pub fn instrument(&self) -> u8 {
        self.instrument
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Start ticks in ascending order.
    pub fn times(&self) -> impl Iterator<Item = Tick> + '_ {
        self.events.keys().copied()
    }

    pub fn sound_events(&self) -> impl Iterator<Item = &SoundEvent> + '_ {
        self.events.values()
    }

    pub fn sound_event_at(&self, tick: Tick) -> Option<&SoundEvent> {
        self.events.get(&tick)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn note_count(&self) -> usize {
        self.events.values().map(SoundEvent::len).sum()
    }

    pub fn chord_count(&self) -> usize {
        self.events.values().filter(|e| e.is_chord()).count()
    }

    /// First start tick and last note end, or `None` for an empty track.
    pub fn span(&self) -> Option<(Tick, Tick)> {
        let first = *self.events.keys().next()?;
        let end = self
            .events
            .values()
            .flat_map(|e| e.notes().iter().map(Note::end_time))
            .max()
            .unwrap_or(first);
        Some((first, end))
    }

    /// Merge another track of the same instrument into a new track.
    ///
    /// Walks both tick lists together: ticks present in one source are
    /// copied across, ticks present in both get the union of their notes.
    /// Pauses are recomputed for the merged timeline. The channel of `self`
    /// wins.
    pub fn merge(&self, other: &Track) -> Track {
        let mut slots: BTreeMap<Tick, SoundEventBuilder> = BTreeMap::new();
        let mut left = self.events.iter().peekable();
        let mut right = other.events.iter().peekable();

        loop {
            let (tick, sources): (Tick, Vec<&SoundEvent>) = match (left.peek(), right.peek()) {
                (Some((lt, le)), Some((rt, re))) => {
                    if lt < rt {
                        let item = (**lt, vec![*le]);
                        left.next();
                        item
                    } else if rt < lt {
                        let item = (**rt, vec![*re]);
                        right.next();
                        item
                    } else {
                        let item = (**lt, vec![*le, *re]);
                        left.next();
                        right.next();
                        item
                    }
                }
                (Some((lt, le)), None) => {
                    let item = (**lt, vec![*le]);
                    left.next();
                    item
                }
                (None, Some((rt, re))) => {
                    let item = (**rt, vec![*re]);
                    right.next();
                    item
                }
                (None, None) => break,
            };

            let slot = slots
                .entry(tick)
                .or_insert_with(|| SoundEventBuilder::new(tick));
            for event in sources {
                slot.extend(event.notes().iter().cloned());
            }
        }

        Track::from_slots(self.instrument, self.channel, slots)
    }

    /// The track as frame components, in time order.
    pub fn frame_components(&self) -> Vec<FrameComponent> {
        self.events
            .values()
            .map(|event| FrameComponent::from_sound_event(event.clone()))
            .collect()
    }
}
