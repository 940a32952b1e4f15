//! Active non-note parameters: per-note [`MetaContext`] snapshots, the
//! global context timeline read from the first track, and [`SongMeta`].

use crate::classify::is_music_control_event;
use crate::event::{KeySignature, MidiEvent, TimeSignature, TimedEvent};
use crate::note::Tick;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Song-level metadata copied into the output file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongMeta {
    pub format: u16,
    /// Ticks per quarter note.
    pub resolution: u16,
    pub key_signature: Option<KeySignature>,
    pub time_signature: Option<TimeSignature>,
    /// Absolute tick -> microseconds per beat.
    pub tempo_map: BTreeMap<Tick, u32>,
}

impl Default for SongMeta {
    fn default() -> Self {
        Self {
            format: 1,
            resolution: crate::event::DEFAULT_RESOLUTION,
            key_signature: None,
            time_signature: None,
            tempo_map: BTreeMap::new(),
        }
    }
}

impl SongMeta {
    /// Read the song-wide events of the first track. A later key or time
    /// signature replaces an earlier one; every tempo change lands in the
    /// tempo map.
    pub fn from_meta_track(format: u16, resolution: u16, events: &[TimedEvent]) -> Self {
        let mut meta = SongMeta {
            format,
            resolution,
            ..SongMeta::default()
        };

        let mut tick: Tick = 0;
        for timed in events {
            tick += timed.delta as Tick;
            match &timed.event {
                MidiEvent::KeySignature(key) => {
                    meta.key_signature = Some(*key);
                }
                MidiEvent::TimeSignature(ts) => {
                    meta.time_signature = Some(*ts);
                }
                MidiEvent::Tempo(usec) => {
                    meta.tempo_map.insert(tick, *usec);
                }
                _ => {}
            }
        }
        meta
    }

    /// Song-wide events for the output meta track.
    pub fn meta_events(&self) -> Vec<MidiEvent> {
        let mut events = Vec::new();
        if let Some(key) = self.key_signature {
            events.push(MidiEvent::KeySignature(key));
        }
        if let Some(ts) = self.time_signature {
            events.push(MidiEvent::TimeSignature(ts));
        }
        events
    }
}

/// Snapshot of the non-note parameters active at some tick.
///
/// Every field is optional: an unset field means "nothing seen yet", which
/// matters for [`update_from_context`](Self::update_from_context) layering.
/// `Clone` is a full deep copy, so a snapshot captured by a note is never
/// affected by later changes to the accumulator it was cloned from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaContext {
    pub time_signature: Option<TimeSignature>,
    pub tempo: Option<u32>,
    pub key_signature: Option<KeySignature>,
    /// Controller number -> value. Controllers are tracked independently.
    pub controls: BTreeMap<u8, u8>,
    pub port: Option<u8>,
    pub program: Option<u8>,
    /// Channel of the last absorbed channel event, used when re-emitting.
    pub channel: Option<u8>,
}

impl MetaContext {
    pub fn is_empty(&self) -> bool {
        *self == MetaContext::default()
    }

    /// Absorb one event. Returns false for anything that is not a music
    /// control event, leaving the context untouched.
    pub fn update_from_event(&mut self, event: &MidiEvent) -> bool {
        if !is_music_control_event(event) {
            return false;
        }

        match event {
            MidiEvent::Tempo(usec) => self.tempo = Some(*usec),
            MidiEvent::KeySignature(key) => self.key_signature = Some(*key),
            MidiEvent::TimeSignature(ts) => self.time_signature = Some(*ts),
            MidiEvent::ControlChange {
                channel,
                controller,
                value,
            } => {
                self.controls.insert(*controller, *value);
                self.channel = Some(*channel);
            }
            MidiEvent::ProgramChange { channel, program } => {
                self.program = Some(*program);
                self.channel = Some(*channel);
            }
            MidiEvent::Port(port) => self.port = Some(*port),
            _ => return false,
        }
        true
    }

    /// Overlay `other` onto this context: fields set in `other` win, unset
    /// fields leave ours alone. Controllers overlay key by key.
    pub fn update_from_context(&mut self, other: &MetaContext) {
        if other.time_signature.is_some() {
            self.time_signature = other.time_signature;
        }
        if other.tempo.is_some() {
            self.tempo = other.tempo;
        }
        if other.key_signature.is_some() {
            self.key_signature = other.key_signature;
        }
        for (controller, value) in &other.controls {
            self.controls.insert(*controller, *value);
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.program.is_some() {
            self.program = other.program;
        }
        if other.channel.is_some() {
            self.channel = other.channel;
        }
    }

    /// Events that move a player from this context to `next`: one event per
    /// field that is set in `next` and differs here.
    pub fn diff(&self, next: &MetaContext) -> Vec<MidiEvent> {
        let channel = next.channel.or(self.channel).unwrap_or(0);
        let mut events = Vec::new();

        if let Some(ts) = next.time_signature.filter(|ts| self.time_signature != Some(*ts)) {
            events.push(MidiEvent::TimeSignature(ts));
        }
        if let Some(key) = next.key_signature.filter(|k| self.key_signature != Some(*k)) {
            events.push(MidiEvent::KeySignature(key));
        }
        if let Some(usec) = next.tempo.filter(|t| self.tempo != Some(*t)) {
            events.push(MidiEvent::Tempo(usec));
        }
        if let Some(port) = next.port.filter(|p| self.port != Some(*p)) {
            events.push(MidiEvent::Port(port));
        }
        if let Some(program) = next.program.filter(|p| self.program != Some(*p)) {
            events.push(MidiEvent::ProgramChange { channel, program });
        }
        for (controller, value) in &next.controls {
            if self.controls.get(controller) != Some(value) {
                events.push(MidiEvent::ControlChange {
                    channel,
                    controller: *controller,
                    value: *value,
                });
            }
        }

        events
    }
}

/// Global contexts read from the first track, one snapshot per tick at which
/// a music control event occurred. Ticks are strictly increasing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextTimeline {
    entries: Vec<(Tick, MetaContext)>,
}

impl ContextTimeline {
    pub fn from_events(events: &[TimedEvent]) -> Self {
        let mut timeline = ContextTimeline::default();
        let mut tick: Tick = 0;
        for timed in events {
            tick += timed.delta as Tick;
            timeline.record(tick, &timed.event);
        }
        timeline
    }

    /// Record an event at `tick`. Ticks must not go backwards.
    pub fn record(&mut self, tick: Tick, event: &MidiEvent) {
        if !is_music_control_event(event) {
            return;
        }

        match self.entries.last_mut() {
            Some((last_tick, context)) if *last_tick == tick => {
                context.update_from_event(event);
            }
            _ => {
                let mut context = self
                    .entries
                    .last()
                    .map(|(_, c)| c.clone())
                    .unwrap_or_default();
                context.update_from_event(event);
                self.entries.push((tick, context));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Context in effect at `tick`, if any snapshot has started by then.
    pub fn context_at(&self, tick: Tick) -> Option<&MetaContext> {
        let idx = self.entries.partition_point(|(t, _)| *t <= tick);
        idx.checked_sub(1).map(|i| &self.entries[i].1)
    }

    pub fn tracker(&self) -> ContextTracker<'_> {
        ContextTracker {
            timeline: self,
            next: 0,
        }
    }
}

/// Forward-only cursor over a [`ContextTimeline`].
///
/// Track ticks only grow, so the cursor never moves backwards.
#[derive(Debug)]
pub struct ContextTracker<'a> {
    timeline: &'a ContextTimeline,
    next: usize,
}

impl<'a> ContextTracker<'a> {
    /// Advance to `tick`. Returns the newest snapshot passed on the way, or
    /// `None` when no new global snapshot became active since the last call.
    pub fn advance_to(&mut self, tick: Tick) -> Option<&'a MetaContext> {
        let entries = &self.timeline.entries;
        let mut latest = None;
        while self.next < entries.len() && entries[self.next].0 <= tick {
            latest = Some(&entries[self.next].1);
            self.next += 1;
        }
        latest
    }
}
