//! Turns generated sound events back into timed MIDI events.
//!
//! A cursor starts at tick 0. Each sound event puts its note-ons at the
//! cursor and each note-off `duration` ticks later, re-emits whatever
//! controls changed since the previous sound event, and then moves the cursor
//! by the shortest pause-to-next of its notes.

use crate::event::{MidiEvent, TimedEvent};
use crate::frame::FrameComponent;
use crate::generator::{GeneratedPart, GeneratedTranscript};
use crate::gm;
use crate::meta::{MetaContext, SongMeta};
use crate::ngram::Voice;
use crate::note::Tick;
use std::collections::BTreeMap;
use tracing::debug;

/// Events of one output track keyed by absolute tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduledTrack {
    pub name: String,
    events: BTreeMap<Tick, Vec<MidiEvent>>,
}

impl ScheduledTrack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            events: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, tick: Tick, event: MidiEvent) {
        self.events.entry(tick).or_default().push(event);
    }

    pub fn events_at(&self, tick: Tick) -> &[MidiEvent] {
        self.events.get(&tick).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn ticks(&self) -> impl Iterator<Item = Tick> + '_ {
        self.events.keys().copied()
    }

    pub fn last_tick(&self) -> Tick {
        self.events.keys().next_back().copied().unwrap_or(0)
    }

    /// Absolute events flattened into a delta-time stream ending in
    /// end-of-track. Within a tick, controls come first, then note-offs,
    /// then note-ons.
    pub fn to_delta_events(&self) -> Vec<TimedEvent> {
        let mut out = Vec::new();
        out.push(TimedEvent::new(0, MidiEvent::TrackName(self.name.clone())));

        let mut last: Tick = 0;
        for (tick, events) in &self.events {
            let mut ordered: Vec<&MidiEvent> = events.iter().collect();
            ordered.sort_by_key(|e| rank(e));
            for event in ordered {
                let delta = (tick - last).min(u32::MAX as Tick) as u32;
                out.push(TimedEvent::new(delta, event.clone()));
                last = *tick;
            }
        }

        out.push(TimedEvent::new(0, MidiEvent::EndOfTrack));
        out
    }
}

fn rank(event: &MidiEvent) -> u8 {
    match event {
        MidiEvent::NoteOff { .. } => 1,
        MidiEvent::NoteOn { velocity: 0, .. } => 1,
        MidiEvent::NoteOn { .. } => 2,
        _ => 0,
    }
}

/// Keep only what a player needs to re-hear: tempo, controllers, program,
/// port. Signatures stay in the song meta track.
fn replayable(event: &MidiEvent, mixed: bool) -> bool {
    match event {
        MidiEvent::Tempo(_) | MidiEvent::ControlChange { .. } | MidiEvent::Port(_) => true,
        // Mixed tracks fix one program per channel up front.
        MidiEvent::ProgramChange { .. } => !mixed,
        _ => false,
    }
}

/// Programs for a mixed part: each channel's first captured program, or the
/// part's instrument on its own channel, or piano.
fn mixed_programs(part: &GeneratedPart) -> BTreeMap<u8, u8> {
    let mut programs: BTreeMap<u8, Option<u8>> = BTreeMap::new();
    for component in &part.components {
        for note in component.sound_event().notes() {
            let slot = programs.entry(note.channel).or_insert(None);
            if slot.is_none() {
                *slot = note.meta_context.program;
            }
        }
    }
    programs
        .into_iter()
        .map(|(channel, program)| {
            let fallback = if channel == part.channel {
                part.instrument
            } else {
                gm::PIANO
            };
            (channel, program.unwrap_or(fallback))
        })
        .collect()
}

/// Schedule one generated voice.
pub fn schedule_part(part: &GeneratedPart) -> ScheduledTrack {
    let mixed = part.voice == Voice::Mixed;
    let name = match part.voice {
        Voice::Instrument(program) => gm::program_name(program).to_string(),
        Voice::Mixed => "Mixed".to_string(),
    };
    let mut track = ScheduledTrack::new(name);

    let mut current = MetaContext::default();
    if mixed {
        for (channel, program) in mixed_programs(part) {
            track.push(0, MidiEvent::ProgramChange { channel, program });
        }
    } else {
        track.push(
            0,
            MidiEvent::ProgramChange {
                channel: part.channel,
                program: part.instrument,
            },
        );
        current.program = Some(part.instrument);
    }

    let mut cursor: Tick = 0;
    for component in &part.components {
        schedule_component(&mut track, &mut current, component, cursor, part, mixed);
        cursor += component.pause_to_next();
    }

    debug!(
        voice = ?part.voice,
        sound_events = part.components.len(),
        end = track.last_tick(),
        "scheduled part"
    );
    track
}

fn schedule_component(
    track: &mut ScheduledTrack,
    current: &mut MetaContext,
    component: &FrameComponent,
    cursor: Tick,
    part: &GeneratedPart,
    mixed: bool,
) {
    let event = component.sound_event();

    if let Some(context) = event.meta_context() {
        for change in current.diff(context) {
            if !replayable(&change, mixed) {
                continue;
            }
            let change = if mixed {
                change
            } else {
                change.on_channel(part.channel)
            };
            track.push(cursor, change);
        }
        current.update_from_context(context);
    }

    for note in event.notes() {
        let channel = if mixed { note.channel } else { part.channel };
        track.push(
            cursor,
            MidiEvent::NoteOn {
                channel,
                pitch: note.pitch,
                velocity: note.velocity.max(1),
            },
        );
        track.push(
            cursor + note.duration.max(1),
            MidiEvent::NoteOff {
                channel,
                pitch: note.pitch,
                velocity: 0,
            },
        );
    }
}

/// Everything the writer needs for one output file.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternSchedule {
    pub meta: SongMeta,
    pub tracks: Vec<ScheduledTrack>,
}

impl PatternSchedule {
    /// Song meta track: key signature, time signature, end of track.
    pub fn meta_track(&self) -> Vec<TimedEvent> {
        let mut events: Vec<TimedEvent> = self
            .meta
            .meta_events()
            .into_iter()
            .map(|e| TimedEvent::new(0, e))
            .collect();
        events.push(TimedEvent::new(0, MidiEvent::EndOfTrack));
        events
    }
}

pub fn schedule(generated: &GeneratedTranscript) -> PatternSchedule {
    PatternSchedule {
        meta: generated.meta.clone(),
        tracks: generated.parts.iter().map(schedule_part).collect(),
    }
}
