//! In-memory SMF fixtures for integration tests.

#![allow(dead_code)]

use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use std::path::{Path, PathBuf};

/// One note track of a fixture file.
pub struct Part {
    pub channel: u8,
    pub program: Option<u8>,
    /// (start tick, pitch, duration)
    pub notes: Vec<(u32, u8, u32)>,
}

impl Part {
    pub fn new(channel: u8, program: Option<u8>, notes: Vec<(u32, u8, u32)>) -> Self {
        Self {
            channel,
            program,
            notes,
        }
    }

    /// Back-to-back notes of equal length starting at tick 0.
    pub fn melody(channel: u8, program: Option<u8>, pitches: &[u8], length: u32) -> Self {
        let notes = pitches
            .iter()
            .enumerate()
            .map(|(i, p)| (i as u32 * length, *p, length))
            .collect();
        Self::new(channel, program, notes)
    }
}

fn meta(kind: MetaMessage<'static>) -> TrackEventKind<'static> {
    TrackEventKind::Meta(kind)
}

fn midi(channel: u8, message: MidiMessage) -> TrackEventKind<'static> {
    TrackEventKind::Midi {
        channel: u4::new(channel),
        message,
    }
}

fn to_track(mut events: Vec<(u32, u8, TrackEventKind<'static>)>) -> Vec<TrackEvent<'static>> {
    // (tick, order within tick, kind)
    events.sort_by_key(|(tick, order, _)| (*tick, *order));
    let mut last = 0;
    let mut track: Vec<TrackEvent<'static>> = events
        .into_iter()
        .map(|(tick, _, kind)| {
            let delta = tick - last;
            last = tick;
            TrackEvent {
                delta: u28::new(delta),
                kind,
            }
        })
        .collect();
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: meta(MetaMessage::EndOfTrack),
    });
    track
}

/// A format 1 file: a meta track (4/4, one sharp, `tempo`) and one track per part.
pub fn smf_bytes(resolution: u16, tempo: u32, parts: &[Part]) -> Vec<u8> {
    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(resolution)),
    ));

    smf.tracks.push(to_track(vec![
        (0, 0, meta(MetaMessage::TimeSignature(4, 2, 24, 8))),
        (0, 0, meta(MetaMessage::KeySignature(1, false))),
        (0, 0, meta(MetaMessage::Tempo(u24::new(tempo)))),
    ]));

    for part in parts {
        let mut events = Vec::new();
        if let Some(program) = part.program {
            events.push((
                0,
                0,
                midi(
                    part.channel,
                    MidiMessage::ProgramChange {
                        program: u7::new(program),
                    },
                ),
            ));
        }
        for (start, pitch, duration) in &part.notes {
            events.push((
                *start,
                2,
                midi(
                    part.channel,
                    MidiMessage::NoteOn {
                        key: u7::new(*pitch),
                        vel: u7::new(96),
                    },
                ),
            ));
            events.push((
                start + duration,
                1,
                midi(
                    part.channel,
                    MidiMessage::NoteOff {
                        key: u7::new(*pitch),
                        vel: u7::new(0),
                    },
                ),
            ));
        }
        smf.tracks.push(to_track(events));
    }

    let mut bytes = Vec::new();
    smf.write(&mut bytes).unwrap();
    bytes
}

pub fn write_fixture(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Note-ons with velocity > 0 as (absolute tick, channel, pitch).
pub fn note_ons(track: &[TrackEvent<'_>]) -> Vec<(u64, u8, u8)> {
    let mut tick = 0u64;
    let mut out = Vec::new();
    for event in track {
        tick += event.delta.as_int() as u64;
        if let TrackEventKind::Midi {
            channel,
            message: MidiMessage::NoteOn { key, vel },
        } = event.kind
        {
            if vel.as_int() > 0 {
                out.push((tick, channel.as_int(), key.as_int()));
            }
        }
    }
    out
}
