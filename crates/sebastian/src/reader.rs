//! Transcript construction: decoded event streams in, tracks of sound
//! events with resolved durations and captured contexts out.

use crate::classify::{has_note_ended, is_music_control_event, is_new_note};
use crate::event::{decode, DecodedSong, MidiEvent, TimedEvent};
use crate::gm;
use crate::meta::{ContextTimeline, MetaContext, SongMeta};
use crate::note::{Note, Tick};
use crate::policy::ValidationPolicy;
use crate::track::{Track, TrackBuilder};
use crate::transcript::Transcript;
use crate::validate::{enforce, first_note_track, offending, validate};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Builds a [`Transcript`] from a decoded song.
#[derive(Debug, Clone, Copy, Default)]
pub struct TranscriptBuilder {
    policy: ValidationPolicy,
}

impl TranscriptBuilder {
    pub fn new(policy: ValidationPolicy) -> Self {
        Self { policy }
    }

    pub fn build(&self, song: &DecodedSong) -> crate::Result<Transcript> {
        enforce(validate(song), self.policy)?;

        let empty = Vec::new();
        let meta_events = song.tracks.first().unwrap_or(&empty);
        let meta = SongMeta::from_meta_track(song.format, song.resolution, meta_events);
        let timeline = ContextTimeline::from_events(meta_events);
        debug!(
            contexts = timeline.len(),
            tempo_changes = meta.tempo_map.len(),
            "read global meta"
        );

        let mut transcript = Transcript::new(meta);
        for (index, events) in song.tracks.iter().enumerate().skip(first_note_track(song)) {
            match read_track(index, events, &timeline) {
                Some(track) => {
                    debug!(
                        track = index,
                        instrument = track.instrument(),
                        channel = track.channel(),
                        sound_events = track.len(),
                        "read track"
                    );
                    transcript.add_track(track);
                }
                None => debug!(track = index, "no notes, skipping track"),
            }
        }

        Ok(transcript)
    }
}

/// Scan one track. Returns `None` when it holds no notes.
fn read_track(index: usize, events: &[TimedEvent], timeline: &ContextTimeline) -> Option<Track> {
    let mut tracker = timeline.tracker();
    let mut local = MetaContext::default();
    let mut open: HashMap<u8, Tick> = HashMap::new();
    let mut builder = TrackBuilder::new();
    let mut channel: Option<u8> = None;
    let mut program: Option<u8> = None;
    let mut tick: Tick = 0;

    for timed in events {
        tick += timed.delta as Tick;

        if let Some(global) = tracker.advance_to(tick) {
            local.update_from_context(global);
        }

        // Already reported by validation; a lenient load drops just this event.
        if offending(index, &timed.event, channel).is_some() {
            continue;
        }
        if channel.is_none() {
            channel = timed.event.channel();
        }

        let event = &timed.event;
        if is_music_control_event(event) {
            local.update_from_event(event);
            if let MidiEvent::ProgramChange { program: p, .. } = event {
                program.get_or_insert(*p);
            }
        } else if is_new_note(event) {
            if let MidiEvent::NoteOn {
                channel: note_channel,
                pitch,
                velocity,
            } = *event
            {
                if let Some(start) = open.remove(&pitch) {
                    debug!(track = index, pitch, tick, "re-triggered open note");
                    builder.set_note_duration(start, pitch, tick - start);
                }
                let note =
                    Note::new(tick, pitch, velocity, note_channel).with_context(local.clone());
                builder.add_note(note);
                open.insert(pitch, tick);
            }
        } else if has_note_ended(event) {
            let pitch = match *event {
                MidiEvent::NoteOn { pitch, .. } | MidiEvent::NoteOff { pitch, .. } => pitch,
                _ => continue,
            };
            match open.remove(&pitch) {
                Some(start) => {
                    builder.set_note_duration(start, pitch, tick - start);
                }
                None => debug!(track = index, pitch, tick, "note-off without open note"),
            }
        }
    }

    if !open.is_empty() {
        debug!(track = index, open = open.len(), tick, "closing unterminated notes");
        for (pitch, start) in open {
            builder.set_note_duration(start, pitch, tick - start);
        }
    }

    if builder.is_empty() {
        return None;
    }
    Some(builder.build(program.unwrap_or(gm::PIANO)))
}

pub fn load_transcript_bytes(bytes: &[u8], policy: ValidationPolicy) -> crate::Result<Transcript> {
    let song = decode(bytes)?;
    TranscriptBuilder::new(policy).build(&song)
}

/// Read, decode and transcribe one MIDI file.
pub fn load_transcript(path: &Path, policy: ValidationPolicy) -> crate::Result<Transcript> {
    let bytes = std::fs::read(path).map_err(|source| crate::Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), bytes = bytes.len(), "loading transcript");
    load_transcript_bytes(&bytes, policy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{KeySignature, TimeSignature};
    use pretty_assertions::assert_eq;

    fn on(delta: u32, channel: u8, pitch: u8) -> TimedEvent {
        TimedEvent::new(
            delta,
            MidiEvent::NoteOn {
                channel,
                pitch,
                velocity: 100,
            },
        )
    }

    fn off(delta: u32, channel: u8, pitch: u8) -> TimedEvent {
        TimedEvent::new(
            delta,
            MidiEvent::NoteOff {
                channel,
                pitch,
                velocity: 0,
            },
        )
    }

    fn song(tracks: Vec<Vec<TimedEvent>>) -> DecodedSong {
        DecodedSong {
            format: 1,
            resolution: 96,
            tracks,
        }
    }

    fn meta_track() -> Vec<TimedEvent> {
        vec![
            TimedEvent::new(0, MidiEvent::TimeSignature(TimeSignature::default())),
            TimedEvent::new(0, MidiEvent::Tempo(500_000)),
            TimedEvent::new(200, MidiEvent::Tempo(400_000)),
            TimedEvent::new(0, MidiEvent::EndOfTrack),
        ]
    }

    fn melody() -> Vec<TimedEvent> {
        vec![
            on(0, 0, 60),
            off(100, 0, 60),
            on(0, 0, 62),
            off(100, 0, 62),
            on(0, 0, 64),
            off(100, 0, 64),
            on(0, 0, 62),
            off(100, 0, 62),
            TimedEvent::new(0, MidiEvent::EndOfTrack),
        ]
    }

    #[test]
    fn reads_monophonic_track() {
        let transcript = TranscriptBuilder::default()
            .build(&song(vec![meta_track(), melody()]))
            .unwrap();

        assert_eq!(transcript.meta.resolution, 96);
        assert_eq!(transcript.meta.tempo_map.len(), 2);
        let track = transcript.track(gm::PIANO).unwrap();
        assert_eq!(track.times().collect::<Vec<_>>(), vec![0, 100, 200, 300]);
        let pitches: Vec<u8> = track.sound_events().map(|e| e.notes()[0].pitch).collect();
        assert_eq!(pitches, vec![60, 62, 64, 62]);
        assert!(track
            .sound_events()
            .all(|e| e.notes()[0].duration == 100));
    }

    #[test]
    fn notes_capture_context_at_their_tick() {
        let transcript = TranscriptBuilder::default()
            .build(&song(vec![meta_track(), melody()]))
            .unwrap();
        let track = transcript.track(gm::PIANO).unwrap();

        let early = track.sound_event_at(100).unwrap().meta_context().unwrap();
        let late = track.sound_event_at(200).unwrap().meta_context().unwrap();
        assert_eq!(early.tempo, Some(500_000));
        assert_eq!(late.tempo, Some(400_000));
        assert!(late.time_signature.is_some());
    }

    #[test]
    fn zero_velocity_note_on_closes_note() {
        let events = vec![
            on(0, 1, 60),
            on(0, 1, 64),
            TimedEvent::new(
                48,
                MidiEvent::NoteOn {
                    channel: 1,
                    pitch: 60,
                    velocity: 0,
                },
            ),
            off(48, 1, 64),
        ];
        let transcript = TranscriptBuilder::default()
            .build(&song(vec![vec![], events]))
            .unwrap();
        let chord = transcript.track(gm::PIANO).unwrap().sound_event_at(0).unwrap();
        let durations: Vec<Tick> = chord.notes().iter().map(|n| n.duration).collect();
        assert_eq!(durations, vec![48, 96]);
    }

    #[test]
    fn program_change_selects_instrument_and_tracks_merge() {
        let strings = vec![
            TimedEvent::new(
                0,
                MidiEvent::ProgramChange {
                    channel: 2,
                    program: 48,
                },
            ),
            on(0, 2, 60),
            off(100, 2, 60),
        ];
        let more_strings = vec![
            TimedEvent::new(
                0,
                MidiEvent::ProgramChange {
                    channel: 3,
                    program: 48,
                },
            ),
            on(50, 3, 67),
            off(10, 3, 67),
        ];
        let transcript = TranscriptBuilder::default()
            .build(&song(vec![meta_track(), strings, more_strings]))
            .unwrap();

        assert_eq!(transcript.instruments().collect::<Vec<_>>(), vec![48]);
        let track = transcript.track(48).unwrap();
        assert_eq!(track.times().collect::<Vec<_>>(), vec![0, 50]);
        assert_eq!(track.channel(), 2);
        let ctx = track.sound_event_at(0).unwrap().meta_context().unwrap();
        assert_eq!(ctx.program, Some(48));
    }

    #[test]
    fn unterminated_and_retriggered_notes_are_closed() {
        let events = vec![
            on(0, 0, 60),
            on(30, 0, 60),
            on(20, 0, 72),
            TimedEvent::new(40, MidiEvent::EndOfTrack),
        ];
        let transcript = TranscriptBuilder::default()
            .build(&song(vec![vec![], events]))
            .unwrap();
        let track = transcript.track(gm::PIANO).unwrap();

        assert_eq!(track.sound_event_at(0).unwrap().notes()[0].duration, 30);
        assert_eq!(track.sound_event_at(30).unwrap().notes()[0].duration, 60);
        assert_eq!(track.sound_event_at(50).unwrap().notes()[0].duration, 40);
    }

    #[test]
    fn single_track_file_reads_notes_from_track_zero() {
        let mut events = meta_track();
        events.pop();
        events.extend(melody());
        let transcript = TranscriptBuilder::default().build(&song(vec![events])).unwrap();
        assert_eq!(transcript.track(gm::PIANO).unwrap().len(), 4);
    }

    #[test]
    fn strict_rejects_mixed_channels() {
        let events = vec![on(0, 0, 60), off(10, 0, 60), on(0, 5, 62), off(10, 5, 62)];
        let err = TranscriptBuilder::new(ValidationPolicy::Strict)
            .build(&song(vec![meta_track(), events]))
            .unwrap_err();
        assert!(matches!(
            err,
            crate::Error::InvalidInput(crate::validate::InputIssue::MultipleChannels { .. })
        ));
    }

    #[test]
    fn lenient_skips_only_offending_events() {
        let events = vec![
            on(0, 0, 60),
            off(10, 0, 60),
            on(0, 5, 62),
            off(10, 5, 62),
            TimedEvent::new(0, MidiEvent::KeySignature(KeySignature::default())),
            on(0, 0, 64),
            off(10, 0, 64),
        ];
        let transcript = TranscriptBuilder::new(ValidationPolicy::Lenient)
            .build(&song(vec![meta_track(), events]))
            .unwrap();
        let track = transcript.track(gm::PIANO).unwrap();
        let pitches: Vec<u8> = track.sound_events().map(|e| e.notes()[0].pitch).collect();
        assert_eq!(pitches, vec![60, 64]);
        assert!(track.sound_events().all(|e| e.notes()[0].channel == 0));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_transcript(Path::new("/nonexistent/song.mid"), ValidationPolicy::Strict)
            .unwrap_err();
        assert!(matches!(err, crate::Error::Io { .. }));
    }
}
