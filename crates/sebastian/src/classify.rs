//! Event classification.
//!
//! [`classify`] is the only place that matches on [`MidiEvent`] variants to
//! decide what an event means for transcription; the rest of the crate asks
//! these predicates.

use crate::event::MidiEvent;
use serde::{Deserialize, Serialize};

/// What a decoded event means to the transcript builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventClass {
    /// Note-on with velocity > 0.
    NewNote,
    /// Note-off, or note-on with velocity 0.
    NoteEnded,
    Tempo,
    KeySignature,
    TimeSignature,
    ControlChange,
    ProgramChange,
    Port,
    /// Known events that carry nothing we model (names, text, bends, sysex...).
    Ignored,
    /// Events we cannot interpret at all.
    Unsupported,
}

pub fn classify(event: &MidiEvent) -> EventClass {
    match event {
        MidiEvent::NoteOn { velocity, .. } if *velocity > 0 => EventClass::NewNote,
        MidiEvent::NoteOn { .. } | MidiEvent::NoteOff { .. } => EventClass::NoteEnded,
        MidiEvent::Tempo(_) => EventClass::Tempo,
        MidiEvent::KeySignature(_) => EventClass::KeySignature,
        MidiEvent::TimeSignature(_) => EventClass::TimeSignature,
        MidiEvent::ControlChange { .. } => EventClass::ControlChange,
        MidiEvent::ProgramChange { .. } => EventClass::ProgramChange,
        MidiEvent::Port(_) => EventClass::Port,
        MidiEvent::Aftertouch { .. }
        | MidiEvent::ChannelAftertouch { .. }
        | MidiEvent::PitchBend { .. }
        | MidiEvent::TrackName(_)
        | MidiEvent::Text(_)
        | MidiEvent::OtherMeta(_)
        | MidiEvent::SysEx(_)
        | MidiEvent::EndOfTrack => EventClass::Ignored,
        MidiEvent::Unknown(_) => EventClass::Unsupported,
    }
}

pub fn is_new_note(event: &MidiEvent) -> bool {
    classify(event) == EventClass::NewNote
}

/// Velocity-zero note-ons count as note-offs (running status convention).
pub fn has_note_ended(event: &MidiEvent) -> bool {
    classify(event) == EventClass::NoteEnded
}

pub fn is_tempo_event(event: &MidiEvent) -> bool {
    classify(event) == EventClass::Tempo
}

pub fn is_key_signature_event(event: &MidiEvent) -> bool {
    classify(event) == EventClass::KeySignature
}

pub fn is_time_signature_event(event: &MidiEvent) -> bool {
    classify(event) == EventClass::TimeSignature
}

pub fn is_control_change_event(event: &MidiEvent) -> bool {
    classify(event) == EventClass::ControlChange
}

pub fn is_program_change_event(event: &MidiEvent) -> bool {
    classify(event) == EventClass::ProgramChange
}

pub fn is_port_event(event: &MidiEvent) -> bool {
    classify(event) == EventClass::Port
}

/// Non-channel events other than sysex: tempo, signatures, names, end of track...
pub fn is_meta_event(event: &MidiEvent) -> bool {
    event.channel().is_none() && !matches!(event, MidiEvent::SysEx(_))
}

/// Events that change the active [`MetaContext`](crate::meta::MetaContext).
pub fn is_music_control_event(event: &MidiEvent) -> bool {
    matches!(
        classify(event),
        EventClass::Tempo
            | EventClass::KeySignature
            | EventClass::TimeSignature
            | EventClass::ControlChange
            | EventClass::ProgramChange
            | EventClass::Port
    )
}

/// Song-wide events that must live in the first track.
pub fn is_song_meta_event(event: &MidiEvent) -> bool {
    matches!(
        classify(event),
        EventClass::KeySignature | EventClass::TimeSignature
    )
}

pub fn is_channel_event(event: &MidiEvent) -> bool {
    event.channel().is_some()
}

pub fn is_unsupported(event: &MidiEvent) -> bool {
    classify(event) == EventClass::Unsupported
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{KeySignature, TimeSignature};

    fn note_on(velocity: u8) -> MidiEvent {
        MidiEvent::NoteOn {
            channel: 0,
            pitch: 60,
            velocity,
        }
    }

    #[test]
    fn zero_velocity_note_on_ends_a_note() {
        assert!(is_new_note(&note_on(64)));
        assert!(!has_note_ended(&note_on(64)));

        assert!(!is_new_note(&note_on(0)));
        assert!(has_note_ended(&note_on(0)));

        let off = MidiEvent::NoteOff {
            channel: 0,
            pitch: 60,
            velocity: 64,
        };
        assert!(has_note_ended(&off));
    }

    #[test]
    fn music_control_set() {
        let controls = [
            MidiEvent::Tempo(500_000),
            MidiEvent::KeySignature(KeySignature::default()),
            MidiEvent::TimeSignature(TimeSignature::default()),
            MidiEvent::ControlChange {
                channel: 0,
                controller: 7,
                value: 90,
            },
            MidiEvent::ProgramChange {
                channel: 0,
                program: 40,
            },
            MidiEvent::Port(1),
        ];
        for event in &controls {
            assert!(is_music_control_event(event), "{} should be a control", event);
        }

        assert!(!is_music_control_event(&note_on(10)));
        assert!(!is_music_control_event(&MidiEvent::PitchBend {
            channel: 0,
            bend: 100
        }));
        assert!(!is_music_control_event(&MidiEvent::EndOfTrack));
    }

    #[test]
    fn meta_and_song_meta() {
        assert!(is_meta_event(&MidiEvent::Tempo(1)));
        assert!(is_meta_event(&MidiEvent::EndOfTrack));
        assert!(!is_meta_event(&note_on(1)));
        assert!(!is_meta_event(&MidiEvent::SysEx(vec![0xF0])));

        assert!(is_song_meta_event(&MidiEvent::KeySignature(
            KeySignature::default()
        )));
        assert!(!is_song_meta_event(&MidiEvent::Tempo(1)));
    }

    #[test]
    fn unknown_is_unsupported() {
        assert!(is_unsupported(&MidiEvent::Unknown("meta 0x60".into())));
        assert_eq!(classify(&MidiEvent::Text("hi".into())), EventClass::Ignored);
    }

    #[test]
    fn every_predicate_against_every_kind() {
        type Predicate = fn(&MidiEvent) -> bool;
        let predicates: [(&str, Predicate); 13] = [
            ("new_note", is_new_note),
            ("note_ended", has_note_ended),
            ("tempo", is_tempo_event),
            ("key", is_key_signature_event),
            ("time", is_time_signature_event),
            ("cc", is_control_change_event),
            ("program", is_program_change_event),
            ("port", is_port_event),
            ("meta", is_meta_event),
            ("control", is_music_control_event),
            ("song_meta", is_song_meta_event),
            ("channel", is_channel_event),
            ("unsupported", is_unsupported),
        ];

        let cases: Vec<(MidiEvent, &[&str])> = vec![
            (note_on(90), &["new_note", "channel"][..]),
            (note_on(0), &["note_ended", "channel"][..]),
            (MidiEvent::Tempo(500_000), &["tempo", "meta", "control"][..]),
            (
                MidiEvent::KeySignature(KeySignature::default()),
                &["key", "meta", "control", "song_meta"][..],
            ),
            (
                MidiEvent::TimeSignature(TimeSignature::default()),
                &["time", "meta", "control", "song_meta"][..],
            ),
            (
                MidiEvent::ControlChange {
                    channel: 3,
                    controller: 64,
                    value: 127,
                },
                &["cc", "control", "channel"][..],
            ),
            (
                MidiEvent::ProgramChange {
                    channel: 3,
                    program: 19,
                },
                &["program", "control", "channel"][..],
            ),
            (MidiEvent::Port(2), &["port", "meta", "control"][..]),
            (
                MidiEvent::PitchBend {
                    channel: 1,
                    bend: -200,
                },
                &["channel"][..],
            ),
            (MidiEvent::TrackName("lead".into()), &["meta"][..]),
            (MidiEvent::SysEx(vec![0x7E, 0x7F]), &[][..]),
            (MidiEvent::EndOfTrack, &["meta"][..]),
            (MidiEvent::Unknown("meta 0x60".into()), &["meta", "unsupported"][..]),
        ];

        for (event, expected) in &cases {
            let matched: Vec<&str> = predicates
                .iter()
                .filter(|(_, predicate)| predicate(event))
                .map(|(name, _)| *name)
                .collect();
            assert_eq!(matched.as_slice(), *expected, "{}", event);
        }
    }
}
