//! Owned, decoded MIDI events and the `midly` decode boundary.
//!
//! Everything downstream of [`decode`] works on [`MidiEvent`], never on
//! `midly` types, so the transcript builder can be fed hand-built event
//! streams in tests.

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Resolution used when a file carries SMPTE timecode instead of metrical timing.
pub const DEFAULT_RESOLUTION: u16 = 480;

/// Time signature as stored in the SMF meta event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,
    /// Denominator as a power of two (2 means quarter notes).
    pub denominator_pow: u8,
    pub clocks_per_click: u8,
    pub notated_32nds_per_quarter: u8,
}

impl TimeSignature {
    /// Denominator as a note value, `None` when the stored power does not fit a `u32`.
    pub fn denominator(&self) -> Option<u32> {
        1u32.checked_shl(u32::from(self.denominator_pow))
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.denominator() {
            Some(denominator) => write!(f, "{}/{}", self.numerator, denominator),
            None => write!(f, "{}/2^{}", self.numerator, self.denominator_pow),
        }
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            numerator: 4,
            denominator_pow: 2,
            clocks_per_click: 24,
            notated_32nds_per_quarter: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct KeySignature {
    /// Negative for flats, positive for sharps.
    pub sharps: i8,
    pub minor: bool,
}

/// A single decoded track event, detached from the file buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MidiEvent {
    NoteOn { channel: u8, pitch: u8, velocity: u8 },
    NoteOff { channel: u8, pitch: u8, velocity: u8 },
    Aftertouch { channel: u8, pitch: u8, pressure: u8 },
    ChannelAftertouch { channel: u8, pressure: u8 },
    PitchBend { channel: u8, bend: i16 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    /// Microseconds per quarter note.
    Tempo(u32),
    KeySignature(KeySignature),
    TimeSignature(TimeSignature),
    Port(u8),
    TrackName(String),
    Text(String),
    /// Meta events that carry no musical meaning here (copyright, markers, SMPTE offset...).
    OtherMeta(String),
    SysEx(Vec<u8>),
    EndOfTrack,
    /// Anything the codec surfaced that we have no model for.
    Unknown(String),
}

impl MidiEvent {
    /// Channel of channel-voice events, `None` for meta and sysex events.
    pub fn channel(&self) -> Option<u8> {
        match self {
            MidiEvent::NoteOn { channel, .. }
            | MidiEvent::NoteOff { channel, .. }
            | MidiEvent::Aftertouch { channel, .. }
            | MidiEvent::ChannelAftertouch { channel, .. }
            | MidiEvent::PitchBend { channel, .. }
            | MidiEvent::ControlChange { channel, .. }
            | MidiEvent::ProgramChange { channel, .. } => Some(*channel),
            _ => None,
        }
    }

    /// Same event moved to another channel. Events without a channel are returned unchanged.
    pub fn on_channel(&self, target: u8) -> MidiEvent {
        let mut event = self.clone();
        match &mut event {
            MidiEvent::NoteOn { channel, .. }
            | MidiEvent::NoteOff { channel, .. }
            | MidiEvent::Aftertouch { channel, .. }
            | MidiEvent::ChannelAftertouch { channel, .. }
            | MidiEvent::PitchBend { channel, .. }
            | MidiEvent::ControlChange { channel, .. }
            | MidiEvent::ProgramChange { channel, .. } => *channel = target & 0x0F,
            _ => {}
        }
        event
    }
}

impl fmt::Display for MidiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MidiEvent::NoteOn { channel, pitch, velocity } => {
                write!(f, "note-on ch{} pitch {} vel {}", channel, pitch, velocity)
            }
            MidiEvent::NoteOff { channel, pitch, .. } => {
                write!(f, "note-off ch{} pitch {}", channel, pitch)
            }
            MidiEvent::Aftertouch { channel, pitch, .. } => {
                write!(f, "aftertouch ch{} pitch {}", channel, pitch)
            }
            MidiEvent::ChannelAftertouch { channel, .. } => {
                write!(f, "channel aftertouch ch{}", channel)
            }
            MidiEvent::PitchBend { channel, bend } => {
                write!(f, "pitch bend ch{} {}", channel, bend)
            }
            MidiEvent::ControlChange { channel, controller, value } => {
                write!(f, "control change ch{} cc{}={}", channel, controller, value)
            }
            MidiEvent::ProgramChange { channel, program } => {
                write!(f, "program change ch{} program {}", channel, program)
            }
            MidiEvent::Tempo(usec) => write!(f, "tempo {} usec/beat", usec),
            MidiEvent::KeySignature(key) => write!(
                f,
                "key signature {} {}",
                key.sharps,
                if key.minor { "minor" } else { "major" }
            ),
            MidiEvent::TimeSignature(ts) => write!(f, "time signature {}", ts),
            MidiEvent::Port(port) => write!(f, "port {}", port),
            MidiEvent::TrackName(name) => write!(f, "track name {:?}", name),
            MidiEvent::Text(text) => write!(f, "text {:?}", text),
            MidiEvent::OtherMeta(kind) => write!(f, "meta {}", kind),
            MidiEvent::SysEx(bytes) => write!(f, "sysex ({} bytes)", bytes.len()),
            MidiEvent::EndOfTrack => write!(f, "end of track"),
            MidiEvent::Unknown(kind) => write!(f, "unknown event {}", kind),
        }
    }
}

/// An event together with its delta time from the previous event in the same track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedEvent {
    pub delta: u32,
    pub event: MidiEvent,
}

impl TimedEvent {
    pub fn new(delta: u32, event: MidiEvent) -> Self {
        Self { delta, event }
    }
}

/// A whole decoded file: header fields plus per-track event streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedSong {
    pub format: u16,
    pub resolution: u16,
    pub tracks: Vec<Vec<TimedEvent>>,
}

/// Decode SMF bytes into an owned event stream.
pub fn decode(bytes: &[u8]) -> crate::Result<DecodedSong> {
    let smf = Smf::parse(bytes).map_err(|e| crate::Error::MidiParse(e.to_string()))?;

    let resolution = match smf.header.timing {
        Timing::Metrical(ticks) => ticks.as_int(),
        Timing::Timecode(_, _) => DEFAULT_RESOLUTION,
    };

    let format = match smf.header.format {
        midly::Format::SingleTrack => 0,
        midly::Format::Parallel => 1,
        midly::Format::Sequential => 2,
    };

    let tracks = smf
        .tracks
        .iter()
        .map(|track| {
            track
                .iter()
                .map(|event| TimedEvent::new(event.delta.as_int(), convert_kind(&event.kind)))
                .collect()
        })
        .collect();

    Ok(DecodedSong {
        format,
        resolution,
        tracks,
    })
}

fn convert_kind(kind: &TrackEventKind<'_>) -> MidiEvent {
    match *kind {
        TrackEventKind::Midi { channel, message } => {
            let channel = channel.as_int();
            match message {
                MidiMessage::NoteOn { key, vel } => MidiEvent::NoteOn {
                    channel,
                    pitch: key.as_int(),
                    velocity: vel.as_int(),
                },
                MidiMessage::NoteOff { key, vel } => MidiEvent::NoteOff {
                    channel,
                    pitch: key.as_int(),
                    velocity: vel.as_int(),
                },
                MidiMessage::Aftertouch { key, vel } => MidiEvent::Aftertouch {
                    channel,
                    pitch: key.as_int(),
                    pressure: vel.as_int(),
                },
                MidiMessage::Controller { controller, value } => MidiEvent::ControlChange {
                    channel,
                    controller: controller.as_int(),
                    value: value.as_int(),
                },
                MidiMessage::ProgramChange { program } => MidiEvent::ProgramChange {
                    channel,
                    program: program.as_int(),
                },
                MidiMessage::ChannelAftertouch { vel } => MidiEvent::ChannelAftertouch {
                    channel,
                    pressure: vel.as_int(),
                },
                MidiMessage::PitchBend { bend } => MidiEvent::PitchBend {
                    channel,
                    bend: bend.as_int(),
                },
            }
        }
        TrackEventKind::Meta(meta) => convert_meta(meta),
        TrackEventKind::SysEx(bytes) => MidiEvent::SysEx(bytes.to_vec()),
        TrackEventKind::Escape(_) => MidiEvent::Unknown("escape sequence".to_string()),
    }
}

fn convert_meta(meta: MetaMessage<'_>) -> MidiEvent {
    match meta {
        MetaMessage::Tempo(usec) => MidiEvent::Tempo(usec.as_int()),
        MetaMessage::KeySignature(sharps, minor) => {
            MidiEvent::KeySignature(KeySignature { sharps, minor })
        }
        MetaMessage::TimeSignature(numerator, denominator_pow, clocks_per_click, notated) => {
            MidiEvent::TimeSignature(TimeSignature {
                numerator,
                denominator_pow,
                clocks_per_click,
                notated_32nds_per_quarter: notated,
            })
        }
        MetaMessage::MidiPort(port) => MidiEvent::Port(port.as_int()),
        MetaMessage::TrackName(bytes) => MidiEvent::TrackName(lossy(bytes)),
        MetaMessage::Text(bytes) => MidiEvent::Text(lossy(bytes)),
        MetaMessage::EndOfTrack => MidiEvent::EndOfTrack,
        MetaMessage::TrackNumber(_) => MidiEvent::OtherMeta("track number".to_string()),
        MetaMessage::Copyright(_) => MidiEvent::OtherMeta("copyright".to_string()),
        MetaMessage::InstrumentName(_) => MidiEvent::OtherMeta("instrument name".to_string()),
        MetaMessage::Lyric(_) => MidiEvent::OtherMeta("lyric".to_string()),
        MetaMessage::Marker(_) => MidiEvent::OtherMeta("marker".to_string()),
        MetaMessage::CuePoint(_) => MidiEvent::OtherMeta("cue point".to_string()),
        MetaMessage::ProgramName(_) => MidiEvent::OtherMeta("program name".to_string()),
        MetaMessage::DeviceName(_) => MidiEvent::OtherMeta("device name".to_string()),
        MetaMessage::MidiChannel(_) => MidiEvent::OtherMeta("channel prefix".to_string()),
        MetaMessage::SmpteOffset(_) => MidiEvent::OtherMeta("smpte offset".to_string()),
        MetaMessage::SequencerSpecific(_) => {
            MidiEvent::OtherMeta("sequencer specific".to_string())
        }
        MetaMessage::Unknown(kind, _) => MidiEvent::Unknown(format!("meta 0x{:02X}", kind)),
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_signature_denominator_handles_any_power() {
        let waltz = TimeSignature {
            numerator: 3,
            denominator_pow: 2,
            ..TimeSignature::default()
        };
        assert_eq!(waltz.denominator(), Some(4));
        assert_eq!(waltz.to_string(), "3/4");

        let broken = TimeSignature {
            denominator_pow: 40,
            ..TimeSignature::default()
        };
        assert_eq!(broken.denominator(), None);
        assert_eq!(
            MidiEvent::TimeSignature(broken).to_string(),
            "time signature 4/2^40"
        );
    }

    #[test]
    fn decode_reads_header_and_events() {
        let mut buf = Vec::new();
        buf.extend_from_slice(b"MThd");
        buf.extend_from_slice(&6u32.to_be_bytes());
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf.extend_from_slice(&96u16.to_be_bytes());

        let mut track = Vec::new();
        track.extend_from_slice(&[0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20]);
        track.extend_from_slice(&[0x00, 0x91, 60, 90]);
        track.extend_from_slice(&[0x60, 0x91, 60, 0]);
        track.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);
        buf.extend_from_slice(b"MTrk");
        buf.extend_from_slice(&(track.len() as u32).to_be_bytes());
        buf.extend_from_slice(&track);

        let song = decode(&buf).unwrap();
        assert_eq!(song.format, 1);
        assert_eq!(song.resolution, 96);
        assert_eq!(song.tracks.len(), 1);

        let events: Vec<&MidiEvent> = song.tracks[0].iter().map(|e| &e.event).collect();
        assert_eq!(events[0], &MidiEvent::Tempo(500_000));
        assert_eq!(
            events[1],
            &MidiEvent::NoteOn {
                channel: 1,
                pitch: 60,
                velocity: 90
            }
        );
        assert_eq!(song.tracks[0][2].delta, 0x60);
        assert_eq!(events[3], &MidiEvent::EndOfTrack);
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode(b"not a midi file").unwrap_err();
        assert!(matches!(err, crate::Error::MidiParse(_)));
    }

    #[test]
    fn on_channel_only_touches_channel_events() {
        let cc = MidiEvent::ControlChange {
            channel: 2,
            controller: 7,
            value: 100,
        };
        assert_eq!(cc.on_channel(5).channel(), Some(5));
        assert_eq!(MidiEvent::Tempo(1).on_channel(5), MidiEvent::Tempo(1));
    }
}
