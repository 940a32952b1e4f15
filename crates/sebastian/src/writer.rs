use crate::event::{MidiEvent, TimedEvent};
use crate::scheduler::PatternSchedule;
use midly::num::{u15, u24, u28, u4, u7};
use midly::{
    Format, Header, MetaMessage, MidiMessage, PitchBend, Smf, Timing, TrackEvent, TrackEventKind,
};
use std::path::Path;

const MAX_DELTA: u32 = 0x0FFF_FFFF;

/// Encode a schedule as a format 1 SMF: the song meta track first, then one
/// track per scheduled voice.
pub fn encode(schedule: &PatternSchedule) -> crate::Result<Vec<u8>> {
    let meta_track = schedule.meta_track();
    let voice_tracks: Vec<Vec<TimedEvent>> = schedule
        .tracks
        .iter()
        .map(|t| t.to_delta_events())
        .collect();

    let resolution = schedule.meta.resolution.clamp(1, 0x7FFF);
    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(resolution)),
    ));

    smf.tracks.push(convert_track(&meta_track)?);
    for events in &voice_tracks {
        smf.tracks.push(convert_track(events)?);
    }

    let mut bytes = Vec::new();
    smf.write(&mut bytes)
        .map_err(|e| crate::Error::MidiWrite(e.to_string()))?;
    Ok(bytes)
}

/// Encode and write to `path`.
pub fn write_file(schedule: &PatternSchedule, path: &Path) -> crate::Result<()> {
    let bytes = encode(schedule)?;
    std::fs::write(path, &bytes).map_err(|source| crate::Error::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn convert_track(events: &[TimedEvent]) -> crate::Result<Vec<TrackEvent<'_>>> {
    events
        .iter()
        .map(|timed| {
            if timed.delta > MAX_DELTA {
                return Err(crate::Error::MidiWrite(format!(
                    "delta time {} does not fit in a MIDI track",
                    timed.delta
                )));
            }
            Ok(TrackEvent {
                delta: u28::new(timed.delta),
                kind: convert_event(&timed.event)?,
            })
        })
        .collect()
}

fn midi(channel: u8, message: MidiMessage) -> TrackEventKind<'static> {
    TrackEventKind::Midi {
        channel: u4::new(channel & 0x0F),
        message,
    }
}

fn seven(value: u8) -> u7 {
    u7::new(value.min(127))
}

fn convert_event(event: &MidiEvent) -> crate::Result<TrackEventKind<'_>> {
    let kind = match event {
        MidiEvent::NoteOn {
            channel,
            pitch,
            velocity,
        } => midi(
            *channel,
            MidiMessage::NoteOn {
                key: seven(*pitch),
                vel: seven(*velocity),
            },
        ),
        MidiEvent::NoteOff {
            channel,
            pitch,
            velocity,
        } => midi(
            *channel,
            MidiMessage::NoteOff {
                key: seven(*pitch),
                vel: seven(*velocity),
            },
        ),
        MidiEvent::Aftertouch {
            channel,
            pitch,
            pressure,
        } => midi(
            *channel,
            MidiMessage::Aftertouch {
                key: seven(*pitch),
                vel: seven(*pressure),
            },
        ),
        MidiEvent::ChannelAftertouch { channel, pressure } => midi(
            *channel,
            MidiMessage::ChannelAftertouch {
                vel: seven(*pressure),
            },
        ),
        MidiEvent::PitchBend { channel, bend } => midi(
            *channel,
            MidiMessage::PitchBend {
                bend: PitchBend::from_int(*bend),
            },
        ),
        MidiEvent::ControlChange {
            channel,
            controller,
            value,
        } => midi(
            *channel,
            MidiMessage::Controller {
                controller: seven(*controller),
                value: seven(*value),
            },
        ),
        MidiEvent::ProgramChange { channel, program } => midi(
            *channel,
            MidiMessage::ProgramChange {
                program: seven(*program),
            },
        ),
        MidiEvent::Tempo(usec) => {
            TrackEventKind::Meta(MetaMessage::Tempo(u24::new((*usec).min(0x00FF_FFFF))))
        }
        MidiEvent::KeySignature(key) => {
            TrackEventKind::Meta(MetaMessage::KeySignature(key.sharps, key.minor))
        }
        MidiEvent::TimeSignature(ts) => TrackEventKind::Meta(MetaMessage::TimeSignature(
            ts.numerator,
            ts.denominator_pow,
            ts.clocks_per_click,
            ts.notated_32nds_per_quarter,
        )),
        MidiEvent::Port(port) => TrackEventKind::Meta(MetaMessage::MidiPort(seven(*port))),
        MidiEvent::TrackName(name) => TrackEventKind::Meta(MetaMessage::TrackName(name.as_bytes())),
        MidiEvent::Text(text) => TrackEventKind::Meta(MetaMessage::Text(text.as_bytes())),
        MidiEvent::SysEx(bytes) => TrackEventKind::SysEx(bytes),
        MidiEvent::EndOfTrack => TrackEventKind::Meta(MetaMessage::EndOfTrack),
        MidiEvent::OtherMeta(kind) | MidiEvent::Unknown(kind) => {
            return Err(crate::Error::MidiWrite(format!("cannot encode {}", kind)));
        }
    };
    Ok(kind)
}
