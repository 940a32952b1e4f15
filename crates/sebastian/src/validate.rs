//! Pre-pass that checks a decoded song against the expected layout: song
//! meta in the first track, one channel per note track, only events the
//! classifier understands.

use crate::classify::{is_song_meta_event, is_unsupported};
use crate::event::{DecodedSong, MidiEvent};
use crate::policy::ValidationPolicy;
use tracing::warn;

/// A violated input-format assumption.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputIssue {
    #[error(
        "track {track} mixes MIDI channels (channel {first} then channel {found}); \
         each track must use a single channel"
    )]
    MultipleChannels { track: usize, first: u8, found: u8 },

    #[error("track {track} carries {event}; key and time signatures belong in the first track")]
    SongMetaOutsideFirstTrack { track: usize, event: String },

    #[error("track {track} contains an event that cannot be interpreted: {event}")]
    UnsupportedEvent { track: usize, event: String },
}

impl InputIssue {
    pub fn track(&self) -> usize {
        match self {
            InputIssue::MultipleChannels { track, .. }
            | InputIssue::SongMetaOutsideFirstTrack { track, .. }
            | InputIssue::UnsupportedEvent { track, .. } => *track,
        }
    }
}

/// Why an event would be skipped by a lenient load, if at all.
///
/// `expected_channel` is the channel a note track has committed to so far.
pub(crate) fn offending(
    track: usize,
    event: &MidiEvent,
    expected_channel: Option<u8>,
) -> Option<InputIssue> {
    if is_unsupported(event) {
        return Some(InputIssue::UnsupportedEvent {
            track,
            event: event.to_string(),
        });
    }
    if track > 0 && is_song_meta_event(event) {
        return Some(InputIssue::SongMetaOutsideFirstTrack {
            track,
            event: event.to_string(),
        });
    }
    match (expected_channel, event.channel()) {
        (Some(first), Some(found)) if first != found => Some(InputIssue::MultipleChannels {
            track,
            first,
            found,
        }),
        _ => None,
    }
}

/// Index of the first track that carries notes. Single-track files keep
/// their notes next to the song meta in track 0.
pub(crate) fn first_note_track(song: &DecodedSong) -> usize {
    if song.tracks.len() == 1 {
        0
    } else {
        1
    }
}

/// Every issue in the song, in track order.
pub fn validate(song: &DecodedSong) -> Vec<InputIssue> {
    let note_tracks_from = first_note_track(song);
    let mut issues = Vec::new();

    for (index, events) in song.tracks.iter().enumerate() {
        let checks_channels = index >= note_tracks_from;
        let mut channel = None;
        let mut reported_channels = false;

        for timed in events {
            let expected = if checks_channels { channel } else { None };
            match offending(index, &timed.event, expected) {
                Some(issue @ InputIssue::MultipleChannels { .. }) => {
                    // One report per track is enough to name the problem.
                    if !reported_channels {
                        issues.push(issue);
                        reported_channels = true;
                    }
                }
                Some(issue) => issues.push(issue),
                None => {
                    if channel.is_none() {
                        channel = timed.event.channel();
                    }
                }
            }
        }
    }

    issues
}

/// Apply the validation policy: strict turns the first issue into an error,
/// lenient logs each one and lets the load continue.
pub fn enforce(issues: Vec<InputIssue>, policy: ValidationPolicy) -> crate::Result<()> {
    match policy {
        ValidationPolicy::Strict => match issues.into_iter().next() {
            Some(issue) => Err(crate::Error::InvalidInput(issue)),
            None => Ok(()),
        },
        ValidationPolicy::Lenient => {
            for issue in &issues {
                warn!(track = issue.track(), "skipping input: {}", issue);
            }
            Ok(())
        }
    }
}
