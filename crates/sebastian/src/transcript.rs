use crate::gm;
use crate::meta::SongMeta;
use crate::note::Tick;
use crate::track::Track;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A whole song as per-instrument tracks plus song meta.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub meta: SongMeta,
    tracks: BTreeMap<u8, Track>,
}

impl Transcript {
    pub fn new(meta: SongMeta) -> Self {
        Self {
            meta,
            tracks: BTreeMap::new(),
        }
    }

    /// Add a track under its instrument. A second track for the same
    /// instrument is merged into the first, never overwritten.
    pub fn add_track(&mut self, track: Track) {
        let instrument = track.instrument();
        let merged = match self.tracks.get(&instrument) {
            Some(existing) => existing.merge(&track),
            None => track,
        };
        self.tracks.insert(instrument, merged);
    }

    pub fn track(&self, instrument: u8) -> Option<&Track> {
        self.tracks.get(&instrument)
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> + '_ {
        self.tracks.values()
    }

    pub fn instruments(&self) -> impl Iterator<Item = u8> + '_ {
        self.tracks.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Every track merged into one timeline, keyed by the lowest instrument.
    /// Notes keep their own channels.
    pub fn combined_track(&self) -> Option<Track> {
        let mut tracks = self.tracks.values();
        let first = tracks.next()?.clone();
        Some(tracks.fold(first, |acc, t| acc.merge(t)))
    }

    pub fn summary(&self) -> TranscriptSummary {
        TranscriptSummary {
            format: self.meta.format,
            resolution: self.meta.resolution,
            tempo_changes: self.meta.tempo_map.len(),
            tracks: self
                .tracks
                .values()
                .map(|track| {
                    let (first_tick, last_tick) = track.span().unwrap_or((0, 0));
                    TrackSummary {
                        instrument: track.instrument(),
                        program_name: if track.channel() == gm::PERCUSSION_CHANNEL {
                            "Percussion".to_string()
                        } else {
                            gm::program_name(track.instrument()).to_string()
                        },
                        channel: track.channel(),
                        sound_events: track.len(),
                        notes: track.note_count(),
                        chords: track.chord_count(),
                        first_tick,
                        last_tick,
                    }
                })
                .collect(),
        }
    }
}

/// Inspection view of a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptSummary {
    pub format: u16,
    pub resolution: u16,
    pub tempo_changes: usize,
    pub tracks: Vec<TrackSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub instrument: u8,
    pub program_name: String,
    pub channel: u8,
    pub sound_events: usize,
    pub notes: usize,
    pub chords: usize,
    pub first_tick: Tick,
    pub last_tick: Tick,
}
