//! Frame counting and the continuation index used by the generator.
//!
//! A window of `n` components slides one sound event at a time over each
//! training track. Every full window is one frame occurrence. Frames are
//! remembered in first-seen order, which is what breaks ties between frames
//! of equal count.

use crate::frame::{Frame, FrameComponent, FrameStats};
use crate::policy::ChannelMixingPolicy;
use crate::track::Track;
use crate::transcript::Transcript;
use rand::Rng;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::debug;

fn check_size(n: usize) -> crate::Result<()> {
    if n < 2 {
        return Err(crate::Error::InvalidConfig(format!(
            "n-gram size must be at least 2, got {}",
            n
        )));
    }
    Ok(())
}

/// Counts frames during training.
#[derive(Debug, Clone)]
pub struct NGramBuilder {
    n: usize,
    index: HashMap<Frame, usize>,
    frames: Vec<Frame>,
    stats: Vec<FrameStats>,
    element_counts: HashMap<FrameComponent, u64>,
}

impl NGramBuilder {
    pub fn new(n: usize) -> crate::Result<Self> {
        check_size(n)?;
        Ok(Self::with_size(n))
    }

    fn with_size(n: usize) -> Self {
        Self {
            n,
            index: HashMap::new(),
            frames: Vec::new(),
            stats: Vec::new(),
            element_counts: HashMap::new(),
        }
    }

    pub fn n(&self) -> usize {
        self.n
    }

    /// Count every window of one component sequence. Windows never span two
    /// calls. Returns the number of frame occurrences recorded.
    pub fn add_components(&mut self, components: &[FrameComponent]) -> usize {
        let mut window: VecDeque<FrameComponent> = VecDeque::with_capacity(self.n);
        let mut recorded = 0;

        for component in components {
            *self.element_counts.entry(component.clone()).or_insert(0) += 1;

            window.push_back(component.clone());
            if window.len() > self.n {
                window.pop_front();
            }
            if window.len() == self.n {
                let frame = Frame::new(window.iter().cloned().collect());
                self.record(frame, 1);
                recorded += 1;
            }
        }

        recorded
    }

    pub fn add_track(&mut self, track: &Track) -> usize {
        self.add_components(&track.frame_components())
    }

    fn record(&mut self, frame: Frame, count: u64) {
        let idx = match self.index.get(&frame) {
            Some(idx) => *idx,
            None => {
                let idx = self.frames.len();
                self.index.insert(frame.clone(), idx);
                self.frames.push(frame);
                self.stats.push(FrameStats::new(idx));
                idx
            }
        };
        self.stats[idx].count += count;
    }

    /// Fold another builder's counts into this one. Frames new to `self` are
    /// appended after ours, in the other builder's order.
    pub fn merge(&mut self, other: NGramBuilder) -> crate::Result<()> {
        if other.n != self.n {
            return Err(crate::Error::InvalidConfig(format!(
                "cannot merge n-gram models of size {} and {}",
                self.n, other.n
            )));
        }

        for (frame, stats) in other.frames.into_iter().zip(other.stats) {
            self.record(frame, stats.count);
        }
        for (component, count) in other.element_counts {
            *self.element_counts.entry(component).or_insert(0) += count;
        }
        Ok(())
    }

    pub fn build(self) -> NGramModel {
        let mut by_first: HashMap<FrameComponent, Vec<usize>> = HashMap::new();
        for (idx, frame) in self.frames.iter().enumerate() {
            if let Some(first) = frame.first() {
                by_first.entry(first.clone()).or_default().push(idx);
            }
        }

        let stats = &self.stats;
        for candidates in by_first.values_mut() {
            candidates.sort_by(|a, b| {
                stats[*b]
                    .count
                    .cmp(&stats[*a].count)
                    .then(stats[*a].insertion_index.cmp(&stats[*b].insertion_index))
            });
        }

        NGramModel {
            n: self.n,
            frames: self.frames,
            stats: self.stats,
            index: self.index,
            by_first,
            element_counts: self.element_counts,
        }
    }
}

/// Read-only frame distribution with a first-component index.
#[derive(Debug, Clone)]
pub struct NGramModel {
    n: usize,
    frames: Vec<Frame>,
    stats: Vec<FrameStats>,
    index: HashMap<Frame, usize>,
    /// First component -> frame indices, by count descending then
    /// insertion index ascending.
    by_first: HashMap<FrameComponent, Vec<usize>>,
    element_counts: HashMap<FrameComponent, u64>,
}

impl NGramModel {
    pub fn n(&self) -> usize {
        self.n
    }

    /// Number of distinct frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Total frame occurrences.
    pub fn total_count(&self) -> u64 {
        self.stats.iter().map(|s| s.count).sum()
    }

    pub fn frame(&self, idx: usize) -> Option<&Frame> {
        self.frames.get(idx)
    }

    pub fn stats(&self, idx: usize) -> Option<&FrameStats> {
        self.stats.get(idx)
    }

    /// Occurrences of `frame`, zero if never seen.
    pub fn count(&self, frame: &Frame) -> u64 {
        self.index
            .get(frame)
            .map(|idx| self.stats[*idx].count)
            .unwrap_or(0)
    }

    /// Occurrences of a single component across all training tracks.
    pub fn element_count(&self, component: &FrameComponent) -> u64 {
        self.element_counts.get(component).copied().unwrap_or(0)
    }

    pub fn distinct_elements(&self) -> usize {
        self.element_counts.len()
    }

    /// Index of the first frame seen in training.
    pub fn first_index(&self) -> crate::Result<usize> {
        if self.frames.is_empty() {
            return Err(crate::Error::EmptyModel);
        }
        Ok(0)
    }

    pub fn first_frame(&self) -> crate::Result<&Frame> {
        self.first_index().map(|idx| &self.frames[idx])
    }

    /// Uniformly random frame index over all distinct frames.
    pub fn random_index<R: Rng + ?Sized>(&self, rng: &mut R) -> crate::Result<usize> {
        if self.frames.is_empty() {
            return Err(crate::Error::EmptyModel);
        }
        Ok(rng.random_range(0..self.frames.len()))
    }

    pub fn random_frame<R: Rng + ?Sized>(&self, rng: &mut R) -> crate::Result<&Frame> {
        self.random_index(rng).map(|idx| &self.frames[idx])
    }

    /// Ranked indices of frames starting with `component`.
    pub fn candidates(&self, component: &FrameComponent) -> &[usize] {
        self.by_first
            .get(component)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Most frequent frame starting with `last`; ties go to the earliest seen.
    pub fn best_continuation(&self, last: &FrameComponent) -> Option<&Frame> {
        self.candidates(last).first().map(|idx| &self.frames[*idx])
    }

    /// Frames starting with `component` with their counts, best first.
    pub fn frames_starting_with(&self, component: &FrameComponent) -> Vec<(&Frame, u64)> {
        self.candidates(component)
            .iter()
            .map(|idx| (&self.frames[*idx], self.stats[*idx].count))
            .collect()
    }

    /// The most frequent single components, for diagnostics.
    pub fn top_elements(&self, limit: usize) -> Vec<(&FrameComponent, u64)> {
        let mut elements: Vec<(&FrameComponent, u64)> =
            self.element_counts.iter().map(|(c, n)| (c, *n)).collect();
        elements.sort_by(|a, b| {
            b.1.cmp(&a.1)
                .then_with(|| a.0.sound_event().keys().cmp(b.0.sound_event().keys()))
        });
        elements.truncate(limit);
        elements
    }
}

/// Most frequent sound events rendered as `pitch[+pitch]x count`, for logs.
fn element_summary(model: &NGramModel, limit: usize) -> String {
    model
        .top_elements(limit)
        .iter()
        .map(|(component, count)| {
            let pitches: Vec<String> = component
                .sound_event()
                .notes()
                .iter()
                .map(|note| note.pitch.to_string())
                .collect();
            format!("{}x{}", pitches.join("+"), count)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Which part of the training data a model speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Voice {
    Instrument(u8),
    /// Every instrument merged into one timeline.
    Mixed,
}

/// A trained model plus what the writer needs to play it back.
#[derive(Debug, Clone)]
pub struct VoiceModel {
    pub voice: Voice,
    /// Program for the output track.
    pub instrument: u8,
    /// Channel of the first training track for this voice.
    pub channel: u8,
    pub model: NGramModel,
}

/// One model per voice, ordered by voice.
#[derive(Debug, Clone)]
pub struct ModelSet {
    n: usize,
    voices: BTreeMap<Voice, VoiceModel>,
}

impl ModelSet {
    pub fn n(&self) -> usize {
        self.n
    }

    pub fn get(&self, voice: Voice) -> Option<&VoiceModel> {
        self.voices.get(&voice)
    }

    pub fn voices(&self) -> impl Iterator<Item = &VoiceModel> + '_ {
        self.voices.values()
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }
}

#[derive(Debug, Clone)]
struct VoiceBuilder {
    instrument: u8,
    channel: u8,
    builder: NGramBuilder,
}

/// Trains a [`ModelSet`] from transcripts.
#[derive(Debug, Clone)]
pub struct ModelSetBuilder {
    n: usize,
    mixing: ChannelMixingPolicy,
    voices: BTreeMap<Voice, VoiceBuilder>,
}

impl ModelSetBuilder {
    pub fn new(n: usize, mixing: ChannelMixingPolicy) -> crate::Result<Self> {
        check_size(n)?;
        Ok(Self::with_size(n, mixing))
    }

    fn with_size(n: usize, mixing: ChannelMixingPolicy) -> Self {
        Self {
            n,
            mixing,
            voices: BTreeMap::new(),
        }
    }

    fn add_voice_track(&mut self, voice: Voice, track: &Track) {
        let n = self.n;
        let entry = self.voices.entry(voice).or_insert_with(|| VoiceBuilder {
            instrument: track.instrument(),
            channel: track.channel(),
            builder: NGramBuilder::with_size(n),
        });
        let recorded = entry.builder.add_track(track);
        debug!(?voice, sound_events = track.len(), frames = recorded, "counted track");
    }

    pub fn add_transcript(&mut self, transcript: &Transcript) {
        match self.mixing {
            ChannelMixingPolicy::NoMix => {
                for track in transcript.tracks() {
                    self.add_voice_track(Voice::Instrument(track.instrument()), track);
                }
            }
            ChannelMixingPolicy::Mix => {
                if let Some(track) = transcript.combined_track() {
                    self.add_voice_track(Voice::Mixed, &track);
                }
            }
        }
    }

    /// Fold in a builder trained on later input. Voices already present keep
    /// their instrument and channel.
    pub fn merge(&mut self, other: ModelSetBuilder) -> crate::Result<()> {
        for (voice, incoming) in other.voices {
            match self.voices.get_mut(&voice) {
                Some(existing) => existing.builder.merge(incoming.builder)?,
                None => {
                    self.voices.insert(voice, incoming);
                }
            }
        }
        Ok(())
    }

    pub fn build(self) -> ModelSet {
        let voices = self
            .voices
            .into_iter()
            .map(|(voice, vb)| {
                let model = vb.builder.build();
                debug!(
                    ?voice,
                    frames = model.len(),
                    occurrences = model.total_count(),
                    elements = model.distinct_elements(),
                    top = %element_summary(&model, 5),
                    "built model"
                );
                (
                    voice,
                    VoiceModel {
                        voice,
                        instrument: vb.instrument,
                        channel: vb.channel,
                        model,
                    },
                )
            })
            .collect();

        ModelSet { n: self.n, voices }
    }
}

/// Train on every transcript in parallel, then merge in input order so the
/// frame insertion order (and with it every tie-break) is deterministic.
pub fn train(
    transcripts: &[Transcript],
    n: usize,
    mixing: ChannelMixingPolicy,
) -> crate::Result<ModelSet> {
    let mut merged = ModelSetBuilder::new(n, mixing)?;

    let partials: Vec<ModelSetBuilder> = transcripts
        .par_iter()
        .map(|transcript| {
            let mut builder = ModelSetBuilder::with_size(n, mixing);
            builder.add_transcript(transcript);
            builder
        })
        .collect();

    for partial in partials {
        merged.merge(partial)?;
    }

    Ok(merged.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::{Note, SoundEventBuilder, Tick};
    use crate::track::TrackBuilder;
    use pretty_assertions::assert_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn component(pitch: u8) -> FrameComponent {
        let mut builder = SoundEventBuilder::new(0);
        builder.push(Note::new(0, pitch, 90, 0).with_duration(100));
        FrameComponent::from_sound_event(builder.finalize())
    }

    fn frame(pitches: &[u8]) -> Frame {
        Frame::new(pitches.iter().map(|p| component(*p)).collect())
    }

    fn model(n: usize, sequences: &[&[u8]]) -> NGramModel {
        let mut builder = NGramBuilder::new(n).unwrap();
        for seq in sequences {
            let components: Vec<FrameComponent> = seq.iter().map(|p| component(*p)).collect();
            builder.add_components(&components);
        }
        builder.build()
    }

    fn melody_track(instrument: u8, pitches: &[u8]) -> Track {
        let mut builder = TrackBuilder::new();
        for (i, pitch) in pitches.iter().enumerate() {
            builder.add_note(Note::new(i as Tick * 100, *pitch, 90, 0).with_duration(100));
        }
        builder.build(instrument)
    }

    #[test]
    fn element_histogram_ranks_most_frequent_first() {
        let m = model(2, &[&[60, 62, 60, 64, 60, 62]]);
        let top: Vec<(u8, u64)> = m
            .top_elements(2)
            .iter()
            .map(|(c, n)| (c.sound_event().notes()[0].pitch, *n))
            .collect();
        assert_eq!(top, vec![(60, 3), (62, 2)]);
        assert_eq!(m.element_count(&component(64)), 1);
        assert_eq!(m.distinct_elements(), 3);
        assert_eq!(element_summary(&m, 3), "60x3 62x2 64x1");
    }

    #[test]
    fn counts_every_window_once() {
        let m = model(2, &[&[1, 2, 3, 4]]);
        assert_eq!(m.len(), 3);
        assert_eq!(m.count(&frame(&[1, 2])), 1);
        assert_eq!(m.count(&frame(&[2, 3])), 1);
        assert_eq!(m.count(&frame(&[3, 4])), 1);
        assert_eq!(m.count(&frame(&[1, 3])), 0);
        assert_eq!(m.total_count(), 3);
    }

    #[test]
    fn windows_reset_between_tracks() {
        let m = model(3, &[&[1, 2], &[3, 4, 5]]);
        assert_eq!(m.len(), 1);
        assert_eq!(m.count(&frame(&[3, 4, 5])), 1);
        assert_eq!(m.element_count(&component(1)), 1);
    }

    #[test]
    fn melody_example_distribution() {
        let mut builder = NGramBuilder::new(2).unwrap();
        assert_eq!(builder.add_track(&melody_track(0, &[60, 62, 64, 62])), 3);
        let m = builder.build();

        assert_eq!(m.count(&frame(&[60, 62])), 1);
        assert_eq!(m.count(&frame(&[62, 64])), 1);
        assert_eq!(m.count(&frame(&[64, 62])), 1);
        assert_eq!(m.element_count(&component(62)), 2);
        assert_eq!(m.first_frame().unwrap(), &frame(&[60, 62]));
    }

    #[test]
    fn continuations_rank_by_count_then_first_seen() {
        let m = model(2, &[&[1, 2, 1, 3, 1, 3, 1, 4]]);
        let ranked: Vec<(Frame, u64)> = m
            .frames_starting_with(&component(1))
            .into_iter()
            .map(|(f, c)| (f.clone(), c))
            .collect();
        assert_eq!(
            ranked,
            vec![(frame(&[1, 3]), 2), (frame(&[1, 2]), 1), (frame(&[1, 4]), 1)]
        );
        assert_eq!(m.best_continuation(&component(1)), Some(&frame(&[1, 3])));
        assert_eq!(m.best_continuation(&component(9)), None);
        assert!(m.frames_starting_with(&component(9)).is_empty());
    }

    #[test]
    fn empty_model_reports_no_data() {
        let m = model(4, &[&[1, 2, 3]]);
        assert!(m.is_empty());
        assert!(matches!(m.first_frame(), Err(crate::Error::EmptyModel)));
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(matches!(m.random_frame(&mut rng), Err(crate::Error::EmptyModel)));
    }

    #[test]
    fn rejects_unigrams() {
        assert!(matches!(
            NGramBuilder::new(1),
            Err(crate::Error::InvalidConfig(_))
        ));
        assert!(ModelSetBuilder::new(0, ChannelMixingPolicy::NoMix).is_err());
    }

    #[test]
    fn merge_preserves_first_seen_order() {
        let mut a = NGramBuilder::new(2).unwrap();
        a.add_components(&[component(1), component(2)]);
        let mut b = NGramBuilder::new(2).unwrap();
        b.add_components(&[component(5), component(6), component(1), component(2)]);
        a.merge(b).unwrap();

        let m = a.build();
        assert_eq!(m.first_frame().unwrap(), &frame(&[1, 2]));
        assert_eq!(m.count(&frame(&[1, 2])), 2);
        assert_eq!(m.stats(1).unwrap().insertion_index, 1);
        assert_eq!(m.frame(1), Some(&frame(&[5, 6])));

        let mut c = NGramBuilder::new(2).unwrap();
        assert!(c.merge(NGramBuilder::new(3).unwrap()).is_err());
    }

    #[test]
    fn train_builds_one_model_per_instrument() {
        let mut first = Transcript::default();
        first.add_track(melody_track(0, &[60, 62, 64]));
        first.add_track(melody_track(40, &[70, 71]));
        let mut second = Transcript::default();
        second.add_track(melody_track(0, &[60, 62, 64]));

        let set = train(&[first.clone(), second], 2, ChannelMixingPolicy::NoMix).unwrap();
        assert_eq!(set.len(), 2);
        let piano = &set.get(Voice::Instrument(0)).unwrap().model;
        assert_eq!(piano.count(&frame(&[60, 62])), 2);
        assert_eq!(set.get(Voice::Instrument(40)).unwrap().model.len(), 1);

        let mixed = train(&[first], 2, ChannelMixingPolicy::Mix).unwrap();
        assert_eq!(mixed.len(), 1);
        assert!(mixed.get(Voice::Mixed).is_some());
    }
}
