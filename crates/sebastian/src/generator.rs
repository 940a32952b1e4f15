//! Sequence generation from a trained model.
//!
//! The generator emits the first frame seen in training, then keeps looking
//! up frames that start with the last emitted component and appends
//! everything after their first component. A step with no continuation
//! jumps to a uniformly random frame; so does a step that re-selects a frame
//! too often within the recent window.

use crate::frame::FrameComponent;
use crate::meta::SongMeta;
use crate::ngram::{ModelSet, NGramModel, Voice};
use crate::note::Tick;
use crate::policy::SelectionPolicy;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{info, warn};

/// How much output to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationTarget {
    /// Number of sound events.
    SoundEvents(usize),
    /// Summed pause-to-next of the emitted sound events.
    Ticks(Tick),
}

impl GenerationTarget {
    fn is_zero(&self) -> bool {
        match self {
            GenerationTarget::SoundEvents(n) => *n == 0,
            GenerationTarget::Ticks(t) => *t == 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub target: GenerationTarget,
    pub selection: SelectionPolicy,
    /// Fixed seed for reproducible output; `None` draws from the OS.
    pub seed: Option<u64>,
    /// Upper bound on extension steps.
    pub max_iterations: usize,
    /// Number of recent selections remembered for loop detection.
    pub loop_window: usize,
    /// Selections of one frame within the window that trigger an escape.
    /// Zero disables loop detection.
    pub loop_threshold: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            target: GenerationTarget::SoundEvents(200),
            selection: SelectionPolicy::HighestCount,
            seed: None,
            max_iterations: 100_000,
            loop_window: 32,
            loop_threshold: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    Seeded,
    Extending,
    Done,
}

/// Counters for judging output quality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationStats {
    /// Extension steps taken.
    pub iterations: usize,
    /// Frames appended, including the seed frame.
    pub frames_selected: usize,
    /// Steps with no continuation that fell back to a random frame.
    pub fallbacks: usize,
    /// Random jumps forced by loop detection.
    pub loop_escapes: usize,
}

impl std::ops::AddAssign for GenerationStats {
    fn add_assign(&mut self, other: Self) {
        self.iterations += other.iterations;
        self.frames_selected += other.frames_selected;
        self.fallbacks += other.fallbacks;
        self.loop_escapes += other.loop_escapes;
    }
}

/// Single-voice generator.
#[derive(Debug)]
pub struct Generator<'m> {
    model: &'m NGramModel,
    config: GeneratorConfig,
    rng: ChaCha8Rng,
    state: GeneratorState,
    output: Vec<FrameComponent>,
    elapsed_ticks: Tick,
    recent: VecDeque<usize>,
    stats: GenerationStats,
}

impl<'m> Generator<'m> {
    /// Refuses to start on an empty model or a zero target.
    pub fn new(model: &'m NGramModel, config: GeneratorConfig) -> crate::Result<Self> {
        if model.is_empty() {
            return Err(crate::Error::EmptyModel);
        }
        if config.target.is_zero() {
            return Err(crate::Error::InvalidConfig(
                "generation target must be positive".to_string(),
            ));
        }

        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_os_rng(),
        };

        Ok(Self {
            model,
            config,
            rng,
            state: GeneratorState::Seeded,
            output: Vec::new(),
            elapsed_ticks: 0,
            recent: VecDeque::new(),
            stats: GenerationStats::default(),
        })
    }

    pub fn state(&self) -> GeneratorState {
        self.state
    }

    pub fn stats(&self) -> GenerationStats {
        self.stats
    }

    pub fn output(&self) -> &[FrameComponent] {
        &self.output
    }

    fn target_reached(&self) -> bool {
        match self.config.target {
            GenerationTarget::SoundEvents(n) => self.output.len() >= n,
            GenerationTarget::Ticks(t) => self.elapsed_ticks >= t,
        }
    }

    fn append(&mut self, components: &[FrameComponent]) {
        for component in components {
            self.elapsed_ticks += component.pause_to_next();
            self.output.push(component.clone());
        }
    }

    fn remember(&mut self, idx: usize) {
        if self.config.loop_window == 0 {
            return;
        }
        self.recent.push_back(idx);
        while self.recent.len() > self.config.loop_window {
            self.recent.pop_front();
        }
    }

    fn select(&mut self, last: &FrameComponent) -> crate::Result<usize> {
        let model = self.model;
        let candidates = model.candidates(last);
        if candidates.is_empty() {
            self.stats.fallbacks += 1;
            return model.random_index(&mut self.rng);
        }

        let idx = match self.config.selection {
            SelectionPolicy::HighestCount => candidates[0],
            SelectionPolicy::Random => candidates[self.rng.random_range(0..candidates.len())],
            SelectionPolicy::Probabilistic => {
                let count = |idx: usize| model.stats(idx).map(|s| s.count).unwrap_or(0);
                let total: u64 = candidates.iter().map(|idx| count(*idx)).sum();
                let draw = self.rng.random_range(0..=total);
                let mut cumulative = 0;
                let mut chosen = candidates[candidates.len() - 1];
                for idx in candidates {
                    cumulative += count(*idx);
                    if cumulative >= draw {
                        chosen = *idx;
                        break;
                    }
                }
                chosen
            }
        };
        Ok(idx)
    }

    fn escape_loop(&mut self, idx: usize) -> crate::Result<usize> {
        let threshold = self.config.loop_threshold;
        if threshold == 0 {
            return Ok(idx);
        }
        let repeats = self.recent.iter().filter(|r| **r == idx).count();
        if repeats < threshold {
            return Ok(idx);
        }

        self.stats.loop_escapes += 1;
        self.recent.clear();
        let replacement = self.model.random_index(&mut self.rng)?;
        warn!(frame = idx, repeats, replacement, "escaping repeated frame");
        Ok(replacement)
    }

    /// Advance the state machine by one step.
    pub fn step(&mut self) -> crate::Result<GeneratorState> {
        match self.state {
            GeneratorState::Done => {}
            GeneratorState::Seeded => {
                let model = self.model;
                let idx = model.first_index()?;
                if let Some(seed) = model.frame(idx) {
                    self.append(seed.components());
                }
                self.stats.frames_selected += 1;
                self.remember(idx);
                self.state = if self.target_reached() {
                    GeneratorState::Done
                } else {
                    GeneratorState::Extending
                };
            }
            GeneratorState::Extending => {
                if self.stats.iterations >= self.config.max_iterations {
                    return Err(crate::Error::GenerationBudgetExceeded {
                        iterations: self.stats.iterations,
                    });
                }
                self.stats.iterations += 1;

                let last = match self.output.last() {
                    Some(last) => last.clone(),
                    None => return Err(crate::Error::EmptyModel),
                };
                let idx = self.select(&last)?;
                let idx = self.escape_loop(idx)?;

                let model = self.model;
                if let Some(frame) = model.frame(idx) {
                    self.append(frame.tail());
                }
                self.stats.frames_selected += 1;
                self.remember(idx);

                if self.target_reached() {
                    self.state = GeneratorState::Done;
                }
            }
        }
        Ok(self.state)
    }

    /// Run to completion and return the emitted components.
    pub fn generate(mut self) -> crate::Result<(Vec<FrameComponent>, GenerationStats)> {
        while self.step()? != GeneratorState::Done {}
        Ok((self.output, self.stats))
    }
}

/// Generated output for one voice.
#[derive(Debug, Clone)]
pub struct GeneratedPart {
    pub voice: Voice,
    pub instrument: u8,
    pub channel: u8,
    pub components: Vec<FrameComponent>,
    pub stats: GenerationStats,
}

/// Every generated voice plus the song meta for the output file.
#[derive(Debug, Clone)]
pub struct GeneratedTranscript {
    pub meta: SongMeta,
    pub parts: Vec<GeneratedPart>,
}

impl GeneratedTranscript {
    pub fn stats(&self) -> GenerationStats {
        let mut total = GenerationStats::default();
        for part in &self.parts {
            total += part.stats;
        }
        total
    }
}

/// Run one generator per voice. Voice `i` uses `seed + i` so voices differ
/// but the whole run stays reproducible. Voices whose model is empty are
/// skipped; if every voice is empty the run fails.
pub fn generate_transcript(
    models: &ModelSet,
    meta: SongMeta,
    config: &GeneratorConfig,
) -> crate::Result<GeneratedTranscript> {
    let mut parts = Vec::new();

    for (ordinal, voice_model) in models.voices().enumerate() {
        if voice_model.model.is_empty() {
            warn!(
                voice = ?voice_model.voice,
                "no frame reached size {}, skipping voice",
                models.n()
            );
            continue;
        }

        let voice_config = GeneratorConfig {
            seed: config.seed.map(|s| s.wrapping_add(ordinal as u64)),
            ..config.clone()
        };
        let (components, stats) = Generator::new(&voice_model.model, voice_config)?.generate()?;
        info!(
            voice = ?voice_model.voice,
            sound_events = components.len(),
            iterations = stats.iterations,
            fallbacks = stats.fallbacks,
            loop_escapes = stats.loop_escapes,
            "generated voice"
        );

        parts.push(GeneratedPart {
            voice: voice_model.voice,
            instrument: voice_model.instrument,
            channel: voice_model.channel,
            components,
            stats,
        });
    }

    if parts.is_empty() {
        return Err(crate::Error::EmptyModel);
    }
    Ok(GeneratedTranscript { meta, parts })
}
