//! End-to-end remixing: load transcripts, train, generate, schedule, encode.

use crate::generator::{generate_transcript, GenerationStats, GenerationTarget, GeneratorConfig};
use crate::meta::SongMeta;
use crate::ngram::train;
use crate::policy::{MetadataResolutionPolicy, PolicyConfiguration, ValidationPolicy};
use crate::reader::load_transcript;
use crate::scheduler::{schedule, PatternSchedule};
use crate::transcript::Transcript;
use crate::writer::encode;
use rayon::prelude::*;
use std::path::PathBuf;
use tracing::info;

/// Settings for one remix run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub ngram_size: usize,
    pub target: GenerationTarget,
    pub seed: Option<u64>,
    pub max_iterations: usize,
    pub loop_window: usize,
    pub loop_threshold: usize,
    pub policies: PolicyConfiguration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let generator = GeneratorConfig::default();
        Self {
            ngram_size: 4,
            target: generator.target,
            seed: generator.seed,
            max_iterations: generator.max_iterations,
            loop_window: generator.loop_window,
            loop_threshold: generator.loop_threshold,
            policies: PolicyConfiguration::default(),
        }
    }
}

impl PipelineConfig {
    pub fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            target: self.target,
            selection: self.policies.selection,
            seed: self.seed,
            max_iterations: self.max_iterations,
            loop_window: self.loop_window,
            loop_threshold: self.loop_threshold,
        }
    }
}

/// Result of a remix run.
#[derive(Debug, Clone)]
pub struct RemixOutput {
    /// Encoded SMF bytes.
    pub bytes: Vec<u8>,
    pub schedule: PatternSchedule,
    pub stats: GenerationStats,
}

/// Load every file in parallel. Order of the result follows `paths`.
pub fn load_transcripts(
    paths: &[PathBuf],
    validation: ValidationPolicy,
) -> crate::Result<Vec<Transcript>> {
    if paths.is_empty() {
        return Err(crate::Error::NoInput);
    }
    paths
        .par_iter()
        .map(|path| load_transcript(path, validation))
        .collect()
}

/// Song meta for the output, per the metadata resolution policy.
pub fn resolve_meta(transcripts: &[Transcript], policy: MetadataResolutionPolicy) -> SongMeta {
    let chosen = match policy {
        MetadataResolutionPolicy::FirstSong => transcripts.first(),
        MetadataResolutionPolicy::SecondSong => transcripts.get(1).or_else(|| transcripts.first()),
    };
    chosen.map(|t| t.meta.clone()).unwrap_or_default()
}

/// Train on `transcripts` and produce a new encoded song.
pub fn remix(transcripts: &[Transcript], config: &PipelineConfig) -> crate::Result<RemixOutput> {
    if transcripts.is_empty() {
        return Err(crate::Error::NoInput);
    }

    let models = train(
        transcripts,
        config.ngram_size,
        config.policies.channel_mixing,
    )?;
    info!(
        inputs = transcripts.len(),
        voices = models.len(),
        n = models.n(),
        "trained models"
    );

    let meta = resolve_meta(transcripts, config.policies.metadata_resolution);
    let generated = generate_transcript(&models, meta, &config.generator_config())?;
    let stats = generated.stats();

    let schedule = schedule(&generated);
    let bytes = encode(&schedule)?;
    info!(
        tracks = schedule.tracks.len(),
        bytes = bytes.len(),
        frames = stats.frames_selected,
        fallbacks = stats.fallbacks,
        loop_escapes = stats.loop_escapes,
        "encoded output"
    );

    Ok(RemixOutput {
        bytes,
        schedule,
        stats,
    })
}

pub fn remix_files(paths: &[PathBuf], config: &PipelineConfig) -> crate::Result<RemixOutput> {
    let transcripts = load_transcripts(paths, config.policies.validation)?;
    remix(&transcripts, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(resolution: u16) -> Transcript {
        Transcript::new(SongMeta {
            resolution,
            ..SongMeta::default()
        })
    }

    #[test]
    fn second_song_falls_back_to_first() {
        let one = vec![meta(96)];
        let two = vec![meta(96), meta(240)];

        assert_eq!(
            resolve_meta(&one, MetadataResolutionPolicy::SecondSong).resolution,
            96
        );
        assert_eq!(
            resolve_meta(&two, MetadataResolutionPolicy::SecondSong).resolution,
            240
        );
        assert_eq!(
            resolve_meta(&two, MetadataResolutionPolicy::FirstSong).resolution,
            96
        );
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(
            remix(&[], &PipelineConfig::default()),
            Err(crate::Error::NoInput)
        ));
        assert!(matches!(
            load_transcripts(&[], ValidationPolicy::Strict),
            Err(crate::Error::NoInput)
        ));
    }

    #[test]
    fn transcripts_without_notes_yield_empty_model() {
        let err = remix(&[meta(96)], &PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, crate::Error::EmptyModel));
    }

    #[test]
    fn generator_config_takes_selection_from_policies() {
        let mut config = PipelineConfig::default();
        config.policies.selection = crate::policy::SelectionPolicy::Probabilistic;
        assert_eq!(
            config.generator_config().selection,
            crate::policy::SelectionPolicy::Probabilistic
        );
    }
}
