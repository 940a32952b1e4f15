//! Subcommand implementations.

use anyhow::{Context, Result};
use sebastian::{
    load_transcript, remix_files, GenerationTarget, PipelineConfig, PolicyConfiguration,
    ValidationPolicy,
};
use sebconf::{LengthUnit, SebConfig};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

pub fn parse_policy<T>(value: &str, key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse()
        .with_context(|| format!("Invalid policies.{key} in configuration"))
}

/// Translate the file/env configuration into library settings.
pub fn pipeline_config(config: &SebConfig) -> Result<PipelineConfig> {
    let target = match config.generation.length_unit {
        LengthUnit::SoundEvents => GenerationTarget::SoundEvents(
            usize::try_from(config.generation.length)
                .context("generation.length does not fit in memory")?,
        ),
        LengthUnit::Ticks => GenerationTarget::Ticks(config.generation.length),
    };

    let policies = PolicyConfiguration {
        selection: parse_policy(&config.policies.selection, "selection")?,
        channel_mixing: parse_policy(&config.policies.channel_mixing, "channel_mixing")?,
        metadata_resolution: parse_policy(
            &config.policies.metadata_resolution,
            "metadata_resolution",
        )?,
        validation: parse_policy(&config.policies.validation, "validation")?,
    };

    Ok(PipelineConfig {
        ngram_size: config.model.ngram_size,
        target,
        seed: config.generation.seed,
        max_iterations: config.generation.max_iterations,
        loop_window: config.generation.loop_window,
        loop_threshold: config.generation.loop_threshold,
        policies,
    })
}

pub fn generate(inputs: &[PathBuf], output: &Path, config: &PipelineConfig) -> Result<()> {
    if inputs.is_empty() {
        anyhow::bail!("No input files: pass MIDI files or set [input] files in the config");
    }

    let remix = remix_files(inputs, config).context("Failed to generate")?;
    std::fs::write(output, &remix.bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!(
        output = %output.display(),
        iterations = remix.stats.iterations,
        "done"
    );
    println!(
        "Wrote {} ({} tracks, {} frames selected, {} fallbacks, {} loop escapes)",
        output.display(),
        remix.schedule.tracks.len(),
        remix.stats.frames_selected,
        remix.stats.fallbacks,
        remix.stats.loop_escapes,
    );
    Ok(())
}

pub fn inspect(file: &Path, validation: ValidationPolicy, json: bool) -> Result<()> {
    let transcript = load_transcript(file, validation)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let summary = transcript.summary();

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{}", file.display());
    println!(
        "  format {}, {} ticks per beat, {} tempo change(s)",
        summary.format, summary.resolution, summary.tempo_changes
    );
    if let Some(ts) = transcript.meta.time_signature {
        println!("  time signature {}", ts);
    }
    for track in &summary.tracks {
        println!(
            "  [{:>3}] {:<28} ch {:>2}  {:>5} events  {:>5} notes  {:>4} chords  ticks {}..{}",
            track.instrument,
            track.program_name,
            track.channel,
            track.sound_events,
            track.notes,
            track.chords,
            track.first_tick,
            track.last_tick,
        );
    }
    Ok(())
}
