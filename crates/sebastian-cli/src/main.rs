//! sebastian - train n-gram models on MIDI files and write new MIDI
//!
//! Subcommands:
//! - `sebastian generate <files>...` - Remix the inputs into a new file
//! - `sebastian inspect <file>` - Show what the transcript builder sees
//! - `sebastian config` - Print the effective configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use sebastian::{
    ChannelMixingPolicy, MetadataResolutionPolicy, SelectionPolicy, ValidationPolicy,
};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "sebastian")]
#[command(about = "Generate MIDI from n-gram models trained on existing MIDI files")]
#[command(version)]
struct Cli {
    /// Config file (replaces ./sebastian.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train on the input files and write a generated MIDI file
    Generate {
        /// Input MIDI files (default: [input] files from config)
        inputs: Vec<PathBuf>,

        /// Output path (default: [input] output from config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Frame length n (>= 2)
        #[arg(short = 'n', long)]
        ngram_size: Option<usize>,

        /// Target output length, in --unit
        #[arg(short, long)]
        length: Option<u64>,

        /// Unit of --length
        #[arg(short, long, value_enum)]
        unit: Option<Unit>,

        /// RNG seed for reproducible output
        #[arg(short, long)]
        seed: Option<u64>,

        /// highest_count, random or probabilistic
        #[arg(long)]
        selection: Option<SelectionPolicy>,

        /// no_mix or mix
        #[arg(long)]
        mixing: Option<ChannelMixingPolicy>,

        /// first_song or second_song
        #[arg(long)]
        metadata: Option<MetadataResolutionPolicy>,

        /// strict or lenient
        #[arg(long)]
        validation: Option<ValidationPolicy>,
    },

    /// Summarize how a MIDI file is transcribed
    Inspect {
        file: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,

        /// strict or lenient
        #[arg(long)]
        validation: Option<ValidationPolicy>,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Also list the files and environment variables that contributed
        #[arg(long)]
        sources: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Unit {
    SoundEvents,
    Ticks,
}

impl From<Unit> for sebconf::LengthUnit {
    fn from(unit: Unit) -> Self {
        match unit {
            Unit::SoundEvents => sebconf::LengthUnit::SoundEvents,
            Unit::Ticks => sebconf::LengthUnit::Ticks,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, sources) = sebconf::SebConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    // Logs go to stderr so `inspect --json` and `config` stay parseable.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(&config.telemetry.log_level)
            }),
        )
        .init();

    tracing::debug!(files = ?sources.files, env = ?sources.env_overrides, "configuration loaded");

    match cli.command {
        Commands::Generate {
            inputs,
            output,
            ngram_size,
            length,
            unit,
            seed,
            selection,
            mixing,
            metadata,
            validation,
        } => {
            if !inputs.is_empty() {
                config.input.files = inputs;
            }
            if let Some(output) = output {
                config.input.output = output;
            }
            if let Some(n) = ngram_size {
                config.model.ngram_size = n;
            }
            if let Some(length) = length {
                config.generation.length = length;
            }
            if let Some(unit) = unit {
                config.generation.length_unit = unit.into();
            }
            if seed.is_some() {
                config.generation.seed = seed;
            }
            config.validate().context("Invalid options")?;

            let mut pipeline = commands::pipeline_config(&config)?;
            if let Some(selection) = selection {
                pipeline.policies.selection = selection;
            }
            if let Some(mixing) = mixing {
                pipeline.policies.channel_mixing = mixing;
            }
            if let Some(metadata) = metadata {
                pipeline.policies.metadata_resolution = metadata;
            }
            if let Some(validation) = validation {
                pipeline.policies.validation = validation;
            }

            commands::generate(&config.input.files, &config.input.output, &pipeline)?;
        }
        Commands::Inspect {
            file,
            json,
            validation,
        } => {
            let validation = match validation {
                Some(v) => v,
                None => commands::parse_policy(&config.policies.validation, "validation")?,
            };
            commands::inspect(&file, validation, json)?;
        }
        Commands::Config { sources: show } => {
            print!("{}", config.to_toml());
            if show {
                println!();
                for file in &sources.files {
                    println!("# loaded: {}", file.display());
                }
                for var in &sources.env_overrides {
                    println!("# env: {}", var);
                }
            }
        }
    }

    Ok(())
}
