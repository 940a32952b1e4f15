//! Config sections. Every field has a default so partial files are fine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default inputs and output for `sebastian generate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// MIDI files to train on when none are given on the command line.
    pub files: Vec<PathBuf>,
    /// Where the generated file is written.
    pub output: PathBuf,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            output: PathBuf::from("sebastian.mid"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Frame length. Must be at least 2.
    pub ngram_size: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self { ngram_size: 4 }
    }
}

/// Unit of `generation.length`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthUnit {
    #[default]
    SoundEvents,
    Ticks,
}

impl LengthUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            LengthUnit::SoundEvents => "sound_events",
            LengthUnit::Ticks => "ticks",
        }
    }
}

impl std::str::FromStr for LengthUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "sound_events" | "events" => Ok(LengthUnit::SoundEvents),
            "ticks" => Ok(LengthUnit::Ticks),
            other => Err(format!(
                "unknown length unit '{other}' (expected sound_events or ticks)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub length: u64,
    pub length_unit: LengthUnit,
    /// Fixed RNG seed; unset means OS entropy.
    pub seed: Option<u64>,
    pub max_iterations: usize,
    pub loop_window: usize,
    /// 0 disables loop detection.
    pub loop_threshold: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            length: 200,
            length_unit: LengthUnit::SoundEvents,
            seed: None,
            max_iterations: 100_000,
            loop_window: 32,
            loop_threshold: 8,
        }
    }
}

/// Policy names as written in the file. The CLI turns them into the
/// library's policy enums so unknown names are reported with the file's
/// spelling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoliciesConfig {
    pub selection: String,
    pub channel_mixing: String,
    pub metadata_resolution: String,
    pub validation: String,
}

impl Default for PoliciesConfig {
    fn default() -> Self {
        Self {
            selection: "highest_count".to_string(),
            channel_mixing: "no_mix".to_string(),
            metadata_resolution: "first_song".to_string(),
            validation: "strict".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_unit_parses_loosely() {
        assert_eq!("ticks".parse::<LengthUnit>(), Ok(LengthUnit::Ticks));
        assert_eq!("Sound-Events".parse::<LengthUnit>(), Ok(LengthUnit::SoundEvents));
        assert!("bars".parse::<LengthUnit>().is_err());
    }
}
