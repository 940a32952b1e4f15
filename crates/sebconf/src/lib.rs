//! Layered configuration for Sebastian.
//!
//! Files are loaded in order (later wins, key by key):
//! 1. `/etc/sebastian/config.toml` (system)
//! 2. `~/.config/sebastian/config.toml` (user)
//! 3. `./sebastian.toml`, or the path passed with `--config`
//! 4. Environment variables (`SEBASTIAN_*`)
//!
//! # Example Config
//!
//! ```toml
//! [input]
//! files = ["~/midi/bach/invention1.mid", "~/midi/bach/invention4.mid"]
//! output = "remix.mid"
//!
//! [model]
//! ngram_size = 4
//!
//! [generation]
//! length = 200
//! length_unit = "sound_events"
//! seed = 1685
//!
//! [policies]
//! selection = "probabilistic"
//! channel_mixing = "no_mix"
//! metadata_resolution = "first_song"
//! validation = "strict"
//!
//! [telemetry]
//! log_level = "info"
//! ```

pub mod loader;
pub mod sections;

pub use loader::{discover_config_files, ConfigSources};
pub use sections::{
    GenerationConfig, InputConfig, LengthUnit, ModelConfig, PoliciesConfig, TelemetryConfig,
};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value in {var}: {message}")]
    Env { var: String, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SebConfig {
    pub input: InputConfig,
    pub model: ModelConfig,
    pub generation: GenerationConfig,
    pub policies: PoliciesConfig,
    pub telemetry: TelemetryConfig,
}

impl SebConfig {
    /// Load from the standard locations plus environment.
    pub fn load() -> Result<Self> {
        Ok(Self::load_with_sources_from(None)?.0)
    }

    /// Like [`SebConfig::load`], with `config_path` replacing `./sebastian.toml`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self> {
        Ok(Self::load_with_sources_from(config_path)?.0)
    }

    pub fn load_with_sources_from(config_path: Option<&Path>) -> Result<(Self, ConfigSources)> {
        let mut sources = ConfigSources {
            files: loader::discover_config_files(config_path),
            ..ConfigSources::default()
        };
        let mut config = loader::load_files(&sources.files)?;
        loader::apply_env_overrides(&mut config, &mut sources)?;
        config.validate()?;
        Ok((config, sources))
    }

    /// Range checks serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.model.ngram_size < 2 {
            return Err(ConfigError::Invalid(format!(
                "model.ngram_size must be at least 2, got {}",
                self.model.ngram_size
            )));
        }
        if self.generation.length == 0 {
            return Err(ConfigError::Invalid(
                "generation.length must be greater than 0".to_string(),
            ));
        }
        if self.generation.max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "generation.max_iterations must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> String {
        let mut output = String::new();

        output.push_str("# Sebastian Configuration\n\n");

        output.push_str("[input]\n");
        output.push_str("files = [\n");
        for file in &self.input.files {
            output.push_str(&format!("    {},\n", quoted(&file.to_string_lossy())));
        }
        output.push_str("]\n");
        output.push_str(&format!(
            "output = {}\n",
            quoted(&self.input.output.to_string_lossy())
        ));

        output.push_str("\n[model]\n");
        output.push_str(&format!("ngram_size = {}\n", self.model.ngram_size));

        output.push_str("\n[generation]\n");
        output.push_str(&format!("length = {}\n", self.generation.length));
        output.push_str(&format!(
            "length_unit = \"{}\"\n",
            self.generation.length_unit.as_str()
        ));
        match self.generation.seed {
            Some(seed) => output.push_str(&format!("seed = {seed}\n")),
            None => output.push_str("# seed = 0\n"),
        }
        output.push_str(&format!(
            "max_iterations = {}\n",
            self.generation.max_iterations
        ));
        output.push_str(&format!("loop_window = {}\n", self.generation.loop_window));
        output.push_str(&format!(
            "loop_threshold = {}\n",
            self.generation.loop_threshold
        ));

        output.push_str("\n[policies]\n");
        output.push_str(&format!("selection = {}\n", quoted(&self.policies.selection)));
        output.push_str(&format!(
            "channel_mixing = {}\n",
            quoted(&self.policies.channel_mixing)
        ));
        output.push_str(&format!(
            "metadata_resolution = {}\n",
            quoted(&self.policies.metadata_resolution)
        ));
        output.push_str(&format!("validation = {}\n", quoted(&self.policies.validation)));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!("log_level = {}\n", quoted(&self.telemetry.log_level)));

        output
    }
}

fn quoted(s: &str) -> String {
    toml::Value::String(s.to_string()).to_string()
}
