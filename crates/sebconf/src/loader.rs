//! Config file discovery, layering, and environment variable overlay.

use crate::{ConfigError, SebConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Environment variables that override config values.
pub const ENV_NGRAM_SIZE: &str = "SEBASTIAN_NGRAM_SIZE";
pub const ENV_LENGTH: &str = "SEBASTIAN_LENGTH";
pub const ENV_SEED: &str = "SEBASTIAN_SEED";
pub const ENV_SELECTION: &str = "SEBASTIAN_SELECTION";
pub const ENV_LOG_LEVEL: &str = "SEBASTIAN_LOG_LEVEL";

/// Where the effective config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations, in load order.
///
/// An explicit `cli_path` replaces `./sebastian.toml` and is returned even
/// when it does not exist, so loading it reports the missing file.
pub fn discover_config_files(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/sebastian/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("sebastian/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    match cli_path {
        Some(path) => files.push(path.to_path_buf()),
        None => {
            let local = PathBuf::from("sebastian.toml");
            if local.exists() {
                files.push(local);
            }
        }
    }

    files
}

pub fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    contents
        .parse()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Deep-merge `overlay` into `base`. Tables merge key by key; any other
/// value in `overlay` replaces the one in `base`.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Layer `files` in order and deserialize the result over the defaults.
pub fn load_files(files: &[PathBuf]) -> Result<SebConfig, ConfigError> {
    let mut merged = toml::Table::new();
    for path in files {
        merge_tables(&mut merged, read_table(path)?);
    }

    let origin = files
        .last()
        .cloned()
        .unwrap_or_else(|| PathBuf::from("<defaults>"));
    let mut config: SebConfig =
        toml::Value::Table(merged)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse {
                path: origin,
                message: e.to_string(),
            })?;

    for file in &mut config.input.files {
        *file = expand_path(&file.to_string_lossy());
    }
    config.input.output = expand_path(&config.input.output.to_string_lossy());
    Ok(config)
}

/// Apply `SEBASTIAN_*` overrides from the process environment.
pub fn apply_env_overrides(
    config: &mut SebConfig,
    sources: &mut ConfigSources,
) -> Result<(), ConfigError> {
    apply_overrides(config, sources, env::vars())
}

/// Apply overrides from `vars`. Unrelated variables are ignored.
pub fn apply_overrides<I>(
    config: &mut SebConfig,
    sources: &mut ConfigSources,
    vars: I,
) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        match key.as_str() {
            ENV_NGRAM_SIZE => config.model.ngram_size = parse_env(&key, &value)?,
            ENV_LENGTH => config.generation.length = parse_env(&key, &value)?,
            ENV_SEED => config.generation.seed = Some(parse_env(&key, &value)?),
            ENV_SELECTION => config.policies.selection = value,
            ENV_LOG_LEVEL => config.telemetry.log_level = value,
            _ => continue,
        }
        sources.env_overrides.push(key);
    }
    Ok(())
}

fn parse_env<T>(var: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        var: var.to_string(),
        message: e.to_string(),
    })
}

/// Expand a leading `~/` to the home directory.
pub fn expand_path(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => directories::BaseDirs::new()
            .map(|d| d.home_dir().join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LengthUnit;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn toml_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let file = toml_file("[model]\nngram_size = 3\n");
        let config = load_files(&[file.path().to_path_buf()]).unwrap();

        assert_eq!(config.model.ngram_size, 3);
        assert_eq!(config.generation.length, 200);
        assert_eq!(config.policies.validation, "strict");
    }

    #[test]
    fn later_files_win_key_by_key() {
        let system = toml_file(
            r#"
[generation]
length = 64
seed = 7

[policies]
selection = "random"
"#,
        );
        let local = toml_file(
            r#"
[generation]
length_unit = "ticks"
length = 1920

[telemetry]
log_level = "debug"
"#,
        );
        let config =
            load_files(&[system.path().to_path_buf(), local.path().to_path_buf()]).unwrap();

        assert_eq!(config.generation.length, 1920);
        assert_eq!(config.generation.length_unit, LengthUnit::Ticks);
        assert_eq!(config.generation.seed, Some(7));
        assert_eq!(config.policies.selection, "random");
        assert_eq!(config.telemetry.log_level, "debug");
    }

    #[test]
    fn parse_errors_name_the_file() {
        let file = toml_file("[model\nngram_size = ");
        let err = load_files(&[file.path().to_path_buf()]).unwrap_err();
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn wrong_types_are_rejected() {
        let file = toml_file("[model]\nngram_size = \"four\"\n");
        assert!(matches!(
            load_files(&[file.path().to_path_buf()]),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let path = PathBuf::from("/nonexistent/sebastian.toml");
        let files = discover_config_files(Some(&path));
        assert_eq!(files.last(), Some(&path));
        assert!(matches!(
            load_files(&files),
            Err(ConfigError::FileRead { .. })
        ));
    }

    #[test]
    fn env_overrides_apply_and_are_recorded() {
        let mut config = SebConfig::default();
        let mut sources = ConfigSources::default();
        apply_overrides(
            &mut config,
            &mut sources,
            vars(&[
                ("SEBASTIAN_NGRAM_SIZE", "5"),
                ("SEBASTIAN_SEED", "99"),
                ("SEBASTIAN_SELECTION", "probabilistic"),
                ("HOME", "/root"),
            ]),
        )
        .unwrap();

        assert_eq!(config.model.ngram_size, 5);
        assert_eq!(config.generation.seed, Some(99));
        assert_eq!(config.policies.selection, "probabilistic");
        assert_eq!(
            sources.env_overrides,
            vec!["SEBASTIAN_NGRAM_SIZE", "SEBASTIAN_SEED", "SEBASTIAN_SELECTION"]
        );
    }

    #[test]
    fn bad_env_number_is_an_error() {
        let mut config = SebConfig::default();
        let mut sources = ConfigSources::default();
        let err = apply_overrides(
            &mut config,
            &mut sources,
            vars(&[("SEBASTIAN_LENGTH", "long")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("SEBASTIAN_LENGTH"));
    }

    #[test]
    fn merge_replaces_scalars_and_arrays() {
        let mut base: toml::Table = "a = 1\n[t]\nx = [1, 2]\ny = 'keep'\n".parse().unwrap();
        let overlay: toml::Table = "a = 2\n[t]\nx = [3]\n".parse().unwrap();
        merge_tables(&mut base, overlay);

        assert_eq!(base["a"].as_integer(), Some(2));
        assert_eq!(base["t"]["x"].as_array().map(|a| a.len()), Some(1));
        assert_eq!(base["t"]["y"].as_str(), Some("keep"));
    }

    #[test]
    fn expand_path_handles_tilde() {
        let expanded = expand_path("~/midi/out.mid");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert_eq!(expand_path("/abs/out.mid"), PathBuf::from("/abs/out.mid"));
    }
}
