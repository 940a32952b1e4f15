//! Run-time policies, passed explicitly through constructors.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the generator picks the next frame among those that continue the
/// last emitted component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Most frequent continuation; ties go to the frame seen first in training.
    #[default]
    HighestCount,
    /// Uniform among continuations.
    Random,
    /// Weighted by frame count.
    Probabilistic,
}

/// Whether frames may span the tracks of different instruments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelMixingPolicy {
    /// One model per instrument.
    #[default]
    NoMix,
    /// All tracks of a song merged into one timeline and one model.
    Mix,
}

/// Which input's song meta the output file copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataResolutionPolicy {
    #[default]
    FirstSong,
    /// Second input; falls back to the first when only one was given.
    SecondSong,
}

/// What happens when input violates the expected file layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationPolicy {
    /// First violation aborts the load.
    #[default]
    Strict,
    /// Violations are logged and the offending events skipped.
    Lenient,
}

/// All policies for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PolicyConfiguration {
    pub selection: SelectionPolicy,
    pub channel_mixing: ChannelMixingPolicy,
    pub metadata_resolution: MetadataResolutionPolicy,
    pub validation: ValidationPolicy,
}

/// Error for unrecognised policy names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} policy '{value}' (expected one of: {expected})")]
pub struct ParsePolicyError {
    kind: &'static str,
    value: String,
    expected: &'static str,
}

macro_rules! policy_names {
    ($ty:ty, $kind:literal, { $($name:literal => $variant:path),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($variant => $name,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = ParsePolicyError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
                match normalized.as_str() {
                    $($name => Ok($variant),)+
                    _ => Err(ParsePolicyError {
                        kind: $kind,
                        value: s.to_string(),
                        expected: concat!($($name, " "),+),
                    }),
                }
            }
        }
    };
}

policy_names!(SelectionPolicy, "selection", {
    "highest_count" => SelectionPolicy::HighestCount,
    "random" => SelectionPolicy::Random,
    "probabilistic" => SelectionPolicy::Probabilistic,
});

policy_names!(ChannelMixingPolicy, "channel mixing", {
    "no_mix" => ChannelMixingPolicy::NoMix,
    "mix" => ChannelMixingPolicy::Mix,
});

policy_names!(MetadataResolutionPolicy, "metadata resolution", {
    "first_song" => MetadataResolutionPolicy::FirstSong,
    "second_song" => MetadataResolutionPolicy::SecondSong,
});

policy_names!(ValidationPolicy, "validation", {
    "strict" => ValidationPolicy::Strict,
    "lenient" => ValidationPolicy::Lenient,
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_dashes_and_case() {
        assert_eq!(
            "Highest-Count".parse::<SelectionPolicy>().unwrap(),
            SelectionPolicy::HighestCount
        );
        assert_eq!("mix".parse::<ChannelMixingPolicy>().unwrap(), ChannelMixingPolicy::Mix);
        assert_eq!(
            "second_song".parse::<MetadataResolutionPolicy>().unwrap(),
            MetadataResolutionPolicy::SecondSong
        );
    }

    #[test]
    fn parse_error_lists_choices() {
        let err = "loudest".parse::<SelectionPolicy>().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("loudest"));
        assert!(msg.contains("probabilistic"));
    }

    #[test]
    fn display_parses_back() {
        for policy in [
            SelectionPolicy::HighestCount,
            SelectionPolicy::Random,
            SelectionPolicy::Probabilistic,
        ] {
            assert_eq!(policy.to_string().parse::<SelectionPolicy>().unwrap(), policy);
        }
        assert_eq!(ValidationPolicy::default().to_string(), "strict");
        assert_eq!(ChannelMixingPolicy::NoMix.to_string(), "no_mix");
    }
}
