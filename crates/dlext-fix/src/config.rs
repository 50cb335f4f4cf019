//! Fix arguments, validation, and error types.
//!
//! [`FixConfig::from_args`] parses the argument list of a LAMMPS
//! `fix ID group dlext ...` command. Only `space` is part of the historical
//! syntax; `phase`, `properties` and `map` are optional extensions with
//! defaults that reproduce the historical behavior.

use std::error::Error;
use std::fmt;

use dlext_capsule::DlextStatus;
use dlext_core::{DlextError, ExecutionSpace, ParticleProperty};
use dlext_view::MapStyle;
use indexmap::IndexSet;

use crate::phase::{Phase, PhaseMask};

/// Fix style name expected in the third argument.
pub const FIX_STYLE: &str = "dlext";

/// Configuration of one [`FixDLExt`](crate::FixDLExt).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FixConfig {
    /// Fix ID, unique within the engine's fix registry.
    pub id: String,
    /// Group the fix applies to. Recorded only; every local particle is
    /// exposed.
    pub group: String,
    /// Default execution space for requests. Default: host.
    pub space: ExecutionSpace,
    /// Phases at which the callback runs. Default: `post_force`.
    pub phases: PhaseMask,
    /// Properties that may be requested. Default: all of them.
    pub properties: IndexSet<ParticleProperty>,
    /// Tag map storage strategy. Default: auto.
    pub map_style: MapStyle,
}

impl FixConfig {
    /// Default configuration for fix `id` on group `all`.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            group: "all".to_owned(),
            space: ExecutionSpace::Host,
            phases: PhaseMask::only(Phase::PostForce),
            properties: ParticleProperty::ALL.into_iter().collect(),
            map_style: MapStyle::Auto,
        }
    }

    /// Parse `ID group dlext [keyword value]...`.
    ///
    /// Keywords are `space host|device`, `phase <name>` (repeatable; the
    /// first occurrence replaces the default), `properties a,b,...` and
    /// `map array|hash|yes`. The result is validated before returning.
    pub fn from_args(args: &[&str]) -> Result<Self, ConfigError> {
        let [id, group, style, rest @ ..] = args else {
            return Err(ConfigError::TooFewArguments { got: args.len() });
        };
        if *style != FIX_STYLE {
            return Err(ConfigError::WrongStyle {
                found: (*style).to_owned(),
            });
        }

        let mut config = Self::new(*id);
        config.group = (*group).to_owned();
        let mut phases = PhaseMask::EMPTY;

        for pair in rest.chunks(2) {
            let keyword = pair[0];
            let Some(&value) = pair.get(1) else {
                return Err(ConfigError::MissingValue {
                    keyword: keyword.to_owned(),
                });
            };
            let invalid = || ConfigError::InvalidValue {
                keyword: keyword.to_owned(),
                value: value.to_owned(),
            };
            match keyword {
                "space" => config.space = value.parse().map_err(|_| invalid())?,
                "phase" => phases.insert(value.parse().map_err(|_| invalid())?),
                "properties" => {
                    config.properties = value
                        .split(',')
                        .map(str::parse)
                        .collect::<Result<_, DlextError>>()
                        .map_err(|_| invalid())?;
                }
                "map" => config.map_style = value.parse().map_err(|_| invalid())?,
                other => {
                    return Err(ConfigError::UnknownKeyword {
                        keyword: other.to_owned(),
                    })
                }
            }
        }
        if !phases.is_empty() {
            config.phases = phases;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id.is_empty() {
            return Err(ConfigError::EmptyId);
        }
        if !self.id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ConfigError::InvalidId {
                id: self.id.clone(),
            });
        }
        if self.phases.is_empty() {
            return Err(ConfigError::NoPhases);
        }
        if self.properties.is_empty() {
            return Err(ConfigError::NoProperties);
        }
        Ok(())
    }

    /// Enable exactly `properties`.
    pub fn with_properties(mut self, properties: impl IntoIterator<Item = ParticleProperty>) -> Self {
        self.properties = properties.into_iter().collect();
        self
    }

    /// Run at `phases` instead of the default.
    pub fn with_phases(mut self, phases: impl IntoIterator<Item = Phase>) -> Self {
        self.phases = phases.into_iter().collect();
        self
    }

    /// Use `space` as the default request space.
    pub fn with_space(mut self, space: ExecutionSpace) -> Self {
        self.space = space;
        self
    }

    /// Use `style` for the tag map.
    pub fn with_map_style(mut self, style: MapStyle) -> Self {
        self.map_style = style;
        self
    }
}

// ── ConfigError ───────────────────────────────────────────────────

/// Errors from fix argument parsing or hook construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// Fewer than `ID group dlext`.
    TooFewArguments {
        /// Number of arguments given.
        got: usize,
    },
    /// Third argument is not `dlext`.
    WrongStyle {
        /// The style found.
        found: String,
    },
    /// Keyword without a value.
    MissingValue {
        /// The keyword.
        keyword: String,
    },
    /// Keyword value not recognized.
    InvalidValue {
        /// The keyword.
        keyword: String,
        /// The offending value.
        value: String,
    },
    /// Unrecognized keyword.
    UnknownKeyword {
        /// The keyword.
        keyword: String,
    },
    /// Empty fix ID.
    EmptyId,
    /// Fix ID with characters LAMMPS rejects.
    InvalidId {
        /// The offending ID.
        id: String,
    },
    /// No phase selected.
    NoPhases,
    /// No property enabled.
    NoProperties,
    /// The configured space is not available on this engine.
    Unsupported(DlextError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooFewArguments { got } => {
                write!(f, "illegal fix {FIX_STYLE} command: expected at least 3 arguments, got {got}")
            }
            Self::WrongStyle { found } => {
                write!(f, "fix style '{found}' is not '{FIX_STYLE}'")
            }
            Self::MissingValue { keyword } => write!(f, "keyword '{keyword}' needs a value"),
            Self::InvalidValue { keyword, value } => {
                write!(f, "invalid value '{value}' for keyword '{keyword}'")
            }
            Self::UnknownKeyword { keyword } => write!(f, "unknown keyword '{keyword}'"),
            Self::EmptyId => write!(f, "fix ID is empty"),
            Self::InvalidId { id } => {
                write!(f, "fix ID '{id}' must be alphanumeric or underscore")
            }
            Self::NoPhases => write!(f, "no phase selected"),
            Self::NoProperties => write!(f, "no property enabled"),
            Self::Unsupported(e) => write!(f, "unsupported: {e}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Unsupported(e) => Some(e),
            _ => None,
        }
    }
}

impl From<&ConfigError> for DlextStatus {
    fn from(e: &ConfigError) -> Self {
        match e {
            ConfigError::Unsupported(inner) => Self::from(inner),
            _ => Self::ConfigError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn historical_syntax_defaults() {
        let c = FixConfig::from_args(&["dl", "all", "dlext"]).unwrap();
        assert_eq!(c.id, "dl");
        assert_eq!(c.group, "all");
        assert_eq!(c.space, ExecutionSpace::Host);
        assert_eq!(c.phases, PhaseMask::only(Phase::PostForce));
        assert_eq!(c.properties.len(), ParticleProperty::COUNT);
        assert_eq!(c.map_style, MapStyle::Auto);
    }

    #[test]
    fn space_keyword() {
        let c = FixConfig::from_args(&["dl", "mobile", "dlext", "space", "device"]).unwrap();
        assert_eq!(c.space, ExecutionSpace::Device);
        assert_eq!(c.group, "mobile");
        assert_eq!(
            FixConfig::from_args(&["dl", "all", "dlext", "space", "gpu"]),
            Err(ConfigError::InvalidValue {
                keyword: "space".into(),
                value: "gpu".into(),
            })
        );
        assert_eq!(
            FixConfig::from_args(&["dl", "all", "dlext", "space"]),
            Err(ConfigError::MissingValue {
                keyword: "space".into()
            })
        );
    }

    #[test]
    fn extension_keywords() {
        let c = FixConfig::from_args(&[
            "dl",
            "all",
            "dlext",
            "phase",
            "pre_force",
            "phase",
            "end_of_step",
            "properties",
            "positions,forces,tags_map",
            "map",
            "hash",
        ])
        .unwrap();
        assert_eq!(c.phases.bits(), Phase::PreForce.bit() | Phase::EndOfStep.bit());
        assert_eq!(
            c.properties.iter().copied().collect::<Vec<_>>(),
            vec![
                ParticleProperty::Positions,
                ParticleProperty::Forces,
                ParticleProperty::TagsMap
            ]
        );
        assert_eq!(c.map_style, MapStyle::Hash);
    }

    #[test]
    fn rejects_malformed_commands() {
        assert_eq!(
            FixConfig::from_args(&["dl", "all"]),
            Err(ConfigError::TooFewArguments { got: 2 })
        );
        assert_eq!(
            FixConfig::from_args(&["dl", "all", "nve"]),
            Err(ConfigError::WrongStyle {
                found: "nve".into()
            })
        );
        assert_eq!(
            FixConfig::from_args(&["dl", "all", "dlext", "color", "red"]),
            Err(ConfigError::UnknownKeyword {
                keyword: "color".into()
            })
        );
        assert_eq!(
            FixConfig::from_args(&["d-l", "all", "dlext"]),
            Err(ConfigError::InvalidId { id: "d-l".into() })
        );
        assert!(matches!(
            FixConfig::from_args(&["dl", "all", "dlext", "properties", "spin"]),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn validate_catches_empty_sets() {
        assert_eq!(FixConfig::new("").validate(), Err(ConfigError::EmptyId));
        assert_eq!(
            FixConfig::new("dl").with_phases([]).validate(),
            Err(ConfigError::NoPhases)
        );
        assert_eq!(
            FixConfig::new("dl").with_properties([]).validate(),
            Err(ConfigError::NoProperties)
        );
    }

    #[test]
    fn status_codes() {
        assert_eq!(DlextStatus::from(&ConfigError::NoPhases), DlextStatus::ConfigError);
        let inner = DlextError::UnsupportedExecutionSpace {
            space: ExecutionSpace::Device,
        };
        assert_eq!(
            DlextStatus::from(&ConfigError::Unsupported(inner)),
            DlextStatus::UnsupportedExecutionSpace
        );
    }
}
