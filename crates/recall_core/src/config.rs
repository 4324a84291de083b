//! Typed settings with explicit default/override merging.
//!
//! # Responsibility
//! - Define every tunable the core consumes: store mode, sync limits,
//!   scheduler parameters, deck profiles and logging.
//! - Build effective settings from defaults plus a sparse override file.
//!
//! # Invariants
//! - Merging only applies override fields that are present; absent or
//!   `null` fields keep the default.
//! - `Settings::validate()` must pass before settings reach the scheduler.

use crate::model::deck::{DeckProfile, DEFAULT_PROFILE_NAME};
use crate::model::validation::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// FSRS-4.5 default weight vector.
pub const DEFAULT_WEIGHTS: [f64; 17] = [
    0.4072, 1.1829, 3.1262, 15.4722, 7.2102, 0.5316, 1.0651, 0.0234, 1.616, 0.1544, 1.0824,
    1.9813, 0.0953, 0.2975, 2.2042, 0.2407, 2.9466,
];

/// Which `FlashcardStore` implementation to construct.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreMode {
    /// SQLite on the calling thread.
    #[default]
    Direct,
    /// SQLite on a dedicated worker thread behind a message channel.
    Worker,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSettings {
    pub mode: StoreMode,
    /// Database file; `None` opens an in-memory store.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Tag (without `#`) that marks a document as a deck; nested tags
    /// below it define further decks.
    pub deck_tag_prefix: String,
    /// Cards beyond this count in one deck are dropped with a warning.
    pub max_cards_per_deck: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            deck_tag_prefix: "flashcards".to_string(),
            max_cards_per_deck: 2_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    pub weights: [f64; 17],
    pub learning_steps_minutes: Vec<u32>,
    pub relearning_steps_minutes: Vec<u32>,
    pub maximum_interval_days: u32,
    pub enable_fuzz: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            weights: DEFAULT_WEIGHTS,
            learning_steps_minutes: vec![1, 10],
            relearning_steps_minutes: vec![10],
            maximum_interval_days: 36_500,
            enable_fuzz: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// One of `trace|debug|info|warn|error`.
    pub level: String,
    /// Absolute directory for rolling log files.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: crate::logging::default_log_level().to_string(),
            dir: None,
        }
    }
}

/// Effective settings for one core instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub store: StoreSettings,
    pub sync: SyncSettings,
    pub scheduler: SchedulerSettings,
    pub default_profile: DeckProfile,
    /// Named profiles decks may refer to.
    pub profiles: BTreeMap<String, DeckProfile>,
    pub logging: LoggingSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store: StoreSettings::default(),
            sync: SyncSettings::default(),
            scheduler: SchedulerSettings::default(),
            default_profile: DeckProfile::default(),
            profiles: BTreeMap::new(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Sparse settings as read from an override file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsOverride {
    pub store: Option<StoreOverride>,
    pub sync: Option<SyncOverride>,
    pub scheduler: Option<SchedulerOverride>,
    pub default_profile: Option<DeckProfileOverride>,
    pub profiles: Option<BTreeMap<String, DeckProfileOverride>>,
    pub logging: Option<LoggingOverride>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOverride {
    pub mode: Option<StoreMode>,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOverride {
    pub deck_tag_prefix: Option<String>,
    pub max_cards_per_deck: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerOverride {
    pub weights: Option<[f64; 17]>,
    pub learning_steps_minutes: Option<Vec<u32>>,
    pub relearning_steps_minutes: Option<Vec<u32>>,
    pub maximum_interval_days: Option<u32>,
    pub enable_fuzz: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeckProfileOverride {
    pub header_level: Option<u8>,
    pub new_cards_per_day: Option<u32>,
    pub new_cards_limit_enabled: Option<bool>,
    pub review_cards_per_day: Option<u32>,
    pub review_cards_limit_enabled: Option<bool>,
    pub request_retention: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingOverride {
    pub level: Option<String>,
    pub dir: Option<PathBuf>,
}

fn apply<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

impl StoreSettings {
    fn merged(mut self, overrides: StoreOverride) -> Self {
        apply(&mut self.mode, overrides.mode);
        if overrides.path.is_some() {
            self.path = overrides.path;
        }
        self
    }
}

impl SyncSettings {
    fn merged(mut self, overrides: SyncOverride) -> Self {
        apply(&mut self.deck_tag_prefix, overrides.deck_tag_prefix);
        apply(&mut self.max_cards_per_deck, overrides.max_cards_per_deck);
        self
    }
}

impl SchedulerSettings {
    fn merged(mut self, overrides: SchedulerOverride) -> Self {
        apply(&mut self.weights, overrides.weights);
        apply(
            &mut self.learning_steps_minutes,
            overrides.learning_steps_minutes,
        );
        apply(
            &mut self.relearning_steps_minutes,
            overrides.relearning_steps_minutes,
        );
        apply(
            &mut self.maximum_interval_days,
            overrides.maximum_interval_days,
        );
        apply(&mut self.enable_fuzz, overrides.enable_fuzz);
        self
    }
}

impl DeckProfile {
    /// Applies present override fields on top of `self`.
    pub fn merged(mut self, overrides: &DeckProfileOverride) -> Self {
        apply(&mut self.header_level, overrides.header_level);
        apply(&mut self.new_cards_per_day, overrides.new_cards_per_day);
        apply(
            &mut self.new_cards_limit_enabled,
            overrides.new_cards_limit_enabled,
        );
        apply(&mut self.review_cards_per_day, overrides.review_cards_per_day);
        apply(
            &mut self.review_cards_limit_enabled,
            overrides.review_cards_limit_enabled,
        );
        apply(&mut self.request_retention, overrides.request_retention);
        self
    }
}

impl LoggingSettings {
    fn merged(mut self, overrides: LoggingOverride) -> Self {
        apply(&mut self.level, overrides.level);
        if overrides.dir.is_some() {
            self.dir = overrides.dir;
        }
        self
    }
}

impl Settings {
    /// Builds effective settings: `defaults` with every present override
    /// field applied, section by section.
    ///
    /// Named profiles start from the existing profile of that name, or from
    /// the merged default profile when the name is new.
    pub fn merged(defaults: Settings, overrides: SettingsOverride) -> Settings {
        let Settings {
            store,
            sync,
            scheduler,
            default_profile,
            mut profiles,
            logging,
        } = defaults;

        let default_profile = match &overrides.default_profile {
            Some(profile) => default_profile.merged(profile),
            None => default_profile,
        };

        for (name, profile_override) in overrides.profiles.unwrap_or_default() {
            let base = profiles.remove(&name).unwrap_or_else(|| DeckProfile {
                name: name.clone(),
                ..default_profile.clone()
            });
            profiles.insert(name, base.merged(&profile_override));
        }

        Settings {
            store: store.merged(overrides.store.unwrap_or_default()),
            sync: sync.merged(overrides.sync.unwrap_or_default()),
            scheduler: scheduler.merged(overrides.scheduler.unwrap_or_default()),
            default_profile,
            profiles,
            logging: logging.merged(overrides.logging.unwrap_or_default()),
        }
    }

    /// True for the default profile and every named profile.
    pub fn has_profile(&self, name: &str) -> bool {
        name == DEFAULT_PROFILE_NAME || self.profiles.contains_key(name)
    }

    /// Resolves a profile by name, falling back to the default profile.
    pub fn profile(&self, name: &str) -> &DeckProfile {
        if name == DEFAULT_PROFILE_NAME {
            return &self.default_profile;
        }
        self.profiles.get(name).unwrap_or(&self.default_profile)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.default_profile.validate()?;
        for profile in self.profiles.values() {
            profile.validate()?;
        }

        let prefix = self.sync.deck_tag_prefix.trim();
        if prefix.is_empty() || prefix.contains(char::is_whitespace) {
            return Err(ValidationError::InvalidSetting {
                field: "sync.deck_tag_prefix",
                message: format!("`{prefix}` is not a usable tag"),
            });
        }
        if self.sync.max_cards_per_deck == 0 {
            return Err(ValidationError::InvalidSetting {
                field: "sync.max_cards_per_deck",
                message: "must be at least 1".to_string(),
            });
        }

        let scheduler = &self.scheduler;
        if scheduler
            .weights
            .iter()
            .any(|weight| !weight.is_finite() || *weight < 0.0)
        {
            return Err(ValidationError::InvalidSetting {
                field: "scheduler.weights",
                message: "weights must be finite and non-negative".to_string(),
            });
        }
        for (field, steps) in [
            (
                "scheduler.learning_steps_minutes",
                &scheduler.learning_steps_minutes,
            ),
            (
                "scheduler.relearning_steps_minutes",
                &scheduler.relearning_steps_minutes,
            ),
        ] {
            if steps.iter().any(|step| *step == 0) || steps.windows(2).any(|w| w[0] >= w[1]) {
                return Err(ValidationError::InvalidSetting {
                    field,
                    message: "steps must be positive and strictly increasing".to_string(),
                });
            }
        }
        if scheduler.maximum_interval_days == 0 {
            return Err(ValidationError::InvalidSetting {
                field: "scheduler.maximum_interval_days",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Failure loading settings from disk.
#[derive(Debug)]
pub enum SettingsError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: serde_json::Error },
    Invalid(ValidationError),
}

impl Display for SettingsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read settings `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "cannot parse settings `{}`: {source}", path.display())
            }
            Self::Invalid(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SettingsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Invalid(err) => Some(err),
        }
    }
}

impl From<ValidationError> for SettingsError {
    fn from(value: ValidationError) -> Self {
        Self::Invalid(value)
    }
}

/// Parses a JSON override document.
pub fn parse_settings_override(
    text: &str,
    path: &Path,
) -> Result<SettingsOverride, SettingsError> {
    serde_json::from_str(text).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Loads `path` as overrides on top of `Settings::default()` and validates
/// the result. A missing file yields the defaults.
pub fn load_settings(path: impl AsRef<Path>) -> Result<Settings, SettingsError> {
    let path = path.as_ref();
    let overrides = match std::fs::read_to_string(path) {
        Ok(text) => parse_settings_override(&text, path)?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => SettingsOverride::default(),
        Err(source) => {
            return Err(SettingsError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    let settings = Settings::merged(Settings::default(), overrides);
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::{
        parse_settings_override, DeckProfileOverride, Settings, SettingsOverride, StoreMode,
        SyncOverride,
    };
    use std::collections::BTreeMap;
    use std::path::Path;

    #[test]
    fn merge_keeps_defaults_for_absent_and_null_fields() {
        let overrides = parse_settings_override(
            r#"{
                "sync": { "deck_tag_prefix": "cards", "max_cards_per_deck": null },
                "store": { "mode": "worker" },
                "scheduler": null
            }"#,
            Path::new("inline.json"),
        )
        .unwrap();

        let merged = Settings::merged(Settings::default(), overrides);
        let defaults = Settings::default();
        assert_eq!(merged.sync.deck_tag_prefix, "cards");
        assert_eq!(
            merged.sync.max_cards_per_deck,
            defaults.sync.max_cards_per_deck
        );
        assert_eq!(merged.store.mode, StoreMode::Worker);
        assert_eq!(merged.scheduler, defaults.scheduler);
    }

    #[test]
    fn named_profiles_inherit_merged_default_profile() {
        let mut profiles = BTreeMap::new();
        profiles.insert(
            "intense".to_string(),
            DeckProfileOverride {
                new_cards_per_day: Some(50),
                ..DeckProfileOverride::default()
            },
        );
        let overrides = SettingsOverride {
            default_profile: Some(DeckProfileOverride {
                header_level: Some(3),
                ..DeckProfileOverride::default()
            }),
            profiles: Some(profiles),
            sync: Some(SyncOverride::default()),
            ..SettingsOverride::default()
        };

        let merged = Settings::merged(Settings::default(), overrides);
        let intense = merged.profile("intense");
        assert_eq!(intense.name, "intense");
        assert_eq!(intense.header_level, 3);
        assert_eq!(intense.new_cards_per_day, 50);
        assert_eq!(merged.profile("missing").name, "default");
        merged.validate().unwrap();
    }

    #[test]
    fn validate_rejects_unordered_steps_and_bad_retention() {
        let mut settings = Settings::default();
        settings.scheduler.learning_steps_minutes = vec![10, 1];
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.default_profile.request_retention = 0.999;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn load_settings_returns_defaults_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = super::load_settings(dir.path().join("absent.json")).unwrap();
        assert_eq!(settings, Settings::default());
    }
}
