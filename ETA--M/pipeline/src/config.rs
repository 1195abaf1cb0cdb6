//! TOML configuration shared by the `trn` CLI and the HTTP server.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use shared_logging::LogLevel;

use crate::{
    cleaner::{Cleaner, NegativeDurationPolicy},
    model::{BoostingParams, LinearParams, ModelChoice},
    schema::UnknownCategoryPolicy,
    vectorizer::TfidfConfig,
};

/// Fully resolved pipeline configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Training data location.
    pub data: DataSettings,
    /// Artifact directory.
    pub artifacts: ArtifactSettings,
    /// Cleaning thresholds.
    pub cleaning: CleaningSettings,
    /// Categorical encoding behaviour.
    pub encoding: EncodingSettings,
    /// TF-IDF settings.
    pub vectorizer: TfidfConfig,
    /// Model selection and hyperparameters.
    pub model: ModelSettings,
    /// HTTP server settings.
    pub serve: ServeSettings,
    /// Log sink settings.
    pub logging: LoggingSettings,
    source_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data: DataSettings::default(),
            artifacts: ArtifactSettings::default(),
            cleaning: CleaningSettings::default(),
            encoding: EncodingSettings::default(),
            vectorizer: TfidfConfig::default(),
            model: ModelSettings::default(),
            serve: ServeSettings::default(),
            logging: LoggingSettings::default(),
            source_dir: PathBuf::from("."),
        }
    }
}

impl PipelineConfig {
    /// Loads and validates a TOML file. Relative paths resolve against the
    /// file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config {}", path.display()))?;
        let source_dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Self::from_toml(&raw, source_dir).with_context(|| format!("parsing {}", path.display()))
    }

    /// Parses a TOML document, resolving relative paths against `source_dir`.
    pub fn from_toml(raw: &str, source_dir: impl Into<PathBuf>) -> Result<Self> {
        let document: PipelineConfigSerde = toml::from_str(raw)?;
        let mut config = Self {
            data: document.data,
            artifacts: document.artifacts,
            cleaning: document.cleaning,
            encoding: document.encoding,
            vectorizer: document.vectorizer,
            model: document.model,
            serve: document.serve,
            logging: document.logging,
            source_dir: source_dir.into(),
        };
        config.validate()?;
        config.data.source = config.resolve_path(&config.data.source);
        config.artifacts.dir = config.resolve_path(&config.artifacts.dir);
        if let Some(log_path) = config.logging.path.take() {
            config.logging.path = Some(config.resolve_path(log_path));
        }
        Ok(config)
    }

    /// Rejects out-of-range values.
    pub fn validate(&self) -> Result<()> {
        let quantile = self.cleaning.outlier_quantile;
        if !(quantile > 0.0 && quantile <= 1.0) {
            bail!("cleaning.outlier_quantile must lie in (0, 1], got {quantile}");
        }
        if self.vectorizer.max_features == 0 {
            bail!("vectorizer.max_features must be positive");
        }
        let ratio = self.model.test_ratio;
        if !(ratio > 0.0 && ratio < 1.0) {
            bail!("model.test_ratio must lie in (0, 1), got {ratio}");
        }
        if self.model.gradient_boosting.rounds == 0 || self.model.gradient_boosting.max_depth == 0
        {
            bail!("model.gradient_boosting needs at least one round of depth >= 1");
        }
        for (name, rate) in [
            ("model.gradient_boosting.learning_rate", self.model.gradient_boosting.learning_rate),
            ("model.linear.learning_rate", self.model.linear.learning_rate),
        ] {
            if !(rate > 0.0 && rate.is_finite()) {
                bail!("{name} must be a positive number, got {rate}");
            }
        }
        if self.model.linear.epochs == 0 {
            bail!("model.linear.epochs must be positive");
        }
        if self.serve.bind.trim().is_empty() {
            bail!("serve.bind must not be empty");
        }
        self.logging.level()?;
        Ok(())
    }

    /// Resolves a path relative to the configuration file.
    #[must_use]
    pub fn resolve_path(&self, candidate: impl AsRef<Path>) -> PathBuf {
        let candidate = candidate.as_ref();
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.source_dir.join(candidate)
        }
    }

    /// Cleaner configured from `[cleaning]`.
    #[must_use]
    pub const fn cleaner(&self) -> Cleaner {
        Cleaner::new(
            self.cleaning.outlier_quantile,
            self.cleaning.negative_durations,
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PipelineConfigSerde {
    #[serde(default)]
    data: DataSettings,
    #[serde(default)]
    artifacts: ArtifactSettings,
    #[serde(default)]
    cleaning: CleaningSettings,
    #[serde(default)]
    encoding: EncodingSettings,
    #[serde(default)]
    vectorizer: TfidfConfig,
    #[serde(default)]
    model: ModelSettings,
    #[serde(default)]
    serve: ServeSettings,
    #[serde(default)]
    logging: LoggingSettings,
}

/// `[data]`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DataSettings {
    /// Ticket CSV.
    #[serde(default = "default_source")]
    pub source: PathBuf,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            source: default_source(),
        }
    }
}

/// `[artifacts]`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ArtifactSettings {
    /// Directory holding `schema.json`, `vectorizer.json` and `model.json`.
    #[serde(default = "default_artifact_dir")]
    pub dir: PathBuf,
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            dir: default_artifact_dir(),
        }
    }
}

/// `[cleaning]`
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct CleaningSettings {
    /// Quantile of the target above which rows are dropped.
    #[serde(default = "default_quantile")]
    pub outlier_quantile: f64,
    /// What to do with rows resolved before they were created.
    #[serde(default)]
    pub negative_durations: NegativeDurationPolicy,
}

impl Default for CleaningSettings {
    fn default() -> Self {
        Self {
            outlier_quantile: default_quantile(),
            negative_durations: NegativeDurationPolicy::default(),
        }
    }
}

/// `[encoding]`
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
pub struct EncodingSettings {
    /// Handling of values outside the encoding tables.
    #[serde(default)]
    pub unknown: UnknownCategoryPolicy,
}

/// `[model]`
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct ModelSettings {
    /// Which fitted model is persisted.
    #[serde(default)]
    pub kind: ModelChoice,
    /// Held-out share of the cleaned rows.
    #[serde(default = "default_test_ratio")]
    pub test_ratio: f64,
    /// Seed for the split.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// `[model.gradient_boosting]`
    #[serde(default)]
    pub gradient_boosting: BoostingParams,
    /// `[model.linear]`
    #[serde(default)]
    pub linear: LinearParams,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            kind: ModelChoice::default(),
            test_ratio: default_test_ratio(),
            seed: default_seed(),
            gradient_boosting: BoostingParams::default(),
            linear: LinearParams::default(),
        }
    }
}

/// `[serve]`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ServeSettings {
    /// Socket address the HTTP server binds.
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServeSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// `[logging]`
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LoggingSettings {
    /// JSON-lines log file; none keeps file logging off.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Minimum level written.
    #[serde(default = "default_level")]
    pub level: String,
    /// Mirror records to stderr.
    #[serde(default)]
    pub echo: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            path: None,
            level: default_level(),
            echo: false,
        }
    }
}

impl LoggingSettings {
    /// Parsed minimum level.
    pub fn level(&self) -> Result<LogLevel> {
        LogLevel::parse(&self.level)
            .with_context(|| format!("unknown logging.level `{}`", self.level))
    }
}

fn default_source() -> PathBuf {
    PathBuf::from("data/tickets.csv")
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("models")
}

const fn default_quantile() -> f64 {
    0.95
}

const fn default_test_ratio() -> f64 {
    0.2
}

const fn default_seed() -> u64 {
    42
}

fn default_bind() -> String {
    "127.0.0.1:8080".into()
}

fn default_level() -> String {
    "info".into()
}
