//! # Stage Configuration
//!
//! `StageConfig` is read from TOML. Resolution order, later wins:
//!
//! 1. built-in defaults
//! 2. `--config <path>`, or `featurestage.toml` in the working directory
//! 3. environment (`FEATURESTAGE_HOME`, `FEATURESTAGE_UPSTREAM_RUN`)
//! 4. command-line flags
//!
//! ```toml
//! [run]
//! project = "credit-card-fraud-detection-test-33"
//! name = "feature-engineering"
//!
//! [gate]
//! project = "credit-card-fraud-detection"
//! field = "all_checks_passed"
//! # upstream_run = 12
//!
//! [input]
//! artifact = "processed_data.csv"
//! version = "latest"
//!
//! [output]
//! dataset_artifact = "engineered_data.csv"
//! transform_artifact = "preprocessor"
//! preview_rows = 5
//!
//! [features]
//! timestamp = "trans_date_trans_time"
//! label = "is_fraud"
//! categorical = ["category", "state"]
//! numeric = ["amt", "hour", "day_of_week"]
//!
//! [store]
//! home = ".featurestage"
//! ```

use crate::services::{ArtifactRef, RunId, VersionTag, validate_artifact_name};
use featurestage_core::primitives::{
    CATEGORICAL_FEATURES, LABEL_COLUMN, NUMERIC_FEATURES, PREVIEW_ROWS, TIMESTAMP_COLUMN,
};
use featurestage_core::{FeatureSpec, StageError};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "featurestage.toml";

/// Environment variable overriding `store.home`.
pub const ENV_HOME: &str = "FEATURESTAGE_HOME";

/// Environment variable overriding `gate.upstream_run`.
pub const ENV_UPSTREAM_RUN: &str = "FEATURESTAGE_UPSTREAM_RUN";

/// Maximum config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

// =============================================================================
// SECTIONS
// =============================================================================

/// The stage's own tracked run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunSection {
    pub project: String,
    pub name: String,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            project: "credit-card-fraud-detection-test-33".to_string(),
            name: "feature-engineering".to_string(),
        }
    }
}

/// Where the validation verdict comes from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GateSection {
    /// Project searched for the latest completed run when no explicit run is set.
    pub project: String,
    /// Boolean summary field holding the verdict.
    pub field: String,
    /// Explicit upstream run; preferred over the project lookup.
    pub upstream_run: Option<u64>,
}

impl Default for GateSection {
    fn default() -> Self {
        Self {
            project: "credit-card-fraud-detection".to_string(),
            field: "all_checks_passed".to_string(),
            upstream_run: None,
        }
    }
}

/// Input dataset artifact.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputSection {
    pub artifact: String,
    /// `latest`, `vN` or `N`.
    pub version: String,
}

impl Default for InputSection {
    fn default() -> Self {
        Self {
            artifact: "processed_data.csv".to_string(),
            version: "latest".to_string(),
        }
    }
}

/// Published artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSection {
    pub dataset_artifact: String,
    pub transform_artifact: String,
    /// Defaults to `<home>/staging`.
    pub staging_dir: Option<PathBuf>,
    pub preview_rows: usize,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            dataset_artifact: "engineered_data.csv".to_string(),
            transform_artifact: "preprocessor".to_string(),
            staging_dir: None,
            preview_rows: PREVIEW_ROWS,
        }
    }
}

/// Column names and feature lists.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeatureSection {
    pub timestamp: String,
    pub label: String,
    pub categorical: Vec<String>,
    pub numeric: Vec<String>,
}

impl Default for FeatureSection {
    fn default() -> Self {
        Self {
            timestamp: TIMESTAMP_COLUMN.to_string(),
            label: LABEL_COLUMN.to_string(),
            categorical: CATEGORICAL_FEATURES.iter().map(|s| s.to_string()).collect(),
            numeric: NUMERIC_FEATURES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Local service storage.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSection {
    pub home: PathBuf,
    /// Defaults to `<home>/tracking.redb`.
    pub tracking_db: Option<PathBuf>,
    /// Defaults to `<home>/artifacts`.
    pub artifact_root: Option<PathBuf>,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            home: PathBuf::from(".featurestage"),
            tracking_db: None,
            artifact_root: None,
        }
    }
}

// =============================================================================
// STAGE CONFIG
// =============================================================================

/// Complete stage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StageConfig {
    pub run: RunSection,
    pub gate: GateSection,
    pub input: InputSection,
    pub output: OutputSection,
    pub features: FeatureSection,
    pub store: StoreSection,
}

impl StageConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, StageError> {
        toml::from_str(text).map_err(|e| StageError::ConfigError(e.to_string()))
    }

    /// Load from `path`, or from `featurestage.toml` if it exists, or defaults.
    ///
    /// An explicit path that does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, StageError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.is_file() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let metadata = std::fs::metadata(&path).map_err(|e| {
            StageError::ConfigError(format!("cannot read '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(StageError::ConfigError(format!(
                "config file {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }

        let text = std::fs::read_to_string(&path).map_err(|e| {
            StageError::ConfigError(format!("cannot read '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply `FEATURESTAGE_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), StageError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), StageError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(home) = lookup(ENV_HOME).filter(|v| !v.is_empty()) {
            self.store.home = PathBuf::from(home);
        }
        if let Some(run) = lookup(ENV_UPSTREAM_RUN).filter(|v| !v.is_empty()) {
            let id = run.trim().parse::<u64>().map_err(|_| {
                StageError::ConfigError(format!("{} is not a run id: '{}'", ENV_UPSTREAM_RUN, run))
            })?;
            self.gate.upstream_run = Some(id);
        }
        Ok(())
    }

    /// Check every name and list.
    pub fn validate(&self) -> Result<(), StageError> {
        for (key, value) in [
            ("run.project", &self.run.project),
            ("run.name", &self.run.name),
            ("gate.project", &self.gate.project),
            ("gate.field", &self.gate.field),
            ("features.timestamp", &self.features.timestamp),
        ] {
            if value.trim().is_empty() {
                return Err(StageError::ConfigError(format!("{} is empty", key)));
            }
        }

        validate_artifact_name(&self.input.artifact)?;
        validate_artifact_name(&self.output.dataset_artifact)?;
        validate_artifact_name(&self.output.transform_artifact)?;
        self.input.version.parse::<VersionTag>()?;

        if self.output.preview_rows == 0 {
            return Err(StageError::ConfigError(
                "output.preview_rows must be positive".to_string(),
            ));
        }

        self.feature_spec().validate()?;
        if self.feature_spec().numeric.contains(&self.features.timestamp)
            || self.features.label == self.features.timestamp
        {
            return Err(StageError::ConfigError(format!(
                "timestamp column '{}' cannot be a feature or the label",
                self.features.timestamp
            )));
        }
        Ok(())
    }

    /// Feature lists as seen by the transformer.
    #[must_use]
    pub fn feature_spec(&self) -> FeatureSpec {
        FeatureSpec::new(
            self.features.categorical.clone(),
            self.features.numeric.clone(),
            self.features.label.clone(),
        )
    }

    /// The input dataset reference.
    pub fn input_ref(&self) -> Result<ArtifactRef, StageError> {
        Ok(ArtifactRef::new(
            self.input.artifact.clone(),
            self.input.version.parse()?,
        ))
    }

    /// Explicit upstream validation run, if configured.
    #[must_use]
    pub fn upstream_run(&self) -> Option<RunId> {
        self.gate.upstream_run.map(RunId)
    }

    /// Path of the tracking database.
    #[must_use]
    pub fn tracking_db_path(&self) -> PathBuf {
        self.store
            .tracking_db
            .clone()
            .unwrap_or_else(|| self.store.home.join("tracking.redb"))
    }

    /// Root directory of the artifact store.
    #[must_use]
    pub fn artifact_root(&self) -> PathBuf {
        self.store
            .artifact_root
            .clone()
            .unwrap_or_else(|| self.store.home.join("artifacts"))
    }

    /// Directory where publish stages files before logging them.
    #[must_use]
    pub fn staging_dir(&self) -> PathBuf {
        self.output
            .staging_dir
            .clone()
            .unwrap_or_else(|| self.store.home.join("staging"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn defaults_are_valid() {
        let config = StageConfig::default();
        config.validate().unwrap();
        assert_eq!(config.input_ref().unwrap().to_string(), "processed_data.csv:latest");
        assert_eq!(config.tracking_db_path(), PathBuf::from(".featurestage/tracking.redb"));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = StageConfig::from_toml_str(
            r#"
            [gate]
            upstream_run = 7

            [features]
            numeric = ["amt"]
            "#,
        )
        .unwrap();

        assert_eq!(config.upstream_run(), Some(RunId(7)));
        assert_eq!(config.gate.field, "all_checks_passed");
        assert_eq!(config.features.numeric, vec!["amt"]);
        assert_eq!(config.features.categorical, vec!["category", "state"]);
    }

    #[test]
    fn unknown_keys_rejected() {
        assert!(matches!(
            StageConfig::from_toml_str("[gate]\nprojcet = \"x\"\n"),
            Err(StageError::ConfigError(_))
        ));
    }

    #[test]
    fn env_overrides() {
        let vars: BTreeMap<&str, &str> =
            [(ENV_HOME, "/tmp/fs-home"), (ENV_UPSTREAM_RUN, "42")].into_iter().collect();
        let mut config = StageConfig::default();
        config
            .apply_env_from(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.store.home, PathBuf::from("/tmp/fs-home"));
        assert_eq!(config.upstream_run(), Some(RunId(42)));
        assert_eq!(config.artifact_root(), PathBuf::from("/tmp/fs-home/artifacts"));
    }

    #[test]
    fn bad_env_run_id() {
        let mut config = StageConfig::default();
        let result = config.apply_env_from(|k| (k == ENV_UPSTREAM_RUN).then(|| "abc".to_string()));
        assert!(matches!(result, Err(StageError::ConfigError(_))));
    }

    #[test]
    fn validation_failures() {
        let mut config = StageConfig::default();
        config.output.preview_rows = 0;
        assert!(config.validate().is_err());

        let mut config = StageConfig::default();
        config.features.numeric.push("is_fraud".into());
        assert!(config.validate().is_err());

        let mut config = StageConfig::default();
        config.input.version = "vX".into();
        assert!(config.validate().is_err());

        let mut config = StageConfig::default();
        config.output.dataset_artifact = "../escape".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn explicit_missing_file_is_error() {
        assert!(StageConfig::load(Some(Path::new("/nonexistent/featurestage.toml"))).is_err());
    }
}
