//! # Service Contracts
//!
//! The stage talks to two external collaborators:
//!
//! - a **tracking service** holding runs, their metrics and params
//! - an **artifact store** holding named, typed, versioned artifacts
//!
//! Both are traits so the orchestrator can run against the local redb/fs
//! backends (`RedbTracker`, `FsArtifactStore`) or against test doubles.

mod artifacts;
mod tracker;

pub use artifacts::FsArtifactStore;
pub use tracker::{RedbTracker, RunRecord};

use featurestage_core::{PreviewTable, StageError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

// =============================================================================
// RUNS
// =============================================================================

/// Identifier of a tracked run. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An open run, threaded explicitly through everything that logs to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHandle {
    pub id: RunId,
    pub project: String,
    pub name: String,
}

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Finished,
    Aborted,
    Failed,
}

impl RunStatus {
    /// Whether the run has been finalized.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Running => "running",
            RunStatus::Finished => "finished",
            RunStatus::Aborted => "aborted",
            RunStatus::Failed => "failed",
        };
        f.pad(s)
    }
}

/// A value logged as a run metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
    Shape { rows: u64, cols: u64 },
    Table(PreviewTable),
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Bool(b) => write!(f, "{}", b),
            MetricValue::Int(v) => write!(f, "{}", v),
            MetricValue::Float(v) => write!(f, "{}", v),
            MetricValue::Text(s) => f.write_str(s),
            MetricValue::List(items) => write!(f, "[{}]", items.join(", ")),
            MetricValue::Shape { rows, cols } => write!(f, "({}, {})", rows, cols),
            MetricValue::Table(table) => {
                write!(f, "<table {} cols x {} rows>", table.columns.len(), table.len())
            }
        }
    }
}

/// The last logged value of every metric of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub values: BTreeMap<String, MetricValue>,
}

impl RunSummary {
    /// Look up one summary field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.values.get(name)
    }
}

/// Tracking service contract.
pub trait TrackingService {
    /// Most recent *completed* run of `project`, if any.
    fn latest_run(&self, project: &str) -> Result<Option<RunId>, StageError>;

    /// Summary of `run`; `None` if the run does not exist.
    fn run_summary(&self, run: RunId) -> Result<Option<RunSummary>, StageError>;

    /// Open a new run.
    fn start_run(&self, project: &str, name: &str) -> Result<RunHandle, StageError>;

    /// Record a metric value on an open run.
    fn log_metric(&self, run: &RunHandle, name: &str, value: MetricValue)
    -> Result<(), StageError>;

    /// Record a string parameter on an open run.
    fn log_param(&self, run: &RunHandle, name: &str, value: &str) -> Result<(), StageError>;

    /// Finalize a run. A run can only be finalized once.
    fn end_run(&self, run: &RunHandle, status: RunStatus) -> Result<(), StageError>;
}

// =============================================================================
// ARTIFACTS
// =============================================================================

/// Type of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Dataset,
    Model,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Dataset => f.pad("dataset"),
            ArtifactKind::Model => f.pad("model"),
        }
    }
}

/// Which version of an artifact to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionTag {
    #[default]
    Latest,
    Version(u32),
}

impl FromStr for VersionTag {
    type Err = StageError;

    /// Accepts `latest`, `vN` and `N`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("latest") {
            return Ok(VersionTag::Latest);
        }
        let digits = s.strip_prefix('v').unwrap_or(s);
        digits
            .parse::<u32>()
            .map(VersionTag::Version)
            .map_err(|_| StageError::ConfigError(format!("invalid version tag '{}'", s)))
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionTag::Latest => f.write_str("latest"),
            VersionTag::Version(n) => write!(f, "v{}", n),
        }
    }
}

/// `name[:version]` reference to an artifact version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub name: String,
    pub version: VersionTag,
}

impl ArtifactRef {
    #[must_use]
    pub fn new(name: impl Into<String>, version: VersionTag) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    /// Reference to the latest version of `name`.
    #[must_use]
    pub fn latest(name: impl Into<String>) -> Self {
        Self::new(name, VersionTag::Latest)
    }
}

impl FromStr for ArtifactRef {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, version) = match s.rsplit_once(':') {
            Some((name, tag)) => (name, tag.parse()?),
            None => (s, VersionTag::Latest),
        };
        validate_artifact_name(name)?;
        Ok(Self::new(name, version))
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

/// Check an artifact name is usable as a single path component.
pub fn validate_artifact_name(name: &str) -> Result<(), StageError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.chars().any(|c| matches!(c, '/' | '\\' | ':') || c.is_control());
    if invalid {
        return Err(StageError::ConfigError(format!(
            "invalid artifact name '{}'",
            name
        )));
    }
    Ok(())
}

/// An artifact under construction: name, kind and the files staged so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactHandle {
    pub name: String,
    pub kind: ArtifactKind,
    pub files: Vec<PathBuf>,
}

/// One file of a stored artifact version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
    pub name: String,
    pub bytes: u64,
    /// BLAKE3 hex digest of the file contents.
    pub digest: String,
}

/// An immutable, stored artifact version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactVersion {
    pub name: String,
    pub version: u32,
    pub kind: ArtifactKind,
    pub files: Vec<ArtifactFile>,
    /// Run that logged the version; `None` for versions registered by hand.
    pub run: Option<RunId>,
    /// RFC 3339 creation time.
    pub created_at: String,
}

impl ArtifactVersion {
    /// Exact reference to this version.
    #[must_use]
    pub fn reference(&self) -> ArtifactRef {
        ArtifactRef::new(self.name.clone(), VersionTag::Version(self.version))
    }
}

/// Artifact store contract.
pub trait ArtifactStore {
    /// Resolve a reference (including `latest`) to the exact stored version.
    fn resolve(&self, reference: &ArtifactRef) -> Result<ArtifactVersion, StageError>;

    /// Resolve a reference to the local directory holding its files.
    fn use_artifact(&self, reference: &ArtifactRef) -> Result<PathBuf, StageError>;

    /// Begin a new artifact. Nothing is stored until `log_artifact`.
    fn create_artifact(&self, name: &str, kind: ArtifactKind)
    -> Result<ArtifactHandle, StageError>;

    /// Stage a local file into `handle`.
    fn add_file(&self, handle: &mut ArtifactHandle, path: &Path) -> Result<(), StageError>;

    /// Store `handle` as the next version of its name, produced by `run`.
    fn log_artifact(
        &self,
        run: &RunHandle,
        handle: ArtifactHandle,
    ) -> Result<ArtifactVersion, StageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_version_tags() {
        assert_eq!("latest".parse::<VersionTag>().expect("tag"), VersionTag::Latest);
        assert_eq!("v3".parse::<VersionTag>().expect("tag"), VersionTag::Version(3));
        assert_eq!("7".parse::<VersionTag>().expect("tag"), VersionTag::Version(7));
        assert!("vx".parse::<VersionTag>().is_err());
    }

    #[test]
    fn parses_artifact_refs() {
        let r: ArtifactRef = "processed_data.csv:v2".parse().expect("ref");
        assert_eq!(r.name, "processed_data.csv");
        assert_eq!(r.version, VersionTag::Version(2));

        let r: ArtifactRef = "processed_data.csv".parse().expect("ref");
        assert_eq!(r.version, VersionTag::Latest);
        assert_eq!(r.to_string(), "processed_data.csv:latest");
    }

    #[test]
    fn rejects_path_like_names() {
        assert!(validate_artifact_name("../etc").is_err());
        assert!(validate_artifact_name("a/b").is_err());
        assert!(validate_artifact_name("").is_err());
        assert!(validate_artifact_name("engineered_data.csv").is_ok());
    }

    #[test]
    fn metric_value_display() {
        assert_eq!(MetricValue::Shape { rows: 4, cols: 3 }.to_string(), "(4, 3)");
        assert_eq!(
            MetricValue::List(vec!["hour".into(), "day_of_week".into()]).to_string(),
            "[hour, day_of_week]"
        );
    }
}
