//! Artifact publisher: stage the outputs, log them as new artifact versions,
//! emit the summary metrics.

use crate::services::{
    ArtifactKind, ArtifactStore, ArtifactVersion, MetricValue, RunHandle, RunId, TrackingService,
};
use featurestage_core::{
    Dataset, FittedTransform, PreviewTable, StageError, transform_to_bytes, write_csv,
};
use std::path::{Path, PathBuf};

/// Extension of the serialized transform file.
pub const TRANSFORM_FILE_EXTENSION: &str = "bin";

/// File name of a transform artifact's blob.
#[must_use]
pub fn transform_file_name(artifact: &str) -> String {
    format!("{}.{}", artifact, TRANSFORM_FILE_EXTENSION)
}

/// Where and under which names outputs are published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOptions {
    pub dataset_artifact: String,
    pub transform_artifact: String,
    /// Parent of the per-run staging directories.
    pub staging_dir: PathBuf,
    pub preview_rows: usize,
}

/// What produced the published outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lineage {
    /// Exact input version, e.g. `processed_data.csv:v3`.
    pub input: String,
    /// Validation run the gate read.
    pub gate_run: Option<RunId>,
    /// Columns added by the deriver.
    pub new_features: Vec<String>,
}

/// Result of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub dataset: ArtifactVersion,
    pub transform: ArtifactVersion,
    /// `(rows, columns)` of the published dataset.
    pub shape: (usize, usize),
    /// Numeric features actually transformed.
    pub transformed_features: Vec<String>,
}

fn publish_error(e: StageError) -> StageError {
    match e {
        StageError::PublishError(_) => e,
        other => StageError::PublishError(other.to_string()),
    }
}

fn write_staged(path: &Path, bytes: &[u8]) -> Result<(), StageError> {
    std::fs::write(path, bytes)
        .map_err(|e| StageError::IoError(format!("Cannot write '{}': {}", path.display(), e)))
}

/// Serialize `dataset` and `transform`, log both as new artifact versions of
/// `run`, and emit the shape, feature and preview metrics.
///
/// # Errors
///
/// `StageError::PublishError` on any store, tracker or staging failure.
pub fn publish(
    store: &dyn ArtifactStore,
    tracker: &dyn TrackingService,
    run: &RunHandle,
    dataset: &Dataset,
    transform: &FittedTransform,
    lineage: &Lineage,
    options: &PublishOptions,
) -> Result<PublishReceipt, StageError> {
    let staging = options.staging_dir.join(format!("run-{}", run.id));
    std::fs::create_dir_all(&staging)
        .map_err(|e| StageError::PublishError(format!("Cannot create staging dir: {}", e)))?;

    let receipt = publish_staged(store, tracker, run, dataset, transform, lineage, options, &staging)
        .map_err(publish_error);

    if let Err(e) = std::fs::remove_dir_all(&staging) {
        tracing::warn!(dir = %staging.display(), error = %e, "Could not remove staging directory");
    }
    receipt
}

fn publish_staged(
    store: &dyn ArtifactStore,
    tracker: &dyn TrackingService,
    run: &RunHandle,
    dataset: &Dataset,
    transform: &FittedTransform,
    lineage: &Lineage,
    options: &PublishOptions,
    staging: &Path,
) -> Result<PublishReceipt, StageError> {
    let dataset_path = staging.join(&options.dataset_artifact);
    write_staged(&dataset_path, &write_csv(dataset)?)?;

    let transform_path = staging.join(transform_file_name(&options.transform_artifact));
    write_staged(&transform_path, &transform_to_bytes(transform)?)?;

    // Both handles are complete before either version is logged.
    let mut dataset_handle =
        store.create_artifact(&options.dataset_artifact, ArtifactKind::Dataset)?;
    store.add_file(&mut dataset_handle, &dataset_path)?;
    let mut transform_handle =
        store.create_artifact(&options.transform_artifact, ArtifactKind::Model)?;
    store.add_file(&mut transform_handle, &transform_path)?;

    let dataset_version = store.log_artifact(run, dataset_handle)?;
    tracing::info!(
        artifact = %dataset_version.reference(),
        rows = dataset.row_count(),
        "Published dataset"
    );
    let transform_version = store.log_artifact(run, transform_handle)?;
    tracing::info!(artifact = %transform_version.reference(), "Published transform");

    let (rows, cols) = dataset.shape();
    let transformed_features = transform.feature_names_out();

    tracker.log_metric(
        run,
        "engineered_data_shape",
        MetricValue::Shape {
            rows: rows as u64,
            cols: cols as u64,
        },
    )?;
    tracker.log_metric(run, "new_features", MetricValue::List(lineage.new_features.clone()))?;
    tracker.log_metric(
        run,
        "transformed_features",
        MetricValue::List(transformed_features.clone()),
    )?;
    tracker.log_metric(
        run,
        "transformed_data",
        MetricValue::Table(PreviewTable::from_dataset(dataset, options.preview_rows)),
    )?;

    tracker.log_param(run, "input_artifact", &lineage.input)?;
    if let Some(gate_run) = lineage.gate_run {
        tracker.log_param(run, "validation_run", &gate_run.to_string())?;
    }
    tracker.log_param(run, "engineered_data_shape", &format!("({}, {})", rows, cols))?;

    Ok(PublishReceipt {
        dataset: dataset_version,
        transform: transform_version,
        shape: (rows, cols),
        transformed_features,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::services::{ArtifactRef, FsArtifactStore, RedbTracker};
    use featurestage_core::{FeatureSpec, fit_transform, read_csv, transform_from_bytes};
    use tempfile::TempDir;

    #[test]
    fn publishes_both_artifacts_and_metrics() {
        let temp = TempDir::new().unwrap();
        let store = FsArtifactStore::open(temp.path().join("artifacts")).unwrap();
        let tracker = RedbTracker::open(temp.path().join("tracking.redb")).unwrap();
        let run = tracker.start_run("stage", "feature-engineering").unwrap();

        let input = read_csv(b"amt,hour,day_of_week,is_fraud\n1.0,1,0,0\n3.0,2,1,1\n").unwrap();
        let (out, fitted) = fit_transform(&input, &FeatureSpec::default()).unwrap();
        let options = PublishOptions {
            dataset_artifact: "engineered_data.csv".into(),
            transform_artifact: "preprocessor".into(),
            staging_dir: temp.path().join("staging"),
            preview_rows: 5,
        };
        let lineage = Lineage {
            input: "processed_data.csv:v1".into(),
            gate_run: None,
            new_features: vec!["hour".into(), "day_of_week".into()],
        };

        let receipt = publish(&store, &tracker, &run, &out, &fitted, &lineage, &options).unwrap();
        assert_eq!(receipt.dataset.version, 1);
        assert_eq!(receipt.dataset.run, Some(run.id));
        assert_eq!(receipt.transform.kind, ArtifactKind::Model);
        assert_eq!(receipt.shape, (2, 4));

        let dir = store.use_artifact(&ArtifactRef::latest("preprocessor")).unwrap();
        let blob = std::fs::read(dir.join("preprocessor.bin")).unwrap();
        assert_eq!(transform_from_bytes(&blob).unwrap(), fitted);

        let summary = tracker.run_summary(run.id).unwrap().unwrap();
        assert_eq!(
            summary.get("engineered_data_shape"),
            Some(&MetricValue::Shape { rows: 2, cols: 4 })
        );
        assert!(matches!(summary.get("transformed_data"), Some(MetricValue::Table(t)) if t.len() == 2));
        assert!(!temp.path().join("staging").join(format!("run-{}", run.id)).exists());
    }

    #[test]
    fn rejected_transform_leaves_no_dataset_version() {
        let temp = TempDir::new().unwrap();
        let store = FsArtifactStore::open(temp.path().join("artifacts")).unwrap();
        let tracker = RedbTracker::open(temp.path().join("tracking.redb")).unwrap();
        let run = tracker.start_run("stage", "fe").unwrap();

        // Name already taken by a dataset, so the model artifact is refused.
        let squatter = temp.path().join("preprocessor.csv");
        std::fs::write(&squatter, "a\n1\n").unwrap();
        store
            .register_file("preprocessor", ArtifactKind::Dataset, &squatter)
            .unwrap();

        let input = read_csv(b"amt,is_fraud\n1.0,0\n2.0,1\n").unwrap();
        let (out, fitted) = fit_transform(&input, &FeatureSpec::default()).unwrap();
        let options = PublishOptions {
            dataset_artifact: "engineered_data.csv".into(),
            transform_artifact: "preprocessor".into(),
            staging_dir: temp.path().join("staging"),
            preview_rows: 5,
        };
        let lineage = Lineage {
            input: "processed_data.csv:v1".into(),
            gate_run: None,
            new_features: vec![],
        };

        let result = publish(&store, &tracker, &run, &out, &fitted, &lineage, &options);
        assert!(matches!(result, Err(StageError::PublishError(_))));
        assert!(store.list_versions(Some("engineered_data.csv")).unwrap().is_empty());
        assert_eq!(store.list_versions(Some("preprocessor")).unwrap().len(), 1);
    }

    #[test]
    fn tracker_failure_is_publish_error() {
        let temp = TempDir::new().unwrap();
        let store = FsArtifactStore::open(temp.path().join("artifacts")).unwrap();
        let tracker = RedbTracker::open(temp.path().join("tracking.redb")).unwrap();
        let run = tracker.start_run("stage", "fe").unwrap();
        tracker
            .end_run(&run, crate::services::RunStatus::Failed)
            .unwrap();

        let input = read_csv(b"amt,is_fraud\n1.0,0\n").unwrap();
        let (out, fitted) = fit_transform(&input, &FeatureSpec::default()).unwrap();
        let options = PublishOptions {
            dataset_artifact: "engineered_data.csv".into(),
            transform_artifact: "preprocessor".into(),
            staging_dir: temp.path().join("staging"),
            preview_rows: 5,
        };
        let lineage = Lineage {
            input: "x:v1".into(),
            gate_run: None,
            new_features: vec![],
        };

        let result = publish(&store, &tracker, &run, &out, &fitted, &lineage, &options);
        assert!(matches!(result, Err(StageError::PublishError(_))));
    }
}
