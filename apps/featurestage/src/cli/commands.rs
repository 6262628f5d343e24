//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::config::StageConfig;
use crate::services::{
    ArtifactKind, ArtifactRef, ArtifactStore, ArtifactVersion, FsArtifactStore, MetricValue,
    RedbTracker, RunStatus, TrackingService, validate_artifact_name,
};
use crate::stage::{StageOutcome, StageRunner, read_bounded, transform_file_name};
use featurestage_core::primitives::{MAX_TABULAR_SIZE, MAX_TRANSFORM_PAYLOAD_SIZE};
use featurestage_core::{
    FittedTransform, StageError, derive_features, read_csv, transform_from_bytes, write_csv,
};
use std::path::{Path, PathBuf};

/// Run name used by `mark-validation`.
const VALIDATION_RUN_NAME: &str = "data-validation";

// =============================================================================
// HELPERS
// =============================================================================

fn open_tracker(config: &StageConfig) -> Result<RedbTracker, StageError> {
    RedbTracker::open(config.tracking_db_path())
}

fn open_store(config: &StageConfig) -> Result<FsArtifactStore, StageError> {
    FsArtifactStore::open(config.artifact_root())
}

fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, StageError> {
    serde_json::to_value(value).map_err(|e| StageError::SerializationError(e.to_string()))
}

/// Validate an input file path: canonical, existing, regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, StageError> {
    let canonical = path.canonicalize().map_err(|e| {
        StageError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(StageError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Validate an output path: the parent directory must exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, StageError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        StageError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(StageError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| StageError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

/// Load a published transform blob.
fn load_transform(
    store: &FsArtifactStore,
    config: &StageConfig,
    version: &str,
) -> Result<(ArtifactVersion, FittedTransform), StageError> {
    let reference = ArtifactRef::new(config.output.transform_artifact.clone(), version.parse()?);
    let entry = store.resolve(&reference)?;
    let dir = store.use_artifact(&entry.reference())?;
    let path = dir.join(transform_file_name(&entry.name));
    if !path.is_file() {
        return Err(StageError::ArtifactNotFound(format!(
            "{}: no file '{}'",
            entry.reference(),
            transform_file_name(&entry.name)
        )));
    }
    let bytes = read_bounded(&path, MAX_TRANSFORM_PAYLOAD_SIZE)?;
    let fitted = transform_from_bytes(&bytes)?;
    Ok((entry, fitted))
}

// =============================================================================
// RUN COMMAND
// =============================================================================

/// Execute the stage.
pub fn cmd_run(config: &StageConfig, json_mode: bool) -> Result<(), StageError> {
    let tracker = open_tracker(config)?;
    let store = open_store(config)?;

    let mut runner = StageRunner::new(&tracker, &store, config);
    let outcome = runner.run()?;

    match outcome {
        StageOutcome::Published(receipt) => {
            if json_mode {
                print_json(&serde_json::json!({
                    "status": "published",
                    "dataset": receipt.dataset.reference().to_string(),
                    "transform": receipt.transform.reference().to_string(),
                    "shape": [receipt.shape.0, receipt.shape.1],
                    "transformed_features": receipt.transformed_features,
                }));
                return Ok(());
            }

            println!("Stage published");
            println!("===============");
            println!("Dataset:   {}", receipt.dataset.reference());
            println!("Transform: {}", receipt.transform.reference());
            println!("Shape:     ({}, {})", receipt.shape.0, receipt.shape.1);
            println!("Features:  {}", receipt.transformed_features.join(", "));
        }
        StageOutcome::Aborted { reason } => {
            if json_mode {
                print_json(&serde_json::json!({
                    "status": "aborted",
                    "reason": reason,
                }));
                return Ok(());
            }

            println!("Stage aborted: {}", reason);
        }
    }

    Ok(())
}

// =============================================================================
// REGISTER COMMAND
// =============================================================================

/// Register a CSV file as the next version of a dataset artifact.
///
/// The file is parsed first and stored under the artifact name, so the
/// loader finds it regardless of the source file name.
pub fn cmd_register(
    config: &StageConfig,
    json_mode: bool,
    file: &Path,
    name: &str,
) -> Result<(), StageError> {
    validate_artifact_name(name)?;
    let path = validate_file_path(file)?;
    let bytes = read_bounded(&path, MAX_TABULAR_SIZE)?;
    let dataset = read_csv(&bytes)?;

    let store = open_store(config)?;
    let staging = config.staging_dir().join("register");
    std::fs::create_dir_all(&staging).map_err(|e| StageError::IoError(e.to_string()))?;
    let staged = staging.join(name);
    std::fs::write(&staged, &bytes).map_err(|e| StageError::IoError(e.to_string()))?;

    let result = store.register_file(name, ArtifactKind::Dataset, &staged);
    if let Err(e) = std::fs::remove_file(&staged) {
        tracing::warn!(file = %staged.display(), error = %e, "Could not remove staged file");
    }
    let version = result?;
    tracing::info!(artifact = %version.reference(), rows = dataset.row_count(), "Dataset registered");

    if json_mode {
        print_json(&to_json(&version)?);
        return Ok(());
    }

    println!("Registered {}", version.reference());
    println!("Rows:    {}", dataset.row_count());
    println!("Columns: {}", dataset.column_names().join(", "));
    Ok(())
}

// =============================================================================
// MARK-VALIDATION COMMAND
// =============================================================================

/// Record a finished validation run carrying the gate field.
pub fn cmd_mark_validation(
    config: &StageConfig,
    json_mode: bool,
    passed: bool,
) -> Result<(), StageError> {
    let tracker = open_tracker(config)?;
    let run = tracker.start_run(&config.gate.project, VALIDATION_RUN_NAME)?;
    tracker.log_metric(&run, &config.gate.field, MetricValue::Bool(passed))?;
    tracker.end_run(&run, RunStatus::Finished)?;
    tracing::info!(run = %run.id, passed, "Validation run recorded");

    if json_mode {
        print_json(&serde_json::json!({
            "run": run.id.0,
            "project": run.project,
            "field": config.gate.field,
            "value": passed,
        }));
        return Ok(());
    }

    println!(
        "Recorded validation run {} in '{}': {} = {}",
        run.id, run.project, config.gate.field, passed
    );
    Ok(())
}

// =============================================================================
// RUNS COMMAND
// =============================================================================

/// List tracked runs.
pub fn cmd_runs(
    config: &StageConfig,
    json_mode: bool,
    project: Option<&str>,
) -> Result<(), StageError> {
    let tracker = open_tracker(config)?;
    let runs = tracker.list_runs(project)?;

    if json_mode {
        let mut entries = Vec::with_capacity(runs.len());
        for record in &runs {
            let summary = tracker.run_summary(record.id)?.unwrap_or_default();
            let mut entry = to_json(record)?;
            if let Some(obj) = entry.as_object_mut() {
                obj.insert("summary".to_string(), to_json(&summary.values)?);
                obj.insert("params".to_string(), to_json(&tracker.run_params(record.id)?)?);
            }
            entries.push(entry);
        }
        print_json(&serde_json::Value::Array(entries));
        return Ok(());
    }

    if runs.is_empty() {
        println!("No runs");
        return Ok(());
    }

    for record in &runs {
        println!(
            "#{:<4} {:<9} {} / {}  ({})",
            record.id.0, record.status, record.project, record.name, record.started_at
        );
        if let Some(summary) = tracker.run_summary(record.id)? {
            for (name, value) in &summary.values {
                match value {
                    MetricValue::Table(table) => {
                        println!("      {}:", name);
                        for line in table.to_string().lines() {
                            println!("        {}", line);
                        }
                    }
                    other => println!("      {} = {}", name, other),
                }
            }
        }
    }
    Ok(())
}

// =============================================================================
// ARTIFACTS COMMAND
// =============================================================================

/// List artifact versions.
pub fn cmd_artifacts(
    config: &StageConfig,
    json_mode: bool,
    name: Option<&str>,
) -> Result<(), StageError> {
    let store = open_store(config)?;
    let versions = store.list_versions(name)?;

    if json_mode {
        print_json(&to_json(&versions)?);
        return Ok(());
    }

    if versions.is_empty() {
        println!("No artifacts");
        return Ok(());
    }

    for version in &versions {
        let run = version
            .run
            .map(|r| format!("run {}", r))
            .unwrap_or_else(|| "registered".to_string());
        println!(
            "{:<32} {:<8} {:<10} {}",
            version.reference().to_string(),
            version.kind,
            run,
            version.created_at
        );
        for file in &version.files {
            println!(
                "    {} ({} bytes, blake3 {})",
                file.name, file.bytes, file.digest
            );
        }
    }
    Ok(())
}

// =============================================================================
// INSPECT COMMAND
// =============================================================================

/// Show the fitted parameters of a published transform.
pub fn cmd_inspect(config: &StageConfig, json_mode: bool, version: &str) -> Result<(), StageError> {
    let store = open_store(config)?;
    let (entry, fitted) = load_transform(&store, config, version)?;

    if json_mode {
        print_json(&serde_json::json!({
            "artifact": entry.reference().to_string(),
            "transform": to_json(&fitted)?,
        }));
        return Ok(());
    }

    println!("Transform {}", entry.reference());
    println!("==========={}", "=".repeat(entry.reference().to_string().len()));
    println!("Label:       {}", fitted.label);
    println!("Fitted rows: {}", fitted.fitted_rows);
    println!();
    println!("{:<16} {:>14} {:>14} {:>10}", "column", "mean", "scale", "samples");
    for stats in fitted.numeric_stats() {
        println!(
            "{:<16} {:>14.6} {:>14.6} {:>10}",
            stats.name, stats.mean, stats.scale, stats.samples
        );
    }
    let reserved = fitted.reserved_features();
    if !reserved.is_empty() {
        println!();
        println!("Reserved (no output): {}", reserved.join(", "));
    }
    Ok(())
}

// =============================================================================
// APPLY COMMAND
// =============================================================================

/// Apply a published transform to a CSV file.
///
/// When the input still carries the raw timestamp column, temporal features
/// are derived first, as the stage does.
pub fn cmd_apply(
    config: &StageConfig,
    json_mode: bool,
    input: &Path,
    output: &Path,
    version: &str,
    inverse: bool,
) -> Result<(), StageError> {
    let input_path = validate_file_path(input)?;
    let output_path = validate_output_path(output)?;

    let store = open_store(config)?;
    let (entry, fitted) = load_transform(&store, config, version)?;

    let dataset = read_csv(&read_bounded(&input_path, MAX_TABULAR_SIZE)?)?;
    let result = if inverse {
        fitted.inverse_transform(&dataset)?
    } else if dataset.has_column(&config.features.timestamp) {
        let derived = derive_features(&dataset, &config.features.timestamp)?;
        if derived.coerced > 0 {
            tracing::warn!(coerced = derived.coerced, "Unparseable timestamps coerced to null");
        }
        fitted.transform(&derived.dataset)?
    } else {
        fitted.transform(&dataset)?
    };

    std::fs::write(&output_path, write_csv(&result)?)
        .map_err(|e| StageError::IoError(format!("Cannot write output: {}", e)))?;
    tracing::info!(transform = %entry.reference(), output = %output_path.display(), "Transform applied");

    if json_mode {
        print_json(&serde_json::json!({
            "transform": entry.reference().to_string(),
            "output": output_path.to_string_lossy(),
            "shape": [result.row_count(), result.column_count()],
            "inverse": inverse,
        }));
        return Ok(());
    }

    println!(
        "Applied {} to {} rows -> {}",
        entry.reference(),
        result.row_count(),
        output_path.display()
    );
    Ok(())
}
