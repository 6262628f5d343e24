//! # Stage Orchestrator
//!
//! Sequences gate -> load -> derive -> transform -> publish inside one
//! tracked run.
//!
//! ```text
//! NotStarted -> GateChecked -> Loaded -> Transformed -> Published
//!                    |
//!                    +-> Aborted   (gate did not pass)
//!
//! any error ---------------> Failed
//! ```
//!
//! `Published` and `Aborted` are successful terminal states. Every path that
//! opened a run finalizes it exactly once.

use super::gate::{ABORT_MESSAGE, GateSettings, check_validation_status};
use super::loader::load_data;
use super::publisher::{Lineage, PublishOptions, PublishReceipt, publish};
use crate::config::StageConfig;
use crate::services::{ArtifactStore, MetricValue, RunHandle, RunStatus, TrackingService};
use featurestage_core::{StageError, derive_features, fit_transform};

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    NotStarted,
    GateChecked,
    Loaded,
    Transformed,
    Published,
    Aborted,
    Failed,
}

/// Successful end of a stage run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Published(PublishReceipt),
    Aborted { reason: String },
}

/// Runs the stage once against a tracker and an artifact store.
pub struct StageRunner<'a> {
    tracker: &'a dyn TrackingService,
    store: &'a dyn ArtifactStore,
    config: &'a StageConfig,
    state: StageState,
}

impl std::fmt::Debug for StageRunner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRunner")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<'a> StageRunner<'a> {
    pub fn new(
        tracker: &'a dyn TrackingService,
        store: &'a dyn ArtifactStore,
        config: &'a StageConfig,
    ) -> Self {
        Self {
            tracker,
            store,
            config,
            state: StageState::NotStarted,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> StageState {
        self.state
    }

    fn transition(&mut self, next: StageState) {
        tracing::debug!(from = ?self.state, to = ?next, "Stage transition");
        self.state = next;
    }

    /// Execute the stage.
    ///
    /// Returns `Ok` for both a published and an aborted stage. Errors are
    /// returned after the run has been finalized as failed.
    pub fn run(&mut self) -> Result<StageOutcome, StageError> {
        if self.state != StageState::NotStarted {
            return Err(StageError::ConfigError(format!(
                "stage already ran (state {:?})",
                self.state
            )));
        }

        let run = match self
            .tracker
            .start_run(&self.config.run.project, &self.config.run.name)
        {
            Ok(run) => run,
            Err(e) => {
                self.transition(StageState::Failed);
                return Err(e);
            }
        };
        tracing::info!(run = %run.id, project = %run.project, "Stage run started");

        match self.execute(&run) {
            Ok(outcome) => {
                let status = match outcome {
                    StageOutcome::Published(_) => RunStatus::Finished,
                    StageOutcome::Aborted { .. } => RunStatus::Aborted,
                };
                if let Err(e) = self.tracker.end_run(&run, status) {
                    self.transition(StageState::Failed);
                    return Err(e);
                }
                tracing::info!(run = %run.id, status = %status, "Stage run finalized");
                Ok(outcome)
            }
            Err(e) => {
                self.transition(StageState::Failed);
                tracing::error!(run = %run.id, error = %e, "Stage failed");
                if let Err(log_err) =
                    self.tracker
                        .log_metric(&run, "failure", MetricValue::Text(e.to_string()))
                {
                    tracing::warn!(error = %log_err, "Could not record failure metric");
                }
                if let Err(end_err) = self.tracker.end_run(&run, RunStatus::Failed) {
                    tracing::warn!(run = %run.id, error = %end_err, "Could not finalize failed run");
                }
                Err(e)
            }
        }
    }

    fn execute(&mut self, run: &RunHandle) -> Result<StageOutcome, StageError> {
        let config = self.config;

        // Gate
        let gate = GateSettings {
            project: config.gate.project.clone(),
            field: config.gate.field.clone(),
            upstream_run: config.upstream_run(),
        };
        let verdict = check_validation_status(self.tracker, &gate)?;
        self.transition(StageState::GateChecked);
        tracing::info!(
            passed = verdict.passed,
            source = ?verdict.source,
            reason = %verdict.reason,
            "Validation gate checked"
        );

        if !verdict.passed {
            self.tracker.log_metric(
                run,
                "error",
                MetricValue::Text(format!("{} ({})", ABORT_MESSAGE, verdict.reason)),
            )?;
            self.transition(StageState::Aborted);
            tracing::warn!(reason = %verdict.reason, "{}", ABORT_MESSAGE);
            return Ok(StageOutcome::Aborted {
                reason: verdict.reason,
            });
        }

        // Load
        let requested = config.input_ref()?;
        let (source, dataset) = load_data(self.store, &requested)?;
        let input = source.reference();
        self.transition(StageState::Loaded);
        tracing::info!(
            requested = %requested,
            input = %input,
            rows = dataset.row_count(),
            columns = dataset.column_count(),
            "Dataset loaded"
        );

        // Derive + transform
        let derived = derive_features(&dataset, &config.features.timestamp)?;
        if derived.coerced > 0 {
            tracing::warn!(
                coerced = derived.coerced,
                column = %config.features.timestamp,
                "Unparseable timestamps coerced to null"
            );
        }
        self.tracker.log_metric(
            run,
            "timestamp_parse_failures",
            MetricValue::Int(derived.coerced as i64),
        )?;

        let spec = config.feature_spec();
        let (transformed, fitted) = fit_transform(&derived.dataset, &spec)?;
        self.transition(StageState::Transformed);

        let numeric = fitted.feature_names_out();
        let categorical = fitted.reserved_features();
        tracing::info!(
            numeric = ?numeric,
            categorical_branch = ?categorical,
            "Transform fitted"
        );
        self.tracker
            .log_param(run, "numeric_features", &numeric.join(","))?;
        self.tracker
            .log_param(run, "categorical_branch", &categorical.join(","))?;
        self.tracker.log_param(run, "label", &spec.label)?;

        // Publish
        let lineage = Lineage {
            input: input.to_string(),
            gate_run: verdict.source,
            new_features: derived.new_features,
        };
        let options = PublishOptions {
            dataset_artifact: config.output.dataset_artifact.clone(),
            transform_artifact: config.output.transform_artifact.clone(),
            staging_dir: config.staging_dir(),
            preview_rows: config.output.preview_rows,
        };
        let receipt = publish(
            self.store,
            self.tracker,
            run,
            &transformed,
            &fitted,
            &lineage,
            &options,
        )?;
        self.transition(StageState::Published);

        Ok(StageOutcome::Published(receipt))
    }
}
