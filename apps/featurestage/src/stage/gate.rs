//! Validation gate: decides whether the upstream validation run passed.
//!
//! The gate fails closed. Anything other than a boolean `true` in the
//! configured summary field, including a missing run or a missing field,
//! is a failed gate. Only an unreachable tracking service is an error.

use crate::services::{MetricValue, RunId, TrackingService};
use featurestage_core::StageError;

/// Where the gate reads its verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateSettings {
    /// Project searched for the latest completed run.
    pub project: String,
    /// Boolean summary field.
    pub field: String,
    /// Explicit run; when set, the project lookup is skipped.
    pub upstream_run: Option<RunId>,
}

/// Outcome of the gate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateVerdict {
    pub passed: bool,
    /// Run the verdict was read from, if one was found.
    pub source: Option<RunId>,
    /// Human-readable explanation, logged as the abort reason.
    pub reason: String,
}

impl GateVerdict {
    fn fail(source: Option<RunId>, reason: String) -> Self {
        Self {
            passed: false,
            source,
            reason,
        }
    }
}

/// Abort message recorded when the gate does not pass.
pub const ABORT_MESSAGE: &str =
    "Data validation checks did not pass. Aborting feature engineering.";

fn unavailable(e: StageError) -> StageError {
    match e {
        StageError::GateUnavailable(_) => e,
        other => StageError::GateUnavailable(other.to_string()),
    }
}

/// Read the validation verdict. Read-only.
///
/// # Errors
///
/// `StageError::GateUnavailable` if the tracking service cannot answer.
pub fn check_validation_status(
    tracker: &dyn TrackingService,
    gate: &GateSettings,
) -> Result<GateVerdict, StageError> {
    let run = match gate.upstream_run {
        Some(run) => run,
        None => match tracker.latest_run(&gate.project).map_err(unavailable)? {
            Some(run) => run,
            None => {
                return Ok(GateVerdict::fail(
                    None,
                    format!("no completed run in project '{}'", gate.project),
                ));
            }
        },
    };

    let Some(summary) = tracker.run_summary(run).map_err(unavailable)? else {
        return Ok(GateVerdict::fail(
            Some(run),
            format!("upstream run {} not found", run),
        ));
    };

    let verdict = match summary.get(&gate.field) {
        Some(MetricValue::Bool(true)) => GateVerdict {
            passed: true,
            source: Some(run),
            reason: format!("run {}: {} = true", run, gate.field),
        },
        Some(MetricValue::Bool(false)) => {
            GateVerdict::fail(Some(run), format!("run {}: {} = false", run, gate.field))
        }
        Some(other) => GateVerdict::fail(
            Some(run),
            format!("run {}: {} is not a boolean ({})", run, gate.field, other),
        ),
        None => GateVerdict::fail(
            Some(run),
            format!("run {}: {} missing", run, gate.field),
        ),
    };
    Ok(verdict)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::services::{RedbTracker, RunStatus};
    use tempfile::TempDir;

    fn settings(upstream_run: Option<RunId>) -> GateSettings {
        GateSettings {
            project: "validation".into(),
            field: "all_checks_passed".into(),
            upstream_run,
        }
    }

    fn validation_run(tracker: &RedbTracker, value: MetricValue) -> RunId {
        let run = tracker.start_run("validation", "checks").unwrap();
        tracker.log_metric(&run, "all_checks_passed", value).unwrap();
        tracker.end_run(&run, RunStatus::Finished).unwrap();
        run.id
    }

    #[test]
    fn passes_on_true() {
        let temp = TempDir::new().unwrap();
        let tracker = RedbTracker::open(temp.path().join("t.redb")).unwrap();
        let id = validation_run(&tracker, MetricValue::Bool(true));

        let verdict = check_validation_status(&tracker, &settings(None)).unwrap();
        assert!(verdict.passed);
        assert_eq!(verdict.source, Some(id));
    }

    #[test]
    fn fails_closed_on_non_boolean_and_missing() {
        let temp = TempDir::new().unwrap();
        let tracker = RedbTracker::open(temp.path().join("t.redb")).unwrap();
        validation_run(&tracker, MetricValue::Text("true".into()));
        assert!(!check_validation_status(&tracker, &settings(None)).unwrap().passed);

        let run = tracker.start_run("validation", "no-field").unwrap();
        tracker.end_run(&run, RunStatus::Finished).unwrap();
        assert!(!check_validation_status(&tracker, &settings(None)).unwrap().passed);
    }

    #[test]
    fn empty_project_fails() {
        let temp = TempDir::new().unwrap();
        let tracker = RedbTracker::open(temp.path().join("t.redb")).unwrap();
        let verdict = check_validation_status(&tracker, &settings(None)).unwrap();
        assert!(!verdict.passed);
        assert_eq!(verdict.source, None);
    }

    #[test]
    fn explicit_run_preferred_over_latest() {
        let temp = TempDir::new().unwrap();
        let tracker = RedbTracker::open(temp.path().join("t.redb")).unwrap();
        let good = validation_run(&tracker, MetricValue::Bool(true));
        validation_run(&tracker, MetricValue::Bool(false));

        assert!(!check_validation_status(&tracker, &settings(None)).unwrap().passed);
        assert!(check_validation_status(&tracker, &settings(Some(good))).unwrap().passed);
    }

    #[test]
    fn missing_explicit_run_fails_closed() {
        let temp = TempDir::new().unwrap();
        let tracker = RedbTracker::open(temp.path().join("t.redb")).unwrap();
        let verdict = check_validation_status(&tracker, &settings(Some(RunId(99)))).unwrap();
        assert!(!verdict.passed);
    }
}
