//! Connection diagnostics data models.
//!
//! A diagnostics run is an ordered, append-only trace of labeled steps. The
//! [`StepTrace`] recorder is the only way steps are created, which keeps the
//! trace well-formed: ids are 1-based and consecutive, at most one step is in
//! progress, and the first failure ends the run.

use crate::error::{DbError, ErrorKind};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Most steps any backend pipeline records.
pub const MAX_STEPS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    InProgress,
    Completed,
    Failed,
}

/// One labeled check within a diagnostics run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DiagnosticStep {
    pub id: u32,
    pub label: String,
    pub status: StepStatus,
    /// Seconds since the Unix epoch when the step began.
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Free-form counters such as `tables_found`; flattened into the step object.
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Outcome of a diagnostics run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionResult {
    pub success: bool,
    pub message: String,
    pub steps: Vec<DiagnosticStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl ConnectionResult {
    /// Check that the trace is consistent with the success flag.
    pub fn is_well_formed(&self) -> bool {
        let ids_ok = self
            .steps
            .iter()
            .enumerate()
            .all(|(i, step)| step.id as usize == i + 1);
        let failed = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Failed)
            .count();

        let shape_ok = if self.success {
            self.steps.iter().all(|s| s.status == StepStatus::Completed)
        } else {
            failed == 1
                && self
                    .steps
                    .last()
                    .is_some_and(|s| s.status == StepStatus::Failed)
        };

        ids_ok && shape_ok && !self.steps.is_empty() && self.steps.len() <= MAX_STEPS
    }
}

/// Append-only recorder for diagnostic steps.
#[derive(Debug, Default)]
pub struct StepTrace {
    steps: Vec<DiagnosticStep>,
    /// Set once a step fails; later calls are ignored.
    halted: bool,
}

impl StepTrace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new step, completing any step still in progress.
    pub fn begin(&mut self, label: impl Into<String>) {
        if self.halted || self.steps.len() >= MAX_STEPS {
            return;
        }
        self.complete();
        let label = label.into();
        tracing::debug!(step = self.steps.len() + 1, label = %label, "Diagnostic step started");
        self.steps.push(DiagnosticStep {
            id: self.steps.len() as u32 + 1,
            label,
            status: StepStatus::InProgress,
            timestamp: epoch_seconds(),
            error: None,
            metadata: serde_json::Map::new(),
        });
    }

    /// Mark the current step completed.
    pub fn complete(&mut self) {
        if let Some(step) = self.current_mut() {
            step.status = StepStatus::Completed;
        }
    }

    /// Attach a metadata entry to the current step.
    pub fn annotate(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        if let Some(step) = self.current_mut() {
            step.metadata.insert(key.to_string(), value.into());
        }
    }

    /// Mark the current step failed and halt the trace.
    pub fn fail(&mut self, error: impl Into<String>) {
        let error = error.into();
        if let Some(step) = self.current_mut() {
            tracing::debug!(step = step.id, error = %error, "Diagnostic step failed");
            step.status = StepStatus::Failed;
            step.error = Some(error);
            self.halted = true;
        }
    }

    /// Finish with success. Any in-progress step is completed.
    pub fn succeed(mut self, message: impl Into<String>) -> ConnectionResult {
        self.complete();
        ConnectionResult {
            success: !self.halted,
            message: message.into(),
            steps: self.steps,
            error: None,
            error_kind: None,
        }
    }

    /// Finish with a failure, marking the current step failed if it isn't yet.
    pub fn finish_failed(
        mut self,
        message: impl Into<String>,
        error: &DbError,
    ) -> ConnectionResult {
        if !self.halted {
            self.fail(error.to_string());
        }
        ConnectionResult {
            success: false,
            message: message.into(),
            steps: self.steps,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
        }
    }

    fn current_mut(&mut self) -> Option<&mut DiagnosticStep> {
        if self.halted {
            return None;
        }
        self.steps
            .last_mut()
            .filter(|step| step.status == StepStatus::InProgress)
    }
}

fn epoch_seconds() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
