//! Sequential step engine and run reporting.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use storeprep_core::{obs, StepStatus};
use tracing::{error, info, Instrument};
use uuid::Uuid;

use crate::step::{Step, StepOutcome};

/// Result of a complete checklist run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,

    /// Total duration in milliseconds.
    pub duration_ms: u64,

    /// Whether every step ran and passed.
    pub success: bool,

    /// Status lines in execution order, sub-statuses before their step.
    pub statuses: Vec<StepStatus>,
}

impl PipelineReport {
    /// Number of status lines that passed.
    pub fn passed_count(&self) -> usize {
        self.statuses.iter().filter(|s| s.success).count()
    }

    /// Number of status lines that failed.
    pub fn failed_count(&self) -> usize {
        self.statuses.iter().filter(|s| !s.success).count()
    }

    /// One rendered line per status.
    pub fn render(&self) -> String {
        self.statuses
            .iter()
            .map(StepStatus::render)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Runs steps in order, stopping after the first failed step.
pub struct PipelineEngine {
    steps: Vec<Box<dyn Step>>,
}

impl PipelineEngine {
    pub fn new(steps: Vec<Box<dyn Step>>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Execute the steps.
    ///
    /// Each step contributes its sub-statuses followed by one status of its
    /// own. A step that returns `Err` or panics is recorded as failed with a
    /// diagnostic; it never aborts the run itself.
    pub async fn run(self) -> PipelineReport {
        let run_id = Uuid::new_v4().to_string();
        let span = obs::run_span(&run_id);
        self.run_with_id(run_id).instrument(span).await
    }

    async fn run_with_id(self, run_id: String) -> PipelineReport {
        let started_at = Utc::now();
        let start = Instant::now();
        obs::emit_run_started(&run_id, self.steps.len());

        let mut statuses = Vec::new();
        let mut all_passed = true;

        for (idx, step) in self.steps.iter().enumerate() {
            let seq = idx + 1;
            let name = step.name().to_string();
            obs::emit_step_started(&name, seq);

            let outcome = match AssertUnwindSafe(step.execute()).catch_unwind().await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => StepOutcome::failed(format!("Step '{}' execution error: {:#}", name, e)),
                Err(payload) => StepOutcome::failed(format!(
                    "Step '{}' panicked: {}",
                    name,
                    panic_message(&*payload)
                )),
            };

            statuses.extend(outcome.sub_statuses);
            let status = StepStatus {
                label: name,
                success: outcome.success,
                diagnostic: outcome.diagnostic,
            };
            obs::emit_step_finished(&status.label, seq, status.success);

            let passed = status.success;
            if !passed {
                error!(
                    step = %status.label,
                    diagnostic = status.diagnostic.as_deref().unwrap_or(""),
                    "step failed"
                );
            }
            statuses.push(status);

            if !passed {
                all_passed = false;
                let skipped = self.steps.len() - seq;
                if skipped > 0 {
                    info!(skipped = skipped, "stopping after failed step");
                }
                break;
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        obs::emit_run_finished(&run_id, duration_ms, statuses.len(), all_passed);

        PipelineReport {
            run_id,
            started_at,
            duration_ms,
            success: all_passed,
            statuses,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::FnStep;

    fn report(statuses: Vec<StepStatus>) -> PipelineReport {
        PipelineReport {
            run_id: "test".to_string(),
            started_at: Utc::now(),
            duration_ms: 0,
            success: statuses.iter().all(|s| s.success),
            statuses,
        }
    }

    #[test]
    fn test_report_counts() {
        let r = report(vec![
            StepStatus::passed("a"),
            StepStatus::passed("b"),
            StepStatus::failed("c", "boom"),
        ]);
        assert_eq!(r.passed_count(), 2);
        assert_eq!(r.failed_count(), 1);
        assert_eq!(r.render(), "✓ a\n✓ b\n✗ c: boom");
    }

    #[tokio::test]
    async fn test_empty_engine_succeeds() {
        let engine = PipelineEngine::new(vec![]);
        assert!(engine.is_empty());
        let r = engine.run().await;
        assert!(r.success);
        assert!(r.statuses.is_empty());
    }

    #[tokio::test]
    async fn test_err_becomes_failed_status() {
        let engine = PipelineEngine::new(vec![Box::new(FnStep::sync("io", || {
            anyhow::bail!("disk full")
        }))]);
        let r = engine.run().await;
        assert!(!r.success);
        let diag = r.statuses[0].diagnostic.as_deref().unwrap();
        assert!(diag.contains("Step 'io' execution error"), "{diag}");
        assert!(diag.contains("disk full"), "{diag}");
    }

    #[test]
    fn test_panic_message_payloads() {
        let s: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(&*s), "static");
        let s: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*s), "owned");
        let s: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(&*s), "non-string panic payload");
    }

    #[test]
    fn test_report_serializes() {
        let r = report(vec![StepStatus::passed("a")]);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["statuses"][0]["label"], "a");
        assert_eq!(json["success"], true);
    }
}
