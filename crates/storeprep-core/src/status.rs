//! Step status records, the user-visible checklist report lines.

use serde::{Deserialize, Serialize};

/// Outcome of one executed step or staged asset.
///
/// Statuses are append-only; their order is execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepStatus {
    pub label: String,
    pub success: bool,
    /// Human-readable reason for a failure, or a recovered warning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl StepStatus {
    pub fn passed(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            success: true,
            diagnostic: None,
        }
    }

    pub fn failed(label: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            success: false,
            diagnostic: Some(diagnostic.into()),
        }
    }

    /// Attach a diagnostic without changing the outcome.
    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = Some(diagnostic.into());
        self
    }

    /// One report line: `✓ label` or `✗ label: diagnostic`.
    pub fn render(&self) -> String {
        let mark = if self.success { "✓" } else { "✗" };
        match &self.diagnostic {
            Some(d) if !self.success => format!("{} {}: {}", mark, self.label, d),
            _ => format!("{} {}", mark, self.label),
        }
    }
}
