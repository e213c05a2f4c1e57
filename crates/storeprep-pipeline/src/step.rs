//! Checklist step abstraction.

use std::future::Future;

use async_trait::async_trait;
use futures::future::BoxFuture;
use storeprep_core::{ManifestVerdict, StepStatus};

/// What a step reports back to the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutcome {
    pub success: bool,
    pub diagnostic: Option<String>,

    /// Detail lines recorded ahead of the step's own status.
    pub sub_statuses: Vec<StepStatus>,
}

impl StepOutcome {
    pub fn passed() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failed(diagnostic: impl Into<String>) -> Self {
        Self {
            success: false,
            diagnostic: Some(diagnostic.into()),
            sub_statuses: Vec::new(),
        }
    }

    pub fn from_bool(success: bool) -> Self {
        Self {
            success,
            ..Self::default()
        }
    }

    pub fn with_diagnostic(mut self, diagnostic: impl Into<String>) -> Self {
        self.diagnostic = Some(diagnostic.into());
        self
    }

    pub fn with_sub_statuses(mut self, statuses: Vec<StepStatus>) -> Self {
        self.sub_statuses = statuses;
        self
    }
}

impl From<ManifestVerdict> for StepOutcome {
    fn from(verdict: ManifestVerdict) -> Self {
        Self {
            success: verdict.passed,
            diagnostic: verdict.diagnostic(),
            sub_statuses: Vec::new(),
        }
    }
}

/// A named unit of checklist work.
///
/// Returning `Err` (or panicking) is reported by the engine as a failed step.
#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self) -> anyhow::Result<StepOutcome>;
}

type StepFn = Box<dyn Fn() -> BoxFuture<'static, anyhow::Result<StepOutcome>> + Send + Sync>;

/// Step backed by a closure.
pub struct FnStep {
    name: String,
    operation: StepFn,
}

impl FnStep {
    pub fn new<F, Fut>(name: impl Into<String>, operation: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<StepOutcome>> + Send + 'static,
    {
        Self {
            name: name.into(),
            operation: Box::new(move || Box::pin(operation())),
        }
    }

    /// Step whose work is synchronous.
    pub fn sync<F>(name: impl Into<String>, operation: F) -> Self
    where
        F: Fn() -> anyhow::Result<StepOutcome> + Send + Sync + 'static,
    {
        Self::new(name, move || std::future::ready(operation()))
    }

    /// Step that only answers pass or fail.
    pub fn check<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self::sync(name, move || Ok(StepOutcome::from_bool(predicate())))
    }
}

#[async_trait]
impl Step for FnStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self) -> anyhow::Result<StepOutcome> {
        (self.operation)().await
    }
}

impl std::fmt::Debug for FnStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStep").field("name", &self.name).finish()
    }
}
