//! storeprep pipeline - ordered release checklist
//!
//! Provides the sequential step engine and the fixed release checklist built on it:
//! - Runs steps in order and stops at the first failure
//! - Folds panics and errors into failed status lines
//! - Builds the store artifact through an external command
//! - Uploads the staging folder to a mirrored destination

pub mod checklist;
pub mod pipeline;
pub mod runner;
pub mod step;
pub mod upload;

// Re-export key types
pub use checklist::{ReleaseChecklist, ALL_STEPS};
pub use pipeline::{PipelineEngine, PipelineReport};
pub use runner::{artifact_name, ArtifactBuilder, BuildOutput, BuildRequest, BuildVariant, CommandArtifactBuilder};
pub use step::{FnStep, Step, StepOutcome};
pub use upload::{FolderUploader, UnconfiguredUploader, UploadSummary, Uploader};
