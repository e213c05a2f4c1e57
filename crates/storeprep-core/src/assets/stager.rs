//! Store-listing staging directory.
//!
//! The stager owns the staging directory lifecycle and copies every listing
//! asset into it under its canonical name. Unlike the top-level pipeline it
//! never stops early: every asset gets a status line, and the aggregate is
//! the AND of all of them.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::validator::AssetValidator;
use super::{asset_manifest, AssetSpec};
use crate::catalog::exporter::CatalogExporter;
use crate::error::{Result, StoreprepError};
use crate::obs;
use crate::settings::ReleaseSettings;
use crate::status::StepStatus;

pub const CATALOG_LABEL: &str = "Generate Catalog";

/// Per-asset statuses plus their aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagingReport {
    pub statuses: Vec<StepStatus>,
    pub success: bool,
}

impl StagingReport {
    fn push(&mut self, status: StepStatus) {
        self.statuses.push(status);
    }

    fn finish(mut self) -> Self {
        self.success = self.statuses.iter().all(|s| s.success);
        self
    }

    pub fn failed_labels(&self) -> Vec<&str> {
        self.statuses
            .iter()
            .filter(|s| !s.success)
            .map(|s| s.label.as_str())
            .collect()
    }
}

pub struct ReleaseAssetStager {
    settings: Arc<ReleaseSettings>,
    staging_dir: PathBuf,
    catalog: Option<CatalogExporter>,
}

impl ReleaseAssetStager {
    pub fn new(settings: Arc<ReleaseSettings>) -> Self {
        let staging_dir = settings.staging_path();
        Self {
            settings,
            staging_dir,
            catalog: None,
        }
    }

    /// Attach the catalog exporter; without one, catalog export reports a failure.
    pub fn with_catalog(mut self, exporter: CatalogExporter) -> Self {
        self.catalog = Some(exporter);
        self
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn has_catalog(&self) -> bool {
        self.catalog.is_some()
    }

    /// Create the staging directory.
    ///
    /// Without `overwrite` an existing directory is removed first; with it,
    /// existing files are kept and overwritten one by one during staging.
    pub fn prepare_directory(&self) -> Result<()> {
        if !self.settings.create_listing {
            info!("store listing disabled, skipping staging directory");
            return Ok(());
        }

        self.settings.check_staging_path()?;
        let dir = &self.staging_dir;
        if !self.settings.overwrite && dir.exists() {
            fs::remove_dir_all(dir).map_err(|e| StoreprepError::io(dir, e))?;
        }
        fs::create_dir_all(dir).map_err(|e| StoreprepError::io(dir, e))?;
        info!(dir = %dir.display(), overwrite = self.settings.overwrite, "staging directory ready");
        Ok(())
    }

    /// Validate and copy every listing asset, then optionally export the catalog.
    pub async fn validate_and_stage_assets(&self, include_catalog_export: bool) -> StagingReport {
        let mut report = StagingReport::default();
        if !self.settings.create_listing {
            return report.finish();
        }

        // Built here so screenshot sizes follow the current orientation flag.
        for spec in asset_manifest(&self.settings) {
            report.push(self.stage_asset(&spec));
        }

        if include_catalog_export && self.settings.generate_catalog {
            report.push(self.export_catalog().await);
        }

        report.finish()
    }

    /// Validate one asset and copy it into the staging directory.
    pub fn stage_asset(&self, spec: &AssetSpec) -> StepStatus {
        let staged = AssetValidator::validate(spec).and_then(|source| {
            let target = self.staging_dir.join(&spec.target_name);
            fs::copy(&source, &target).map_err(|e| StoreprepError::io(&target, e))?;
            Ok(target)
        });

        match staged {
            Ok(_) => {
                obs::emit_asset_staged(&spec.label, &spec.target_name);
                StepStatus::passed(&spec.label)
            }
            Err(e) => {
                obs::emit_asset_rejected(&spec.label, &e);
                StepStatus::failed(&spec.label, e.to_string())
            }
        }
    }

    async fn export_catalog(&self) -> StepStatus {
        let Some(exporter) = &self.catalog else {
            let msg = "catalog export requested but no product catalog is configured";
            error!("{msg}");
            return StepStatus::failed(CATALOG_LABEL, msg);
        };

        let catalog = &self.settings.catalog;
        match exporter.export(&catalog.category, &catalog.conversions).await {
            Ok(summary) if summary.warnings.is_empty() => StepStatus::passed(CATALOG_LABEL),
            Ok(summary) => StepStatus::passed(CATALOG_LABEL).with_diagnostic(summary.warnings.join("; ")),
            Err(e) => {
                error!(error = %e, "catalog export failed");
                StepStatus::failed(CATALOG_LABEL, e.to_string())
            }
        }
    }

    /// Open the staging directory in the host file browser.
    ///
    /// Always succeeds; a browser that fails to launch is only logged.
    pub fn reveal(&self) -> bool {
        let dir = &self.staging_dir;
        if !dir.is_dir() {
            warn!(dir = %dir.display(), "nothing to reveal, staging directory does not exist");
            return true;
        }

        let opener = if cfg!(target_os = "macos") {
            "open"
        } else if cfg!(target_os = "windows") {
            "explorer"
        } else {
            "xdg-open"
        };
        if let Err(e) = Command::new(opener).arg(dir).spawn() {
            warn!(opener = opener, error = %e, "could not open file browser");
        }
        true
    }
}
