//! The fixed release checklist.
//!
//! Order: manifest check against the source tree, staging folder setup, the
//! artifact build, manifest check against the merged output, listing
//! validation, upload, and finally revealing the staging folder.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use storeprep_core::{CatalogExporter, ManifestAssertionChecker, RateProvider, ReleaseAssetStager, ReleaseSettings};
use tracing::{error, info};

use crate::pipeline::{PipelineEngine, PipelineReport};
use crate::runner::{ArtifactBuilder, BuildRequest, BuildVariant, CommandArtifactBuilder};
use crate::step::{FnStep, Step, StepOutcome};
use crate::upload::{FolderUploader, UnconfiguredUploader, Uploader};

pub const PRE_BUILD_MANIFEST: &str = "Pre-build manifest";
pub const PREPARE_LISTING: &str = "Prepare Store Listing";
pub const BUILD_ARTIFACT: &str = "Build Artifact";
pub const POST_BUILD_MANIFEST: &str = "Post-build manifest";
pub const VALIDATE_LISTING: &str = "Validate Listing Files";
pub const UPLOAD: &str = "Upload";
pub const REVEAL_LISTING: &str = "Reveal Listing Folder";

pub const ALL_STEPS: [&str; 7] = [
    PRE_BUILD_MANIFEST,
    PREPARE_LISTING,
    BUILD_ARTIFACT,
    POST_BUILD_MANIFEST,
    VALIDATE_LISTING,
    UPLOAD,
    REVEAL_LISTING,
];

/// Assembles the release steps over shared collaborators.
pub struct ReleaseChecklist {
    settings: Arc<ReleaseSettings>,
    manifest: Arc<ManifestAssertionChecker>,
    stager: Arc<ReleaseAssetStager>,
    builder: Arc<dyn ArtifactBuilder>,
    uploader: Arc<dyn Uploader>,
}

impl ReleaseChecklist {
    pub fn new(
        settings: Arc<ReleaseSettings>,
        stager: ReleaseAssetStager,
        builder: Arc<dyn ArtifactBuilder>,
        uploader: Arc<dyn Uploader>,
    ) -> Self {
        Self {
            manifest: Arc::new(ManifestAssertionChecker::from_settings(&settings)),
            settings,
            stager: Arc::new(stager),
            builder,
            uploader,
        }
    }

    /// Wire the default collaborators: the command builder, a folder
    /// uploader when a destination is set, and the catalog exporter when a
    /// catalog source is set.
    pub fn from_settings(settings: Arc<ReleaseSettings>, rates: Arc<RateProvider>) -> anyhow::Result<Self> {
        let mut stager = ReleaseAssetStager::new(settings.clone());
        if let Some(exporter) =
            CatalogExporter::from_settings(&settings, rates).context("failed to load product catalog")?
        {
            stager = stager.with_catalog(exporter);
        }

        let builder: Arc<dyn ArtifactBuilder> = Arc::new(CommandArtifactBuilder::from_settings(&settings));
        let uploader: Arc<dyn Uploader> = match &settings.upload_target.destination {
            Some(dest) => Arc::new(FolderUploader::new(
                settings.resolve(dest),
                settings.build.package_id.clone(),
            )),
            None => Arc::new(UnconfiguredUploader),
        };

        Ok(Self::new(settings, stager, builder, uploader))
    }

    pub fn settings(&self) -> &ReleaseSettings {
        &self.settings
    }

    pub fn stager(&self) -> &ReleaseAssetStager {
        &self.stager
    }

    /// The seven checklist steps for `variant`, in order.
    pub fn steps(&self, variant: BuildVariant) -> Vec<Box<dyn Step>> {
        let include_catalog = variant.iap && self.settings.include_catalog_in_iap_build;

        let manifest = self.manifest.clone();
        let pre_build = FnStep::sync(PRE_BUILD_MANIFEST, move || {
            Ok(manifest.validate_pre_build(variant.iap).into())
        });

        let stager = self.stager.clone();
        let prepare = FnStep::sync(PREPARE_LISTING, move || {
            stager.prepare_directory()?;
            Ok(StepOutcome::passed())
        });

        let build = {
            let settings = self.settings.clone();
            let builder = self.builder.clone();
            let stager = self.stager.clone();
            FnStep::new(BUILD_ARTIFACT, move || {
                let settings = settings.clone();
                let builder = builder.clone();
                let stager = stager.clone();
                async move { build_artifact(&settings, builder.as_ref(), stager.staging_dir(), variant).await }
            })
        };

        let manifest = self.manifest.clone();
        let post_build = FnStep::sync(POST_BUILD_MANIFEST, move || {
            Ok(manifest.validate_post_build(variant.iap).into())
        });

        let stager = self.stager.clone();
        let validate = FnStep::new(VALIDATE_LISTING, move || {
            let stager = stager.clone();
            async move {
                let report = stager.validate_and_stage_assets(include_catalog).await;
                let outcome = StepOutcome::from_bool(report.success);
                let outcome = if report.success {
                    outcome
                } else {
                    outcome.with_diagnostic(format!("failed: {}", report.failed_labels().join(", ")))
                };
                Ok(outcome.with_sub_statuses(report.statuses))
            }
        });

        let upload = {
            let enabled = self.settings.upload;
            let uploader = self.uploader.clone();
            let stager = self.stager.clone();
            FnStep::new(UPLOAD, move || {
                let uploader = uploader.clone();
                let stager = stager.clone();
                async move {
                    if !enabled {
                        return Ok(StepOutcome::passed().with_diagnostic("upload disabled"));
                    }
                    let summary = uploader.upload(stager.staging_dir()).await?;
                    Ok(StepOutcome::passed().with_diagnostic(format!(
                        "{} uploaded, {} unchanged",
                        summary.uploaded, summary.skipped
                    )))
                }
            })
        };

        let stager = self.stager.clone();
        let reveal = FnStep::check(REVEAL_LISTING, move || stager.reveal());

        vec![
            Box::new(pre_build),
            Box::new(prepare),
            Box::new(build),
            Box::new(post_build),
            Box::new(validate),
            Box::new(upload),
            Box::new(reveal),
        ]
    }

    /// Run the full checklist.
    pub async fn run(&self, variant: BuildVariant) -> PipelineReport {
        info!(iap = variant.iap, apk = variant.apk, "running release checklist");
        PipelineEngine::new(self.steps(variant)).run().await
    }

    /// Prepare, stage without the catalog, and reveal.
    pub async fn stage_only(&self) -> PipelineReport {
        let steps: Vec<Box<dyn Step>> = self
            .steps(BuildVariant::default())
            .into_iter()
            .filter(|s| matches!(s.name(), PREPARE_LISTING | VALIDATE_LISTING | REVEAL_LISTING))
            .collect();
        PipelineEngine::new(steps).run().await
    }
}

async fn build_artifact(
    settings: &ReleaseSettings,
    builder: &dyn ArtifactBuilder,
    staging_dir: &Path,
    variant: BuildVariant,
) -> anyhow::Result<StepOutcome> {
    if !settings.build.enabled {
        return Ok(StepOutcome::passed().with_diagnostic("build disabled"));
    }

    let request = BuildRequest {
        target_platform: settings.build.target_platform.clone(),
        variant: BuildVariant {
            iap: variant.iap,
            apk: variant.apk || settings.apk_build,
        },
    };
    let output = builder.build(&request).await?;
    if !output.passed() {
        let detail = output.stderr_tail().unwrap_or("no output");
        error!(exit_code = output.exit_code, detail = %detail, "build failed");
        return Ok(StepOutcome::failed(format!(
            "build exited with code {}: {}",
            output.exit_code, detail
        )));
    }

    if settings.create_listing {
        let name = output
            .artifact
            .file_name()
            .with_context(|| format!("artifact path {} has no file name", output.artifact.display()))?;
        let target = staging_dir.join(name);
        tokio::fs::copy(&output.artifact, &target)
            .await
            .with_context(|| format!("failed to copy {} into staging", output.artifact.display()))?;
        info!(artifact = %target.display(), "artifact staged");
    }

    Ok(StepOutcome::passed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::BuildOutput;
    use crate::upload::UploadSummary;
    use async_trait::async_trait;
    use std::path::PathBuf;

    struct NoBuild;

    #[async_trait]
    impl ArtifactBuilder for NoBuild {
        async fn build(&self, _request: &BuildRequest) -> anyhow::Result<BuildOutput> {
            anyhow::bail!("builder should not be called")
        }
    }

    struct NoUpload;

    #[async_trait]
    impl Uploader for NoUpload {
        async fn upload(&self, _staging_dir: &Path) -> anyhow::Result<UploadSummary> {
            anyhow::bail!("uploader should not be called")
        }
    }

    fn checklist(settings: ReleaseSettings) -> ReleaseChecklist {
        let settings = Arc::new(settings);
        let stager = ReleaseAssetStager::new(settings.clone());
        ReleaseChecklist::new(settings, stager, Arc::new(NoBuild), Arc::new(NoUpload))
    }

    #[test]
    fn test_step_order() {
        let c = checklist(ReleaseSettings::default());
        let names: Vec<String> = c
            .steps(BuildVariant::default())
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        assert_eq!(names, ALL_STEPS);
    }

    #[tokio::test]
    async fn test_disabled_build_and_upload_pass() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = ReleaseSettings {
            project_root: dir.path().to_path_buf(),
            ..ReleaseSettings::default()
        };
        settings.build.enabled = false;
        settings.upload = false;
        let c = checklist(settings);

        let steps = c.steps(BuildVariant::default());
        let build = steps.iter().find(|s| s.name() == BUILD_ARTIFACT).unwrap();
        let outcome = build.execute().await.unwrap();
        assert!(outcome.success);

        let upload = steps.iter().find(|s| s.name() == UPLOAD).unwrap();
        assert!(upload.execute().await.unwrap().success);
    }

    #[tokio::test]
    async fn test_from_settings_unconfigured_upload_fails_step() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = ReleaseSettings {
            project_root: dir.path().to_path_buf(),
            ..ReleaseSettings::default()
        };
        settings.upload = true;
        let fetcher = Arc::new(storeprep_core::HttpRateFetcher::new("http://127.0.0.1:9/{base}").unwrap());
        let rates = Arc::new(RateProvider::new(fetcher, storeprep_core::RateRefresh::ProcessLifetime));
        let c = ReleaseChecklist::from_settings(Arc::new(settings), rates).unwrap();
        assert!(!c.stager().has_catalog());

        let steps = c.steps(BuildVariant::default());
        let upload = steps.iter().find(|s| s.name() == UPLOAD).unwrap();
        let err = upload.execute().await.unwrap_err();
        assert!(err.to_string().contains("no upload destination"));
    }

    #[test]
    fn test_from_settings_bad_catalog_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = ReleaseSettings {
            project_root: dir.path().to_path_buf(),
            ..ReleaseSettings::default()
        };
        settings.catalog.source = Some(PathBuf::from("missing.json"));
        let fetcher = Arc::new(storeprep_core::HttpRateFetcher::new("http://127.0.0.1:9/{base}").unwrap());
        let rates = Arc::new(RateProvider::new(fetcher, storeprep_core::RateRefresh::ProcessLifetime));
        let err = ReleaseChecklist::from_settings(Arc::new(settings), rates).err().unwrap();
        assert!(format!("{err:#}").contains("product catalog"));
    }
}
