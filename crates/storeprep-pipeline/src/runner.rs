//! Store artifact build through an external command.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use storeprep_core::settings::BuildSettings;
use storeprep_core::ReleaseSettings;
use tokio::process::Command;
use tracing::info;

/// Which flavour of the artifact to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildVariant {
    /// In-app purchases compiled in.
    pub iap: bool,
    /// Produce an `.apk` instead of an app bundle.
    pub apk: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub target_platform: String,
    pub variant: BuildVariant,
}

/// Result of a build invocation.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// Where the artifact was expected to be written.
    pub artifact: PathBuf,

    /// Exit code (0 = success).
    pub exit_code: i32,

    pub stdout: String,
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    pub success: bool,
}

impl BuildOutput {
    /// Whether the build exited cleanly and produced its artifact.
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }

    /// Last non-empty stderr line, for status diagnostics.
    pub fn stderr_tail(&self) -> Option<&str> {
        self.stderr.lines().rev().map(str::trim).find(|l| !l.is_empty())
    }
}

/// Produces the store artifact.
#[async_trait]
pub trait ArtifactBuilder: Send + Sync {
    async fn build(&self, request: &BuildRequest) -> anyhow::Result<BuildOutput>;
}

/// Artifact file name: `{package}_{version}_{code}.aab`, with a `no_iap`
/// marker when purchases are compiled out and `.apk` for APK builds.
/// Dots in the package id become underscores.
pub fn artifact_name(package_id: &str, version_name: &str, version_code: u32, variant: BuildVariant) -> String {
    let package_id = package_id.replace('.', "_");
    let extension = if variant.apk { "apk" } else { "aab" };
    if variant.iap {
        format!("{package_id}_{version_name}_{version_code}.{extension}")
    } else {
        format!("{package_id}_no_iap_{version_name}_{version_code}.{extension}")
    }
}

/// Runs the configured build command.
///
/// The command is an argv list; `{output}` and `{platform}` are substituted
/// in every argument. `STOREPREP_OUTPUT` and `STOREPREP_IAP` are also set in
/// the child environment.
#[derive(Debug, Clone)]
pub struct CommandArtifactBuilder {
    build: BuildSettings,
    working_dir: PathBuf,
    output_dir: PathBuf,
}

impl CommandArtifactBuilder {
    pub fn new(build: BuildSettings, working_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            build,
            working_dir: working_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn from_settings(settings: &ReleaseSettings) -> Self {
        Self::new(
            settings.build.clone(),
            settings.project_root.clone(),
            settings.resolve(&settings.build.output_dir),
        )
    }

    pub fn artifact_path(&self, variant: BuildVariant) -> PathBuf {
        self.output_dir.join(artifact_name(
            &self.build.package_id,
            &self.build.version_name,
            self.build.version_code,
            variant,
        ))
    }

    fn argv(&self, artifact: &Path, platform: &str) -> Vec<String> {
        let output = artifact.to_string_lossy();
        self.build
            .command
            .iter()
            .map(|arg| arg.replace("{output}", &output).replace("{platform}", platform))
            .collect()
    }
}

#[async_trait]
impl ArtifactBuilder for CommandArtifactBuilder {
    async fn build(&self, request: &BuildRequest) -> anyhow::Result<BuildOutput> {
        let start = Instant::now();

        if self.build.command.is_empty() {
            anyhow::bail!("no build command configured");
        }

        let artifact = self.artifact_path(request.variant);
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let argv = self.argv(&artifact, &request.target_platform);
        info!(command = ?argv, artifact = %artifact.display(), "starting build");

        let child = Command::new(&argv[0])
            .args(&argv[1..])
            .current_dir(&self.working_dir)
            .env("STOREPREP_OUTPUT", &artifact)
            .env("STOREPREP_IAP", if request.variant.iap { "1" } else { "0" })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = if self.build.timeout_secs > 0 {
            tokio::time::timeout(Duration::from_secs(self.build.timeout_secs), child.wait_with_output())
                .await
                .map_err(|_| anyhow::anyhow!("build timed out after {} seconds", self.build.timeout_secs))??
        } else {
            child.wait_with_output().await?
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let mut stderr = String::from_utf8_lossy(&output.stderr).to_string();

        let mut success = output.status.success();
        if success && !artifact.is_file() {
            success = false;
            stderr.push_str(&format!("\nbuild finished but {} was not produced", artifact.display()));
        }

        Ok(BuildOutput {
            artifact,
            exit_code,
            stdout,
            stderr,
            duration_ms,
            success,
        })
    }
}
