//! Release settings, read once at run start and never mutated afterwards.
//!
//! Settings are stored as JSON. Relative paths resolve against
//! `project_root`.

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::catalog::currency::{CurrencyConversion, RateRefresh};
use crate::catalog::{CategorySelector, ProductKind};
use crate::error::{Result, StoreprepError};

/// Minimum number of screenshot slots a listing carries.
pub const MIN_SCREENSHOTS: usize = 3;

pub const DEFAULT_RATES_ENDPOINT: &str = "https://api.exchangerate-api.com/v4/latest/{base}";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseSettings {
    pub project_root: PathBuf,

    /// Staging folder, relative to the project root unless absolute.
    pub staging_dir: PathBuf,

    pub create_listing: bool,

    /// Merge into an existing staging folder instead of recreating it.
    pub overwrite: bool,

    pub landscape: bool,
    pub generate_catalog: bool,
    pub include_catalog_in_iap_build: bool,
    pub apk_build: bool,
    pub upload: bool,

    pub assets: AssetSources,
    pub manifest: ManifestSettings,
    pub build: BuildSettings,
    pub catalog: CatalogSettings,
    pub upload_target: UploadSettings,
}

/// Source locations of the listing assets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetSources {
    pub icon: Option<PathBuf>,
    pub feature_image: Option<PathBuf>,
    pub screenshots: Vec<Option<PathBuf>>,
    pub info_text: Option<PathBuf>,
    pub keystore: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestSettings {
    /// Hand-written manifests checked before the build.
    pub source_paths: Vec<PathBuf>,
    /// Build-merged manifests checked after the build.
    pub merged_paths: Vec<PathBuf>,
    pub billing_token: String,
    pub ad_id_token: String,
    /// Treat a missing merged manifest as a failure instead of a pass.
    pub strict_post_build: bool,
}

impl Default for ManifestSettings {
    fn default() -> Self {
        Self {
            source_paths: vec![PathBuf::from("Assets/Plugins/Android/AndroidManifest.xml")],
            merged_paths: vec![PathBuf::from("Library/Bee/Android/Prj/AndroidManifest.xml")],
            billing_token: "BILLING".to_string(),
            ad_id_token: "AD_ID".to_string(),
            strict_post_build: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
    pub enabled: bool,

    /// Build command; `{output}` and `{platform}` are substituted per argument.
    pub command: Vec<String>,

    pub target_platform: String,
    pub package_id: String,
    pub version_name: String,
    pub version_code: u32,
    pub output_dir: PathBuf,

    /// Timeout in seconds, 0 disables it.
    pub timeout_secs: u64,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            command: Vec::new(),
            target_platform: "android".to_string(),
            package_id: "com.example.game".to_string(),
            version_name: "1.0.0".to_string(),
            version_code: 1,
            output_dir: PathBuf::from("Build"),
            timeout_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    /// Product catalog JSON; no catalog means catalog export is unavailable.
    pub source: Option<PathBuf>,
    pub category: CategorySelector,
    pub product_kind: ProductKind,
    pub locale: String,
    pub artifact_name: String,
    pub conversions: Vec<CurrencyConversion>,
    pub rate_refresh: RateRefresh,
    pub rates_endpoint: String,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            source: None,
            category: CategorySelector::Index(0),
            product_kind: ProductKind::Consumable,
            locale: "en_US".to_string(),
            artifact_name: "iap_products.csv".to_string(),
            conversions: vec![CurrencyConversion::live("VN", "VND", "USD")],
            rate_refresh: RateRefresh::default(),
            rates_endpoint: DEFAULT_RATES_ENDPOINT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    pub destination: Option<PathBuf>,
}

impl Default for ReleaseSettings {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            staging_dir: PathBuf::from("StoreListing"),
            create_listing: true,
            overwrite: false,
            landscape: false,
            generate_catalog: false,
            include_catalog_in_iap_build: true,
            apk_build: false,
            upload: false,
            assets: AssetSources {
                screenshots: vec![None; MIN_SCREENSHOTS],
                ..AssetSources::default()
            },
            manifest: ManifestSettings::default(),
            build: BuildSettings::default(),
            catalog: CatalogSettings::default(),
            upload_target: UploadSettings::default(),
        }
    }
}

impl ReleaseSettings {
    /// Load settings from a JSON file, validated and normalized.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| StoreprepError::io(path, e))?;
        let settings: ReleaseSettings = serde_json::from_str(&raw)?;
        settings.validate()?;
        Ok(settings.normalized())
    }

    /// Write settings as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreprepError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| StoreprepError::io(path, e))
    }

    /// Defaults for everything except the project root.
    pub fn reset(&self) -> Self {
        Self {
            project_root: self.project_root.clone(),
            ..Self::default()
        }
    }

    /// Pad the screenshot list up to [`MIN_SCREENSHOTS`] slots.
    pub fn normalized(mut self) -> Self {
        if self.assets.screenshots.len() < MIN_SCREENSHOTS {
            self.assets.screenshots.resize(MIN_SCREENSHOTS, None);
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.staging_dir.as_os_str().is_empty() {
            return Err(StoreprepError::Settings("staging_dir must not be empty".into()));
        }
        for conversion in &self.catalog.conversions {
            if conversion.minor_unit_scale == 0 {
                return Err(StoreprepError::Settings(format!(
                    "conversion to {} has a zero minor_unit_scale",
                    conversion.currency
                )));
            }
        }
        if self.catalog.artifact_name.trim().is_empty() {
            return Err(StoreprepError::Settings(
                "catalog.artifact_name must not be empty".into(),
            ));
        }
        self.check_staging_path()
    }

    /// Reject a staging folder that is, or contains, the project root or a
    /// configured source. Recreating such a folder would delete them.
    pub fn check_staging_path(&self) -> Result<()> {
        let staging = absolute(&self.staging_path());
        let root = absolute(&self.project_root);
        if root.starts_with(&staging) {
            return Err(StoreprepError::Settings(format!(
                "staging_dir {} contains the project root",
                staging.display()
            )));
        }
        for source in self.source_paths() {
            if absolute(&self.resolve(source)).starts_with(&staging) {
                return Err(StoreprepError::Settings(format!(
                    "staging_dir {} contains source {}",
                    staging.display(),
                    source.display()
                )));
            }
        }
        Ok(())
    }

    /// Every configured input file: listing assets, manifests and the catalog.
    fn source_paths(&self) -> impl Iterator<Item = &PathBuf> {
        let assets = &self.assets;
        assets
            .icon
            .iter()
            .chain(assets.feature_image.iter())
            .chain(assets.screenshots.iter().flatten())
            .chain(assets.info_text.iter())
            .chain(assets.keystore.iter())
            .chain(self.manifest.source_paths.iter())
            .chain(self.manifest.merged_paths.iter())
            .chain(self.catalog.source.iter())
    }

    /// Resolve a settings path against the project root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    pub fn staging_path(&self) -> PathBuf {
        self.resolve(&self.staging_dir)
    }
}

/// Absolute, lexically normalized form of `path`; symlinks are not followed.
fn absolute(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                } else if out.as_os_str().is_empty() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = ReleaseSettings::default();
        assert!(settings.create_listing);
        assert!(!settings.overwrite);
        assert!(!settings.landscape);
        assert!(!settings.generate_catalog);
        assert!(settings.include_catalog_in_iap_build);
        assert_eq!(settings.assets.screenshots.len(), MIN_SCREENSHOTS);
        assert_eq!(settings.manifest.billing_token, "BILLING");
    }

    #[test]
    fn test_reset_keeps_project_root_only() {
        let mut settings = ReleaseSettings::default();
        settings.project_root = PathBuf::from("/work/game");
        settings.landscape = true;
        settings.upload = true;
        settings.assets.screenshots = vec![Some(PathBuf::from("a.png")); 5];

        let reset = settings.reset();
        assert_eq!(reset.project_root, PathBuf::from("/work/game"));
        assert!(!reset.landscape);
        assert!(!reset.upload);
        assert_eq!(reset.assets.screenshots, vec![None; MIN_SCREENSHOTS]);
        // The original value is untouched.
        assert!(settings.landscape);
    }

    #[test]
    fn test_normalized_pads_screenshots() {
        let mut settings = ReleaseSettings::default();
        settings.assets.screenshots = vec![Some(PathBuf::from("one.png"))];
        let settings = settings.normalized();
        assert_eq!(settings.assets.screenshots.len(), 3);
        assert_eq!(settings.assets.screenshots[0], Some(PathBuf::from("one.png")));
    }

    #[test]
    fn test_normalized_keeps_extra_screenshots() {
        let mut settings = ReleaseSettings::default();
        settings.assets.screenshots = vec![None; 6];
        assert_eq!(settings.normalized().assets.screenshots.len(), 6);
    }

    #[test]
    fn test_load_partial_json_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "landscape": true, "assets": { "icon": "art/icon.png" } }"#)
            .unwrap();

        let settings = ReleaseSettings::load(&path).unwrap();
        assert!(settings.landscape);
        assert_eq!(settings.assets.icon, Some(PathBuf::from("art/icon.png")));
        assert_eq!(settings.assets.screenshots.len(), MIN_SCREENSHOTS);
        assert_eq!(settings.staging_dir, PathBuf::from("StoreListing"));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let mut settings = ReleaseSettings::default();
        settings.generate_catalog = true;
        settings.save(&path).unwrap();

        assert_eq!(ReleaseSettings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_load_rejects_zero_minor_unit_scale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{ "catalog": { "conversions": [
                { "region": "VN", "currency": "VND",
                  "source": { "kind": "fixed", "rate": "25200" },
                  "minor_unit_scale": 0 } ] } }"#,
        )
        .unwrap();

        match ReleaseSettings::load(&path) {
            Err(StoreprepError::Settings(msg)) => assert!(msg.contains("VND")),
            other => panic!("expected settings error, got {other:?}"),
        }
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = ReleaseSettings::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, StoreprepError::Io { .. }));
    }

    #[test]
    fn test_resolve_relative_and_absolute() {
        let mut settings = ReleaseSettings::default();
        settings.project_root = PathBuf::from("/proj");
        assert_eq!(settings.resolve(Path::new("a/b.png")), PathBuf::from("/proj/a/b.png"));
        assert_eq!(settings.resolve(Path::new("/abs/c.png")), PathBuf::from("/abs/c.png"));
        assert_eq!(settings.staging_path(), PathBuf::from("/proj/StoreListing"));
    }

    #[test]
    fn test_absolute_normalizes_dots() {
        assert_eq!(absolute(Path::new("/proj/./a/../b")), PathBuf::from("/proj/b"));
        assert_eq!(absolute(Path::new("/proj/..")), PathBuf::from("/"));
        assert!(absolute(Path::new("rel")).is_absolute());
    }

    #[test]
    fn test_staging_dir_must_not_contain_project_or_sources() {
        let mut settings = ReleaseSettings::default();
        settings.project_root = PathBuf::from("/proj/game");
        settings.assets.icon = Some(PathBuf::from("art/icon.png"));
        settings.catalog.source = Some(PathBuf::from("/shared/catalog.json"));
        assert!(settings.validate().is_ok());

        for staging in [".", "..", "sub/..", "/", "/proj", "art", "/shared"] {
            settings.staging_dir = PathBuf::from(staging);
            match settings.validate() {
                Err(StoreprepError::Settings(msg)) => assert!(msg.contains("staging_dir"), "{msg}"),
                other => panic!("{staging}: expected settings error, got {other:?}"),
            }
        }

        // Siblings sharing a name prefix are fine.
        settings.staging_dir = PathBuf::from("ar");
        assert!(settings.validate().is_ok());
        settings.staging_dir = PathBuf::from("art/listing");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_rejects_staging_at_project_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = ReleaseSettings {
            project_root: dir.path().to_path_buf(),
            staging_dir: dir.path().to_path_buf(),
            ..ReleaseSettings::default()
        };
        settings.save(&path).unwrap();

        assert!(matches!(
            ReleaseSettings::load(&path),
            Err(StoreprepError::Settings(_))
        ));
        assert!(path.exists());
    }
}
