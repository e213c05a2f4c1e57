//! Listing asset catalog.
//!
//! The listing is a fixed, ordered set of assets: icon, feature graphic,
//! screenshots in index order, info text and signing keystore. Expected
//! screenshot sizes follow the orientation flag at the moment the manifest
//! is built, so specs are always derived from the current settings.

pub mod stager;
pub mod validator;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::settings::ReleaseSettings;

pub const ICON_SIZE: u32 = 512;
pub const FEATURE_WIDTH: u32 = 1024;
pub const FEATURE_HEIGHT: u32 = 500;
/// Landscape screenshot size; portrait swaps the two.
pub const SCREENSHOT_WIDTH: u32 = 1920;
pub const SCREENSHOT_HEIGHT: u32 = 1080;

pub const INFO_TEXT_NAME: &str = "info.txt";
pub const KEYSTORE_NAME: &str = "keystore.keystore";

/// Pixel size of an image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn swapped(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Expected screenshot size for the given orientation.
pub fn screenshot_dimensions(landscape: bool) -> Dimensions {
    let landscape_size = Dimensions::new(SCREENSHOT_WIDTH, SCREENSHOT_HEIGHT);
    if landscape {
        landscape_size
    } else {
        landscape_size.swapped()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "index")]
pub enum AssetKind {
    Icon,
    FeatureGraphic,
    /// Zero-based screenshot slot.
    Screenshot(usize),
    InfoText,
    Keystore,
}

impl AssetKind {
    pub fn is_image(&self) -> bool {
        matches!(
            self,
            AssetKind::Icon | AssetKind::FeatureGraphic | AssetKind::Screenshot(_)
        )
    }
}

/// One asset to validate and stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSpec {
    pub kind: AssetKind,

    /// Report label, e.g. `Screenshot 2 (1080x1920)`.
    pub label: String,

    /// Resolved source path; `None` when the operator left the slot empty.
    pub source: Option<PathBuf>,

    /// Canonical file name inside the staging directory.
    pub target_name: String,

    pub expected: Dimensions,
    pub check_dimensions: bool,
}

impl AssetSpec {
    pub fn image(
        kind: AssetKind,
        label: String,
        source: Option<PathBuf>,
        target_name: String,
        expected: Dimensions,
    ) -> Self {
        Self {
            kind,
            label,
            source,
            target_name,
            expected,
            check_dimensions: true,
        }
    }

    pub fn file(kind: AssetKind, label: &str, source: Option<PathBuf>, target_name: &str) -> Self {
        Self {
            kind,
            label: label.to_string(),
            source,
            target_name: target_name.to_string(),
            expected: Dimensions::default(),
            check_dimensions: false,
        }
    }
}

/// Build the ordered asset list from the current settings.
pub fn asset_manifest(settings: &ReleaseSettings) -> Vec<AssetSpec> {
    let resolve = |p: &Option<PathBuf>| p.as_ref().map(|p| settings.resolve(p));
    let sources = &settings.assets;

    let icon = Dimensions::new(ICON_SIZE, ICON_SIZE);
    let feature = Dimensions::new(FEATURE_WIDTH, FEATURE_HEIGHT);
    let shot = screenshot_dimensions(settings.landscape);

    let mut specs = Vec::with_capacity(sources.screenshots.len() + 4);
    specs.push(AssetSpec::image(
        AssetKind::Icon,
        format!("Icon ({icon})"),
        resolve(&sources.icon),
        format!("icon_{icon}.png"),
        icon,
    ));
    specs.push(AssetSpec::image(
        AssetKind::FeatureGraphic,
        format!("Feature Image ({feature})"),
        resolve(&sources.feature_image),
        format!("feature_{feature}.png"),
        feature,
    ));
    for (i, source) in sources.screenshots.iter().enumerate() {
        specs.push(AssetSpec::image(
            AssetKind::Screenshot(i),
            format!("Screenshot {} ({shot})", i + 1),
            resolve(source),
            format!("screenshot_{i}_{shot}.png"),
            shot,
        ));
    }
    specs.push(AssetSpec::file(
        AssetKind::InfoText,
        "Info Text",
        resolve(&sources.info_text),
        INFO_TEXT_NAME,
    ));
    specs.push(AssetSpec::file(
        AssetKind::Keystore,
        "Keystore File",
        resolve(&sources.keystore),
        KEYSTORE_NAME,
    ));
    specs
}
