//! Asset existence and exact-size checks.

use std::path::{Path, PathBuf};

use image::ImageReader;

use super::{AssetSpec, Dimensions};
use crate::error::{Result, StoreprepError};

/// Read the pixel size of an image without decoding the pixel data.
///
/// Zero-byte, truncated and unrecognised files come back as
/// [`StoreprepError::Decode`].
pub fn probe_dimensions(path: &Path) -> Result<Dimensions> {
    let decode_err = |reason: String| StoreprepError::Decode {
        path: path.to_path_buf(),
        reason,
    };

    let reader = ImageReader::open(path)
        .map_err(|e| StoreprepError::io(path, e))?
        .with_guessed_format()
        .map_err(|e| StoreprepError::io(path, e))?;
    if reader.format().is_none() {
        return Err(decode_err("unrecognised image format".to_string()));
    }
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| decode_err(e.to_string()))?;
    Ok(Dimensions::new(width, height))
}

pub struct AssetValidator;

impl AssetValidator {
    /// Confirm the asset's source exists and, if enabled, that its size matches exactly.
    ///
    /// Returns the resolved source path on success.
    pub fn validate(spec: &AssetSpec) -> Result<PathBuf> {
        let source = spec.source.as_ref().ok_or_else(|| {
            StoreprepError::MissingInput(format!("no source configured for {}", spec.label))
        })?;

        if !source.is_file() {
            return Err(StoreprepError::MissingInput(format!(
                "source for {} not found at {}",
                spec.label,
                source.display()
            )));
        }

        if spec.check_dimensions {
            let actual = probe_dimensions(source)?;
            if actual != spec.expected {
                return Err(StoreprepError::DimensionMismatch {
                    label: spec.label.clone(),
                    path: source.clone(),
                    expected: spec.expected,
                    actual,
                });
            }
        }

        Ok(source.clone())
    }
}
