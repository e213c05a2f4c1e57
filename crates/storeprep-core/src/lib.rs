//! storeprep core library
//!
//! Building blocks of the pre-release checklist:
//! - `manifest`: token presence checks on Android manifests, before and after the build
//! - `assets`: listing asset validation and staging into a flat output folder
//! - `catalog`: product catalog model, currency conversion and catalog CSV export
//! - `settings`: the immutable settings record read at run start

pub mod assets;
pub mod catalog;
pub mod error;
pub mod manifest;
pub mod obs;
pub mod settings;
pub mod status;
pub mod telemetry;

pub use assets::stager::{ReleaseAssetStager, StagingReport};
pub use assets::validator::{probe_dimensions, AssetValidator};
pub use assets::{asset_manifest, AssetKind, AssetSpec, Dimensions};
pub use catalog::currency::{
    CurrencyConversion, HttpRateFetcher, RateFetcher, RateProvider, RateRefresh, RateSource,
    RoundingRule,
};
pub use catalog::exporter::{CatalogExporter, ExportOptions, ExportSummary};
pub use catalog::{
    CatalogSource, Category, CategorySelector, JsonCatalogSource, Product, ProductCatalog,
    ProductKind,
};
pub use error::{Result, StoreprepError};
pub use manifest::{ManifestAssertionChecker, ManifestRule, ManifestVerdict};
pub use settings::ReleaseSettings;
pub use status::StepStatus;
pub use telemetry::init_tracing;
