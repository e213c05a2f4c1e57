//! Priced catalog export in the Play Console in-app product CSV format.
//!
//! One row per product of the selected category and kind. The `Price`
//! column carries a `<REGION>; <micros>` pair per requested conversion.
//! Output is UTF-8 without a byte-order mark.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use tempfile::NamedTempFile;
use tracing::warn;

use super::currency::{CurrencyConversion, RateProvider};
use super::{CatalogSource, CategorySelector, JsonCatalogSource, Product, ProductKind};
use crate::error::{Result, StoreprepError};
use crate::obs;
use crate::settings::ReleaseSettings;

pub const CSV_HEADER: &str = "Product ID,Published State,Purchase Type,Auto Translate,Locale; Title; Description,Auto Fill Prices,Price,Pricing Template ID";

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub product_kind: ProductKind,
    pub locale: String,
    /// Where the CSV is written.
    pub artifact_path: PathBuf,
    /// Directory the finished artifact is copied into, if any.
    pub staging_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub category: String,
    pub rows: usize,
    pub artifact: PathBuf,
    pub staged: Option<PathBuf>,
    /// Recovered problems: malformed prices, rate fallbacks.
    pub warnings: Vec<String>,
}

/// A product with its price in minor units per conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedRow {
    pub product_id: String,
    pub title: String,
    pub description: String,
    /// `(region, minor units)` in conversion order.
    pub prices: Vec<(String, Decimal)>,
}

pub struct CatalogExporter {
    source: Arc<dyn CatalogSource>,
    rates: Arc<RateProvider>,
    options: ExportOptions,
}

impl CatalogExporter {
    pub fn new(source: Arc<dyn CatalogSource>, rates: Arc<RateProvider>, options: ExportOptions) -> Self {
        Self {
            source,
            rates,
            options,
        }
    }

    /// Wire an exporter from the settings' catalog section.
    ///
    /// Returns `None` when no catalog source is configured.
    pub fn from_settings(settings: &ReleaseSettings, rates: Arc<RateProvider>) -> Result<Option<Self>> {
        let Some(source_path) = &settings.catalog.source else {
            return Ok(None);
        };
        let source = JsonCatalogSource::load(settings.resolve(source_path))?;
        let options = ExportOptions {
            product_kind: settings.catalog.product_kind,
            locale: settings.catalog.locale.clone(),
            artifact_path: settings
                .resolve(&settings.build.output_dir)
                .join(&settings.catalog.artifact_name),
            staging_dir: settings.create_listing.then(|| settings.staging_path()),
        };
        Ok(Some(Self::new(Arc::new(source), rates, options)))
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Export the selected category's products priced in every requested currency.
    pub async fn export(
        &self,
        selector: &CategorySelector,
        conversions: &[CurrencyConversion],
    ) -> Result<ExportSummary> {
        let category = selector.resolve(self.source.categories())?;
        let kind = self.options.product_kind;
        let products: Vec<&Product> = self
            .source
            .products()
            .iter()
            .filter(|p| p.category_id == category.id && p.kind == kind)
            .collect();
        if products.is_empty() {
            return Err(StoreprepError::MissingInput(format!(
                "no {} products in category '{}'",
                kind.name(),
                category.id
            )));
        }
        if conversions.is_empty() {
            return Err(StoreprepError::Settings(
                "no currency conversions configured for catalog export".to_string(),
            ));
        }
        if let Some(c) = conversions.iter().find(|c| c.minor_unit_scale == 0) {
            return Err(StoreprepError::Settings(format!(
                "conversion to {} has a zero minor_unit_scale",
                c.currency
            )));
        }

        let mut warnings = Vec::new();
        let mut rates = Vec::with_capacity(conversions.len());
        for conversion in conversions {
            let resolved = self.rates.resolve(conversion).await;
            warnings.extend(resolved.warning);
            rates.push(resolved.rate);
        }

        let mut rows = Vec::with_capacity(products.len());
        for product in products {
            let amount = match parse_base_price(&product.base_price) {
                Ok(amount) => amount,
                Err(e) => {
                    let warning = format!("{}: {e}, priced at zero", product.id);
                    warn!(product = %product.id, error = %e, "price parse failed");
                    warnings.push(warning);
                    Decimal::ZERO
                }
            };
            if decimal_comma_suspect(&product.base_price) {
                let warning = format!(
                    "{}: '{}' read as {amount}, ',' is a thousands separator",
                    product.id, product.base_price
                );
                warn!(product = %product.id, price = %product.base_price, "possible decimal comma");
                warnings.push(warning);
            }

            let mut prices = Vec::with_capacity(conversions.len());
            for (conversion, rate) in conversions.iter().zip(&rates) {
                let micros = match conversion.to_minor_units(amount, *rate) {
                    Ok(micros) => micros,
                    Err(e) => {
                        warn!(product = %product.id, region = %conversion.region, error = %e, "price conversion failed");
                        warnings.push(format!("{} ({}): {e}, priced at zero", product.id, conversion.region));
                        Decimal::ZERO
                    }
                };
                prices.push((conversion.region.clone(), micros));
            }
            rows.push(PricedRow {
                product_id: product.id.clone(),
                title: product.title.clone(),
                description: product.description.clone(),
                prices,
            });
        }

        let csv = render_csv(&rows, &self.options.locale);
        write_atomic(&self.options.artifact_path, csv.as_bytes())?;

        let staged = match &self.options.staging_dir {
            Some(dir) => {
                let name = self.options.artifact_path.file_name().ok_or_else(|| {
                    StoreprepError::Settings(format!(
                        "catalog artifact path {} has no file name",
                        self.options.artifact_path.display()
                    ))
                })?;
                let target = dir.join(name);
                if target != self.options.artifact_path {
                    fs::create_dir_all(dir).map_err(|e| StoreprepError::io(dir, e))?;
                    fs::copy(&self.options.artifact_path, &target)
                        .map_err(|e| StoreprepError::io(&target, e))?;
                }
                Some(target)
            }
            None => None,
        };

        obs::emit_catalog_exported(
            &category.id,
            rows.len(),
            &self.options.artifact_path.display().to_string(),
        );

        Ok(ExportSummary {
            category: category.id.clone(),
            rows: rows.len(),
            artifact: self.options.artifact_path.clone(),
            staged,
            warnings,
        })
    }
}

/// Parse an authored price such as `"$1.00"` or `"USD 1,299.00"`.
///
/// Currency symbols, letters and whitespace are stripped; `,` is always a
/// thousands separator and `.` the decimal point, so `"1,99"` reads as 199.
/// The exporter warns about such prices, see [`decimal_comma_suspect`].
pub fn parse_base_price(raw: &str) -> Result<Decimal> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        return Err(StoreprepError::Parse(raw.to_string()));
    }
    Decimal::from_str(&cleaned).map_err(|_| StoreprepError::Parse(raw.to_string()))
}

/// Whether a price looks like it uses `,` as the decimal point: no `.`, and
/// exactly two digits after the last `,` (`"€1,99"`, `"1,99 EUR"`).
pub fn decimal_comma_suspect(raw: &str) -> bool {
    if raw.contains('.') {
        return false;
    }
    let Some((_, tail)) = raw.rsplit_once(',') else {
        return false;
    };
    let digits = tail.trim_end_matches(|c: char| !c.is_ascii_digit());
    digits.len() == 2 && digits.chars().all(|c| c.is_ascii_digit())
}

/// Render rows as Play Console CSV, newline terminated.
pub fn render_csv(rows: &[PricedRow], locale: &str) -> String {
    let mut out = String::with_capacity(64 * (rows.len() + 1));
    out.push_str(CSV_HEADER);
    out.push('\n');
    for row in rows {
        let listing = format!(
            "{}; {}; {}",
            locale,
            escape_listing(&row.title),
            escape_listing(&row.description)
        );
        let prices = row
            .prices
            .iter()
            .map(|(region, micros)| format!("{}; {}", region, micros.normalize()))
            .collect::<Vec<_>>()
            .join("; ");
        let fields = [
            row.product_id.as_str(),
            "published",
            "managed_by_android",
            "false",
            listing.as_str(),
            "false",
            prices.as_str(),
            "",
        ];
        let line = fields.iter().map(|f| quote_field(f)).collect::<Vec<_>>().join(",");
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Backslash-escape the separators of the `Locale; Title; Description` field.
fn escape_listing(text: &str) -> String {
    text.replace('\\', "\\\\").replace(';', "\\;")
}

fn quote_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(dir) => dir.to_path_buf(),
        None => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| StoreprepError::io(&dir, e))?;

    let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| StoreprepError::io(&dir, e))?;
    tmp.write_all(data).map_err(|e| StoreprepError::io(path, e))?;
    tmp.persist(path)
        .map_err(|e| StoreprepError::io(path, e.error))?;
    Ok(())
}
