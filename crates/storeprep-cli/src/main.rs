//! storeprep - pre-release checklist for store builds
//!
//! ## Commands
//!
//! - `run`: full checklist (manifests, build, listing, upload)
//! - `stage`: prepare and stage the listing folder only
//! - `export-catalog`: write the priced in-app product CSV
//! - `init`: write a settings file with defaults

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use storeprep_core::{
    CatalogExporter, CategorySelector, HttpRateFetcher, RateProvider, ReleaseSettings,
};
use storeprep_pipeline::{BuildVariant, PipelineReport, ReleaseChecklist};

#[derive(Parser)]
#[command(name = "storeprep")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Validate, build and stage a store release", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Settings file
    #[arg(long, global = true, env = "STOREPREP_SETTINGS", default_value = "storeprep.json")]
    settings: PathBuf,

    /// Write the run report as JSON to this path
    #[arg(long, global = true)]
    report: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full release checklist
    Run {
        /// Build with in-app purchases enabled
        #[arg(long)]
        iap: bool,

        /// Build an APK instead of an app bundle
        #[arg(long)]
        apk: bool,
    },

    /// Prepare the staging folder and stage listing assets
    Stage,

    /// Export the in-app product catalog as CSV
    ExportCatalog {
        /// Category id or zero-based index (default: from settings)
        #[arg(short, long)]
        category: Option<String>,
    },

    /// Write a settings file with default values
    Init {
        /// Project root recorded in the settings
        #[arg(default_value = ".")]
        project_root: PathBuf,

        /// Reset an existing settings file to defaults, keeping its project root
        #[arg(long)]
        reset: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    storeprep_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Init {
            project_root,
            reset,
        } => cmd_init(&cli.settings, &project_root, reset),
        Commands::Run { iap, apk } => {
            cmd_run(&cli.settings, BuildVariant { iap, apk }, cli.report.as_deref()).await
        }
        Commands::Stage => cmd_stage(&cli.settings, cli.report.as_deref()).await,
        Commands::ExportCatalog { category } => {
            cmd_export_catalog(&cli.settings, category.as_deref()).await
        }
    }
}

fn load_settings(path: &Path) -> Result<Arc<ReleaseSettings>> {
    let settings = ReleaseSettings::load(path).with_context(|| {
        format!(
            "Failed to load settings from {} (run `storeprep init` to create one)",
            path.display()
        )
    })?;
    Ok(Arc::new(settings))
}

fn rate_provider(settings: &ReleaseSettings) -> Result<Arc<RateProvider>> {
    let fetcher = HttpRateFetcher::new(&settings.catalog.rates_endpoint)
        .context("Failed to create exchange-rate client")?;
    Ok(Arc::new(RateProvider::new(
        Arc::new(fetcher),
        settings.catalog.rate_refresh,
    )))
}

fn parse_selector(raw: &str) -> CategorySelector {
    match raw.parse::<usize>() {
        Ok(index) => CategorySelector::Index(index),
        Err(_) => CategorySelector::Id(raw.to_string()),
    }
}

fn cmd_init(settings_path: &Path, project_root: &Path, reset: bool) -> Result<()> {
    let settings = if settings_path.exists() {
        if !reset {
            anyhow::bail!(
                "{} already exists (use --reset to restore defaults)",
                settings_path.display()
            );
        }
        ReleaseSettings::load(settings_path)?.reset()
    } else {
        ReleaseSettings {
            project_root: project_root.to_path_buf(),
            ..ReleaseSettings::default()
        }
        .normalized()
    };

    settings
        .save(settings_path)
        .with_context(|| format!("Failed to write {}", settings_path.display()))?;
    println!("✓ Wrote settings to {}", settings_path.display());
    Ok(())
}

async fn cmd_run(settings_path: &Path, variant: BuildVariant, report_path: Option<&Path>) -> Result<()> {
    let settings = load_settings(settings_path)?;
    let rates = rate_provider(&settings)?;
    let checklist = ReleaseChecklist::from_settings(settings, rates)?;

    println!(
        "Running release checklist ({}, {})",
        if variant.iap { "IAP" } else { "no IAP" },
        if variant.apk { "apk" } else { "aab" }
    );
    println!();

    let report = checklist.run(variant).await;
    finish(&report, report_path, "Release checklist failed")
}

async fn cmd_stage(settings_path: &Path, report_path: Option<&Path>) -> Result<()> {
    let settings = load_settings(settings_path)?;
    let rates = rate_provider(&settings)?;
    let checklist = ReleaseChecklist::from_settings(settings, rates)?;

    let report = checklist.stage_only().await;
    finish(&report, report_path, "Staging failed")
}

async fn cmd_export_catalog(settings_path: &Path, category: Option<&str>) -> Result<()> {
    let settings = load_settings(settings_path)?;
    let rates = rate_provider(&settings)?;
    let exporter = CatalogExporter::from_settings(&settings, rates)
        .context("Failed to load product catalog")?
        .context("No catalog source configured (set catalog.source in settings)")?;

    let selector = category
        .map(parse_selector)
        .unwrap_or_else(|| settings.catalog.category.clone());
    let summary = exporter
        .export(&selector, &settings.catalog.conversions)
        .await
        .with_context(|| format!("Catalog export failed for category {}", selector))?;

    println!(
        "✓ Exported {} products from '{}' to {}",
        summary.rows,
        summary.category,
        summary.artifact.display()
    );
    if let Some(staged) = &summary.staged {
        println!("  staged at {}", staged.display());
    }
    for warning in &summary.warnings {
        println!("  ! {}", warning);
    }
    Ok(())
}

fn finish(report: &PipelineReport, report_path: Option<&Path>, failure: &str) -> Result<()> {
    for status in &report.statuses {
        println!("  {}", status.render());
    }
    println!();
    println!("Run ID: {}", report.run_id);
    println!("Duration: {}ms", report.duration_ms);
    println!(
        "Summary: {} passed, {} failed",
        report.passed_count(),
        report.failed_count()
    );

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!(path = %path.display(), "report written");
    }

    if report.success {
        println!("\n✓ All checks passed!");
        Ok(())
    } else {
        anyhow::bail!("{}", failure)
    }
}
