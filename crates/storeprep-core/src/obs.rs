//! Structured observability hooks for checklist runs.
//!
//! This module provides:
//! - A run-scoped tracing span
//! - Emission functions for lifecycle events: run start/finish, step start/finish,
//!   asset staging, rate acquisition and catalog export
//!
//! Events are emitted at `info!` level, recovered leniencies at `warn!`.

use tracing::{info, warn};

/// Run-scoped span; attach it to the run future with `tracing::Instrument`.
///
/// ```ignore
/// engine.run().instrument(obs::run_span(&run_id)).await
/// ```
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("storeprep.run", run_id = %run_id)
}

/// Emit event: run started with the number of steps queued.
pub fn emit_run_started(run_id: &str, step_count: usize) {
    info!(event = "run.started", run_id = %run_id, step_count = step_count);
}

/// Emit event: run finished.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, recorded: usize, success: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        recorded = recorded,
        success = success,
    );
}

pub fn emit_step_started(step: &str, seq: usize) {
    info!(event = "step.started", step = %step, seq = seq);
}

pub fn emit_step_finished(step: &str, seq: usize, success: bool) {
    info!(event = "step.finished", step = %step, seq = seq, success = success);
}

/// Emit event: an asset was copied into the staging directory.
pub fn emit_asset_staged(label: &str, target: &str) {
    info!(event = "asset.staged", label = %label, target = %target);
}

/// Emit event: an asset was rejected (warning level).
pub fn emit_asset_rejected(label: &str, reason: &dyn std::fmt::Display) {
    warn!(event = "asset.rejected", label = %label, reason = %reason);
}

pub fn emit_rate_fetched(base: &str, target: &str, rate: &dyn std::fmt::Display) {
    info!(event = "rate.fetched", base = %base, target = %target, rate = %rate);
}

/// Emit event: a conversion fell back to a non-live rate (warning level).
pub fn emit_rate_fallback(target: &str, reason: &dyn std::fmt::Display) {
    warn!(event = "rate.fallback", target = %target, reason = %reason);
}

pub fn emit_catalog_exported(category: &str, rows: usize, path: &str) {
    info!(event = "catalog.exported", category = %category, rows = rows, path = %path);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emitters_do_not_panic_without_subscriber() {
        emit_run_started("run-1", 7);
        emit_step_started("Prepare Store Listing", 1);
        emit_step_finished("Prepare Store Listing", 1, true);
        emit_asset_staged("Icon (512x512)", "icon_512x512.png");
        emit_asset_rejected("Info Text", &"missing");
        emit_rate_fetched("USD", "VND", &25200);
        emit_rate_fallback("VND", &"timeout");
        emit_catalog_exported("coins", 3, "iap_products.csv");
        emit_run_finished("run-1", 12, 7, true);
    }

    #[test]
    fn test_run_span_create() {
        let span = run_span("test-run-id");
        let _guard = span.enter();
    }
}
