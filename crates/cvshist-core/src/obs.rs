//! Structured observability hooks for conversion lifecycle events.
//!
//! Events are emitted at `info!` level with an `event` field so they can be
//! filtered out of JSON logs (`--log-json`).

use tracing::{info, warn};

/// RAII guard that enters a pass-scoped tracing span.
///
/// ```ignore
/// let _span = PassSpan::enter(3, "collate-symbols");
/// // tracing calls now carry pass = 3, pass_name = "collate-symbols"
/// ```
pub struct PassSpan {
    _span: tracing::span::EnteredSpan,
}

impl PassSpan {
    pub fn enter(number: usize, name: &str) -> Self {
        let span = tracing::info_span!("cvshist.pass", pass = number, pass_name = %name);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_run_started(source: &str, start: usize, end: usize) {
    info!(event = "run.started", source = %source, start, end);
}

pub fn emit_run_finished(passes_run: usize, changesets: usize, duration_ms: u64) {
    info!(
        event = "run.finished",
        passes_run,
        changesets,
        duration_ms,
    );
}

pub fn emit_pass_started(number: usize, name: &str) {
    info!(event = "pass.started", pass = number, pass_name = %name);
}

/// Emit event: pass finished and its artifacts were committed.
pub fn emit_pass_committed(number: usize, name: &str, artifacts: usize, duration_ms: u64) {
    info!(
        event = "pass.committed",
        pass = number,
        pass_name = %name,
        artifacts,
        duration_ms,
    );
}

pub fn emit_pass_failed(number: usize, name: &str, error: &dyn std::fmt::Display) {
    warn!(event = "pass.failed", pass = number, pass_name = %name, error = %error);
}

/// Emit event: a symbol was demoted to break a preference cycle.
pub fn emit_cycle_broken(symbol: &str, cycle: &[&str], weight: u32) {
    info!(
        event = "symbols.cycle_broken",
        symbol = %symbol,
        cycle = %cycle.join(" -> "),
        weight,
    );
}

pub fn emit_timestamp_clamped(changeset: u32, original: i64, corrected: i64) {
    info!(
        event = "changeset.timestamp_clamped",
        changeset,
        original,
        corrected,
    );
}

pub fn emit_artifact_discarded(name: &str) {
    info!(event = "artifact.discarded", artifact = %name);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_span_create() {
        let _span = PassSpan::enter(1, "collect-revisions");
        emit_cycle_broken("A", &["A", "B"], 2);
    }
}
