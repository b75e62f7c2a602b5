//! Pass pipeline.
//!
//! Passes run strictly in order. Each reads the committed artifacts of
//! earlier passes and stages its own; the manager commits staged artifacts
//! to the store and records them in the manifest only after the pass
//! succeeds, so a failed pass leaves the previous pass as the resumption
//! point.

pub mod builtin;
pub mod context;

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use cvshist_state::{ArtifactRecord, ArtifactStore, CommittedPass, Digest, PassManifest};

use crate::config::ConversionOptions;
use crate::domain::{ConvertError, Result};
use crate::metrics::{MetricsSnapshot, METRICS};
use crate::obs::{self, PassSpan};
use crate::output::OutputSink;
use crate::source::RevisionSource;

pub use context::PassContext;

/// Artifact names shared between passes.
pub mod artifacts {
    pub const FILES: &str = "files";
    pub const CHANGESETS: &str = "changesets";
    pub const SYMBOL_STATS: &str = "symbol-stats";
    pub const SYMBOL_KINDS: &str = "symbol-kinds";
    pub const GRAFT_PLAN: &str = "graft-plan";
    pub const LOD_TREE: &str = "lod-tree";
    pub const GRAFTED_CHANGESETS: &str = "grafted-changesets";
}

pub trait Pass: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// Artifacts that must be committed before the pass can run.
    fn consumes(&self) -> &'static [&'static str];
    fn produces(&self) -> &'static [&'static str];
    fn run(&self, ctx: &mut PassContext<'_>) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    pub index: usize,
    pub name: String,
    pub artifacts: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub passes: Vec<PassReport>,
    pub metrics: MetricsSnapshot,
}

pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
}

impl PassManager {
    pub fn new(passes: Vec<Box<dyn Pass>>) -> Self {
        Self { passes }
    }

    /// The seven conversion passes in order.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(builtin::CollectRevisions),
            Box::new(builtin::AssembleChangesets),
            Box::new(builtin::CollateSymbols),
            Box::new(builtin::ClassifySymbols),
            Box::new(builtin::ResolveParents),
            Box::new(builtin::GraftVendorBranches),
            Box::new(builtin::EmitOutput),
        ])
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// `(number, pass)` pairs, numbered from 1.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &dyn Pass)> {
        self.passes
            .iter()
            .enumerate()
            .map(|(i, p)| (i + 1, p.as_ref()))
    }

    /// Resolve a pass given by 1-based number or by name.
    pub fn pass_number(&self, selector: &str) -> Result<usize> {
        if let Ok(n) = selector.parse::<usize>() {
            if (1..=self.passes.len()).contains(&n) {
                return Ok(n);
            }
            return Err(ConvertError::InvalidPass(format!(
                "pass number {n} is out of range 1..={}",
                self.passes.len()
            )));
        }
        self.passes
            .iter()
            .position(|p| p.name() == selector)
            .map(|i| i + 1)
            .ok_or_else(|| ConvertError::InvalidPass(format!("unknown pass '{selector}'")))
    }

    /// Artifacts whose last consumer is pass `index`.
    fn released_after(&self, index: usize) -> Vec<&'static str> {
        let mut last_use: BTreeMap<&'static str, usize> = BTreeMap::new();
        for (i, pass) in self.iter() {
            for &name in pass.consumes() {
                last_use.insert(name, i);
            }
        }
        last_use
            .into_iter()
            .filter(|(_, i)| *i == index)
            .map(|(name, _)| name)
            .collect()
    }

    /// Run passes `start..=end` (1-based, inclusive).
    pub fn run(
        &self,
        store: &dyn ArtifactStore,
        options: &ConversionOptions,
        source: &dyn RevisionSource,
        sink: &mut dyn OutputSink,
        start: usize,
        end: usize,
    ) -> Result<RunSummary> {
        if start == 0 || start > end || end > self.passes.len() {
            return Err(ConvertError::InvalidPass(format!(
                "invalid pass range {start}..={end}; passes are numbered 1..={}",
                self.passes.len()
            )));
        }
        options.validate()?;

        let mut manifest = store.load_manifest()?;
        obs::emit_run_started(&source.describe(), start, end);
        let run_started = Instant::now();
        let mut reports = Vec::new();

        for (index, pass) in self.iter().filter(|(i, _)| (start..=end).contains(i)) {
            let _span = PassSpan::enter(index, pass.name());
            obs::emit_pass_started(index, pass.name());
            let started = Instant::now();

            for name in pass.consumes() {
                if manifest.artifact(name).is_none() {
                    let err = ConvertError::MissingArtifact {
                        name: name.to_string(),
                    };
                    obs::emit_pass_failed(index, pass.name(), &err);
                    return Err(err);
                }
            }

            let mut ctx = PassContext::new(options, source, &mut *sink, store, &manifest);
            if let Err(err) = pass.run(&mut ctx) {
                obs::emit_pass_failed(index, pass.name(), &err);
                return Err(err);
            }
            let staged = ctx.into_staged();

            let mut artifacts = BTreeMap::new();
            for (name, bytes) in staged {
                let digest = store.put(&bytes)?;
                artifacts.insert(
                    name,
                    ArtifactRecord {
                        digest,
                        size: bytes.len() as u64,
                    },
                );
            }
            let artifact_count = artifacts.len();
            let dropped = manifest.record(CommittedPass {
                index,
                name: pass.name().to_string(),
                artifacts,
                committed_at: Utc::now(),
            });
            for stale in dropped {
                for record in stale.artifacts.values() {
                    discard_unreferenced(store, &manifest, &record.digest)?;
                }
            }
            if !options.keep_artifacts {
                for name in self.released_after(index) {
                    if let Some(record) = manifest.forget_artifact(name) {
                        discard_unreferenced(store, &manifest, &record.digest)?;
                        obs::emit_artifact_discarded(name);
                    }
                }
            }
            store.save_manifest(&manifest)?;

            let duration_ms = started.elapsed().as_millis() as u64;
            obs::emit_pass_committed(index, pass.name(), artifact_count, duration_ms);
            reports.push(PassReport {
                index,
                name: pass.name().to_string(),
                artifacts: artifact_count,
                duration_ms,
            });
        }

        let metrics = METRICS.snapshot();
        obs::emit_run_finished(
            reports.len(),
            metrics.changesets_assembled as usize,
            run_started.elapsed().as_millis() as u64,
        );
        METRICS.flush();
        Ok(RunSummary {
            run_id: manifest.run_id.to_string(),
            passes: reports,
            metrics,
        })
    }

    /// Run every pass.
    pub fn run_all(
        &self,
        store: &dyn ArtifactStore,
        options: &ConversionOptions,
        source: &dyn RevisionSource,
        sink: &mut dyn OutputSink,
    ) -> Result<RunSummary> {
        self.run(store, options, source, sink, 1, self.passes.len())
    }
}

/// Remove a blob unless another manifest entry still points at it.
fn discard_unreferenced(
    store: &dyn ArtifactStore,
    manifest: &PassManifest,
    digest: &Digest,
) -> Result<()> {
    let referenced = manifest
        .passes
        .iter()
        .any(|p| p.artifacts.values().any(|a| a.digest == *digest));
    if !referenced {
        store.remove(digest)?;
        debug!(digest = %digest, "blob removed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SourceRevision;
    use crate::output::MemorySink;
    use crate::source::{MemorySource, SourceFile};
    use cvshist_state::fakes::MemoryArtifactStore;

    fn source() -> MemorySource {
        MemorySource::new(vec![SourceFile::new("a.c")
            .with_revision(SourceRevision::new("1.1", None, 100, "jo", "add"))
            .with_revision(SourceRevision::new("1.2", Some("1.1"), 200, "jo", "edit"))])
    }

    #[test]
    fn test_pass_number_by_name_or_index() {
        let manager = PassManager::standard();
        assert_eq!(manager.len(), 7);
        assert_eq!(manager.pass_number("1").unwrap(), 1);
        assert_eq!(manager.pass_number("resolve-parents").unwrap(), 5);
        assert_eq!(manager.pass_number("output").unwrap(), 7);
        assert!(matches!(
            manager.pass_number("8"),
            Err(ConvertError::InvalidPass(_))
        ));
        assert!(matches!(
            manager.pass_number("frobnicate"),
            Err(ConvertError::InvalidPass(_))
        ));
    }

    #[test]
    fn test_every_consumed_artifact_is_produced_earlier() {
        let manager = PassManager::standard();
        let mut produced: Vec<&str> = Vec::new();
        for (_, pass) in manager.iter() {
            for name in pass.consumes() {
                assert!(produced.contains(name), "{} consumes unknown {name}", pass.name());
            }
            produced.extend(pass.produces());
        }
    }

    #[test]
    fn test_full_run_discards_intermediate_artifacts() {
        let store = MemoryArtifactStore::new();
        let mut sink = MemorySink::new();
        let summary = PassManager::standard()
            .run_all(&store, &ConversionOptions::default(), &source(), &mut sink)
            .unwrap();
        assert_eq!(summary.passes.len(), 7);
        assert_eq!(store.blob_count(), 0);
        assert!(sink.finished);

        let manifest = store.load_manifest().unwrap();
        assert_eq!(manifest.last_committed(), Some(7));
    }

    #[test]
    fn test_keep_artifacts_allows_rerunning_output() {
        let store = MemoryArtifactStore::new();
        let options = ConversionOptions {
            keep_artifacts: true,
            ..Default::default()
        };
        let manager = PassManager::standard();
        let mut first = MemorySink::new();
        manager.run_all(&store, &options, &source(), &mut first).unwrap();

        let mut second = MemorySink::new();
        manager
            .run(&store, &options, &source(), &mut second, 7, 7)
            .unwrap();
        assert_eq!(first.events, second.events);
    }

    #[test]
    fn test_resume_without_committed_input_fails() {
        let store = MemoryArtifactStore::new();
        let mut sink = MemorySink::new();
        let err = PassManager::standard()
            .run(&store, &ConversionOptions::default(), &source(), &mut sink, 3, 7)
            .unwrap_err();
        assert!(matches!(err, ConvertError::MissingArtifact { ref name } if name == "files"));
    }

    #[test]
    fn test_invalid_range_rejected() {
        let store = MemoryArtifactStore::new();
        let mut sink = MemorySink::new();
        let err = PassManager::standard()
            .run(&store, &ConversionOptions::default(), &source(), &mut sink, 4, 2)
            .unwrap_err();
        assert!(matches!(err, ConvertError::InvalidPass(_)));
    }
}
