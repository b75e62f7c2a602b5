//! The standard conversion passes.

use tracing::info;

use crate::assemble::ChangeSetAssembler;
use crate::collect::{CollectedRepository, RevisionCollector};
use crate::domain::{ChangeSet, Result};
use crate::guard::ConsistencyGuard;
use crate::output::{describe_symbols, HistoryEmitter, LodPaths, PropertyChain};
use crate::symbols::classifier::{SymbolClassifier, SymbolKinds};
use crate::symbols::collator::{SymbolCollator, SymbolStatistics};
use crate::symbols::resolver::{Resolution, SymbolParentResolver};
use crate::vendor::{GraftPlan, VendorBranchGrafter};

use super::{artifacts, Pass, PassContext};

pub struct CollectRevisions;

impl Pass for CollectRevisions {
    fn name(&self) -> &'static str {
        "collect-revisions"
    }

    fn description(&self) -> &'static str {
        "read and validate every file's revision graph"
    }

    fn consumes(&self) -> &'static [&'static str] {
        &[]
    }

    fn produces(&self) -> &'static [&'static str] {
        &[artifacts::FILES]
    }

    fn run(&self, ctx: &mut PassContext<'_>) -> Result<()> {
        info!(source = %ctx.source.describe(), "reading revisions");
        let files = ctx.source.files()?;
        let repo = RevisionCollector::new(ctx.options)?.collect(files)?;
        ctx.stage(artifacts::FILES, &repo)
    }
}

pub struct AssembleChangesets;

impl Pass for AssembleChangesets {
    fn name(&self) -> &'static str {
        "assemble-changesets"
    }

    fn description(&self) -> &'static str {
        "cluster revisions into changesets and order them"
    }

    fn consumes(&self) -> &'static [&'static str] {
        &[artifacts::FILES]
    }

    fn produces(&self) -> &'static [&'static str] {
        &[artifacts::CHANGESETS]
    }

    fn run(&self, ctx: &mut PassContext<'_>) -> Result<()> {
        let repo: CollectedRepository = ctx.load(artifacts::FILES)?;
        let changesets = ChangeSetAssembler::new(ctx.options).assemble(&repo.files);
        ctx.stage(artifacts::CHANGESETS, &changesets)
    }
}

pub struct CollateSymbols;

impl Pass for CollateSymbols {
    fn name(&self) -> &'static str {
        "collate-symbols"
    }

    fn description(&self) -> &'static str {
        "aggregate symbol usage and parent candidates"
    }

    fn consumes(&self) -> &'static [&'static str] {
        &[artifacts::FILES]
    }

    fn produces(&self) -> &'static [&'static str] {
        &[artifacts::SYMBOL_STATS]
    }

    fn run(&self, ctx: &mut PassContext<'_>) -> Result<()> {
        let repo: CollectedRepository = ctx.load(artifacts::FILES)?;
        let stats = SymbolCollator::collate(&repo.files, &repo.symbols);
        ctx.stage(artifacts::SYMBOL_STATS, &stats)
    }
}

pub struct ClassifySymbols;

impl Pass for ClassifySymbols {
    fn name(&self) -> &'static str {
        "classify-symbols"
    }

    fn description(&self) -> &'static str {
        "decide branch, tag or exclude for every symbol"
    }

    fn consumes(&self) -> &'static [&'static str] {
        &[artifacts::FILES, artifacts::SYMBOL_STATS]
    }

    fn produces(&self) -> &'static [&'static str] {
        &[artifacts::SYMBOL_KINDS, artifacts::GRAFT_PLAN]
    }

    fn run(&self, ctx: &mut PassContext<'_>) -> Result<()> {
        let repo: CollectedRepository = ctx.load(artifacts::FILES)?;
        let stats: SymbolStatistics = ctx.load(artifacts::SYMBOL_STATS)?;
        let hints = ctx.symbol_hints()?;

        let kinds = SymbolClassifier::new(ctx.options, &hints)?.classify(&stats)?;
        let plan = GraftPlan::from_classification(&stats, &kinds);
        ConsistencyGuard::check_exclusions(&stats, &kinds, &plan, &repo.symbols)?;

        ctx.stage(artifacts::SYMBOL_KINDS, &kinds)?;
        ctx.stage(artifacts::GRAFT_PLAN, &plan)
    }
}

pub struct ResolveParents;

impl Pass for ResolveParents {
    fn name(&self) -> &'static str {
        "resolve-parents"
    }

    fn description(&self) -> &'static str {
        "choose a parent line of development for every symbol"
    }

    fn consumes(&self) -> &'static [&'static str] {
        &[
            artifacts::FILES,
            artifacts::SYMBOL_STATS,
            artifacts::SYMBOL_KINDS,
            artifacts::GRAFT_PLAN,
        ]
    }

    fn produces(&self) -> &'static [&'static str] {
        &[artifacts::LOD_TREE]
    }

    fn run(&self, ctx: &mut PassContext<'_>) -> Result<()> {
        let repo: CollectedRepository = ctx.load(artifacts::FILES)?;
        let stats: SymbolStatistics = ctx.load(artifacts::SYMBOL_STATS)?;
        let kinds: SymbolKinds = ctx.load(artifacts::SYMBOL_KINDS)?;
        let plan: GraftPlan = ctx.load(artifacts::GRAFT_PLAN)?;
        let hints = ctx.symbol_hints()?;

        let resolution =
            SymbolParentResolver::new(&stats, &kinds, &hints, &repo.symbols, &plan).resolve()?;
        ctx.stage(artifacts::LOD_TREE, &resolution)
    }
}

pub struct GraftVendorBranches;

impl Pass for GraftVendorBranches {
    fn name(&self) -> &'static str {
        "graft-vendor-branches"
    }

    fn description(&self) -> &'static str {
        "move vendor imports onto trunk and drop excluded revisions"
    }

    fn consumes(&self) -> &'static [&'static str] {
        &[
            artifacts::FILES,
            artifacts::CHANGESETS,
            artifacts::SYMBOL_KINDS,
            artifacts::GRAFT_PLAN,
        ]
    }

    fn produces(&self) -> &'static [&'static str] {
        &[artifacts::GRAFTED_CHANGESETS]
    }

    fn run(&self, ctx: &mut PassContext<'_>) -> Result<()> {
        let repo: CollectedRepository = ctx.load(artifacts::FILES)?;
        let changesets: Vec<ChangeSet> = ctx.load(artifacts::CHANGESETS)?;
        let kinds: SymbolKinds = ctx.load(artifacts::SYMBOL_KINDS)?;
        let plan: GraftPlan = ctx.load(artifacts::GRAFT_PLAN)?;

        let grafted = VendorBranchGrafter::new(&repo.files, &plan, &kinds).graft(changesets);
        ctx.stage(artifacts::GRAFTED_CHANGESETS, &grafted)
    }
}

pub struct EmitOutput;

impl Pass for EmitOutput {
    fn name(&self) -> &'static str {
        "output"
    }

    fn description(&self) -> &'static str {
        "emit commits and symbols to the output sink"
    }

    fn consumes(&self) -> &'static [&'static str] {
        &[
            artifacts::FILES,
            artifacts::GRAFTED_CHANGESETS,
            artifacts::SYMBOL_KINDS,
            artifacts::LOD_TREE,
        ]
    }

    fn produces(&self) -> &'static [&'static str] {
        &[]
    }

    fn run(&self, ctx: &mut PassContext<'_>) -> Result<()> {
        let repo: CollectedRepository = ctx.load(artifacts::FILES)?;
        let changesets: Vec<ChangeSet> = ctx.load(artifacts::GRAFTED_CHANGESETS)?;
        let kinds: SymbolKinds = ctx.load(artifacts::SYMBOL_KINDS)?;
        let resolution: Resolution = ctx.load(artifacts::LOD_TREE)?;
        let hints = ctx.symbol_hints()?;

        let mut paths = LodPaths::new(ctx.options, &repo.symbols, &kinds, &hints);
        for file in &repo.files {
            paths.add_project(ctx.options, file.project);
        }
        let properties = PropertyChain::from_options(ctx.options)?;

        HistoryEmitter::new(&repo, &resolution.tree, &paths, &properties)
            .emit(&changesets, &mut *ctx.sink)?;

        if let Some(path) = &ctx.options.write_symbol_hints {
            describe_symbols(&repo, &kinds, &resolution.tree, &paths).write(path)?;
            info!(path = %path.display(), "symbol hints written");
        }
        Ok(())
    }
}
