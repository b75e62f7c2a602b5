//! Output: turns the grafted changesets and the resolved LOD tree into an
//! ordered event stream.
//!
//! Commits are emitted in changeset order, one event per line of
//! development. A symbol is created once every one of its sprout revisions
//! has been emitted, or just before the first commit on it if that comes
//! first; sprout revisions emitted after creation arrive as fill events.
//! Parents are always created before their children.

pub mod layout;
pub mod properties;
pub mod sink;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::collect::CollectedRepository;
use crate::domain::{
    ChangeSet, ChangeSetId, ChangeSetItem, ConvertError, CorruptionIssue, CvsFile, FileOp, Lod,
    LodTree, ProjectId, Result, RevisionNumber, SymbolId, SymbolKind,
};
use crate::metrics::METRICS;
use crate::symbols::classifier::SymbolKinds;
use crate::symbols::hints::{HintConversion, ParentHint, SymbolHint, SymbolHints};

pub use layout::{clean_symbol_name, LodPaths};
pub use properties::{KeywordModeSetter, PathPatternSetter, PropertyChain, PropertySetter};
pub use sink::{JsonLinesSink, MemorySink, OutputSink};

/// One file change inside a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    /// Path relative to the line of development.
    pub path: String,
    pub op: FileOp,
    pub revision: RevisionNumber,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Set on added files only.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub changeset: ChangeSetId,
    pub author: String,
    pub log: String,
    pub timestamp: i64,
    pub original_timestamp: i64,
    /// `timestamp` as RFC 3339.
    pub date: String,
    pub files: Vec<FileChange>,
}

/// Where one file of a symbol is copied from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolSource {
    /// Path relative to the line of development.
    pub path: String,
    /// Full path of the copy source.
    pub copy_from: String,
    pub revision: RevisionNumber,
    /// Changeset that emitted the source revision.
    pub changeset: ChangeSetId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputEvent {
    Commit {
        project: ProjectId,
        /// Target path of the line of development.
        path: String,
        lod: Lod,
        commit: CommitRecord,
    },
    CreateSymbol {
        project: ProjectId,
        name: String,
        kind: SymbolKind,
        path: String,
        parent_path: String,
        timestamp: i64,
        sources: Vec<SymbolSource>,
    },
    FillSymbol {
        project: ProjectId,
        name: String,
        path: String,
        sources: Vec<SymbolSource>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitSummary {
    pub commits: usize,
    pub symbols_created: usize,
    pub fills: usize,
}

pub fn format_timestamp(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|d| d.to_rfc3339())
        .unwrap_or_else(|| timestamp.to_string())
}

#[derive(Debug, Default)]
struct SymbolProgress {
    expected: usize,
    created: bool,
    pending: Vec<SymbolSource>,
}

pub struct HistoryEmitter<'a> {
    repo: &'a CollectedRepository,
    tree: &'a LodTree,
    paths: &'a LodPaths,
    properties: &'a PropertyChain,
}

impl<'a> HistoryEmitter<'a> {
    pub fn new(
        repo: &'a CollectedRepository,
        tree: &'a LodTree,
        paths: &'a LodPaths,
        properties: &'a PropertyChain,
    ) -> Self {
        Self {
            repo,
            tree,
            paths,
            properties,
        }
    }

    fn project_of(&self, lod: Lod) -> ProjectId {
        match lod {
            Lod::Trunk(p) => p,
            Lod::Branch(s) => self.repo.symbols.get(s).map(|s| s.project).unwrap_or_default(),
        }
    }

    /// Symbols ordered parents first, then by name.
    fn creation_order(&self) -> Vec<SymbolId> {
        let mut order: Vec<(usize, &str, SymbolId)> = self
            .tree
            .nodes()
            .iter()
            .map(|n| {
                (
                    self.tree.ancestors(n.symbol).len(),
                    self.repo.symbols.name(n.symbol),
                    n.symbol,
                )
            })
            .collect();
        order.sort();
        order.into_iter().map(|(_, _, s)| s).collect()
    }

    /// Revision a symbol sprouts from in `file`, whichever way the file
    /// defines it.
    fn sprout_of(file: &CvsFile, symbol: SymbolId) -> Option<RevisionNumber> {
        file.branch(symbol).map(|b| b.sprout.clone()).or_else(|| {
            file.tags
                .iter()
                .find(|t| t.symbol == symbol)
                .map(|t| t.revision.clone())
        })
    }

    /// Copy sources of every symbol, keyed by the changeset that emits them.
    fn plan_sources(
        &self,
        changesets: &[ChangeSet],
    ) -> BTreeMap<ChangeSetId, Vec<(SymbolId, SymbolSource)>> {
        let mut emitted: HashMap<(u32, &RevisionNumber), Vec<(Lod, ChangeSetId)>> = HashMap::new();
        for cs in changesets {
            for item in &cs.items {
                if item.op != FileOp::Delete {
                    emitted
                        .entry((item.file.0, &item.revision))
                        .or_default()
                        .push((item.lod, cs.id));
                }
            }
        }
        let first_import = RevisionNumber::parse("1.1.1.1").ok();

        let mut plan: BTreeMap<ChangeSetId, Vec<(SymbolId, SymbolSource)>> = BTreeMap::new();
        for node in self.tree.nodes() {
            for file in &self.repo.files {
                let Some(mut sprout) = Self::sprout_of(file, node.symbol) else {
                    continue;
                };
                if file.is_redundant(&sprout) {
                    // A branch off a redundant 1.1 gets the file from its own
                    // first revision.
                    match &first_import {
                        Some(import) if node.kind == SymbolKind::Tag => sprout = import.clone(),
                        _ => continue,
                    }
                }
                let Some(places) = emitted.get(&(file.id.0, &sprout)) else {
                    continue;
                };
                let through_parent_branch = match node.parent {
                    Lod::Branch(p) => file
                        .branch(p)
                        .map(|b| b.sprout == sprout || file.is_redundant(&b.sprout))
                        .unwrap_or(false),
                    Lod::Trunk(_) => false,
                };
                let place = places
                    .iter()
                    .find(|(lod, _)| *lod == node.parent)
                    .copied()
                    .or_else(|| {
                        through_parent_branch
                            .then(|| places.first().map(|(_, cs)| (node.parent, *cs)))
                            .flatten()
                    })
                    .or_else(|| places.first().copied());
                let Some((lod, changeset)) = place else {
                    continue;
                };
                let Some(copy_from) = self.paths.file_path(lod, &file.path) else {
                    continue;
                };
                plan.entry(changeset).or_default().push((
                    node.symbol,
                    SymbolSource {
                        path: file.path.clone(),
                        copy_from,
                        revision: sprout,
                        changeset,
                    },
                ));
            }
        }
        plan
    }

    fn commit_event(&self, cs: &ChangeSet, lod: Lod, items: &[&ChangeSetItem]) -> Result<OutputEvent> {
        let path = self.paths.path(lod).ok_or_else(|| ConvertError::Corruption {
            issues: vec![CorruptionIssue::new(
                items.first().map(|i| i.path.as_str()).unwrap_or(""),
                format!("changeset {} commits to a line of development that is not converted", cs.id.0),
            )],
        })?;
        let files = items
            .iter()
            .map(|item| {
                let properties = if item.op == FileOp::Add {
                    let mode = self
                        .repo
                        .file(item.file)
                        .and_then(|f| f.keyword_mode.as_deref());
                    self.properties.properties(&item.path, mode)
                } else {
                    BTreeMap::new()
                };
                FileChange {
                    path: item.path.clone(),
                    op: item.op,
                    revision: item.revision.clone(),
                    content: item.content.clone(),
                    properties,
                }
            })
            .collect();
        Ok(OutputEvent::Commit {
            project: self.project_of(lod),
            path: path.to_string(),
            lod,
            commit: CommitRecord {
                changeset: cs.id,
                author: cs.author.clone(),
                log: cs.log.clone(),
                timestamp: cs.timestamp,
                original_timestamp: cs.original_timestamp,
                date: format_timestamp(cs.timestamp),
                files,
            },
        })
    }

    fn create(
        &self,
        symbol: SymbolId,
        timestamp: i64,
        progress: &mut BTreeMap<SymbolId, SymbolProgress>,
        sink: &mut dyn OutputSink,
        summary: &mut EmitSummary,
    ) -> Result<()> {
        if progress.get(&symbol).map_or(true, |p| p.created) {
            return Ok(());
        }
        for ancestor in self.tree.ancestors(symbol).into_iter().rev() {
            if let Lod::Branch(parent) = ancestor {
                self.create(parent, timestamp, progress, sink, summary)?;
            }
        }
        let Some(node) = self.tree.get(symbol) else {
            return Ok(());
        };
        let Some(state) = progress.get_mut(&symbol) else {
            return Ok(());
        };
        state.created = true;
        let sources = std::mem::take(&mut state.pending);
        let event = OutputEvent::CreateSymbol {
            project: node.project,
            name: self.repo.symbols.name(symbol).to_string(),
            kind: node.kind,
            path: self.paths.path(Lod::Branch(symbol)).unwrap_or_default().to_string(),
            parent_path: self.paths.path(node.parent).unwrap_or_default().to_string(),
            timestamp,
            sources,
        };
        self.send(sink, &event)?;
        summary.symbols_created += 1;
        Ok(())
    }

    fn send(&self, sink: &mut dyn OutputSink, event: &OutputEvent) -> Result<()> {
        sink.emit(event)?;
        METRICS.inc_events_emitted();
        Ok(())
    }

    /// Emit every changeset and symbol to `sink`.
    pub fn emit(&self, changesets: &[ChangeSet], sink: &mut dyn OutputSink) -> Result<EmitSummary> {
        let order = self.creation_order();
        let rank: HashMap<SymbolId, usize> =
            order.iter().enumerate().map(|(i, s)| (*s, i)).collect();
        let mut plan = self.plan_sources(changesets);

        let mut progress: BTreeMap<SymbolId, SymbolProgress> = order
            .iter()
            .map(|s| (*s, SymbolProgress::default()))
            .collect();
        for sources in plan.values() {
            for (symbol, _) in sources {
                if let Some(p) = progress.get_mut(symbol) {
                    p.expected += 1;
                }
            }
        }

        let mut summary = EmitSummary::default();
        for cs in changesets {
            let mut by_lod: BTreeMap<Lod, Vec<&ChangeSetItem>> = BTreeMap::new();
            for item in &cs.items {
                by_lod.entry(item.lod).or_default().push(item);
            }
            for (lod, items) in &by_lod {
                if let Lod::Branch(branch) = lod {
                    self.create(*branch, cs.timestamp, &mut progress, sink, &mut summary)?;
                }
                let event = self.commit_event(cs, *lod, items)?;
                self.send(sink, &event)?;
                summary.commits += 1;
            }

            let Some(sources) = plan.remove(&cs.id) else {
                continue;
            };
            let mut touched = BTreeSet::new();
            for (symbol, source) in sources {
                if let Some(p) = progress.get_mut(&symbol) {
                    p.pending.push(source);
                    p.expected = p.expected.saturating_sub(1);
                    touched.insert((rank.get(&symbol).copied().unwrap_or(usize::MAX), symbol));
                }
            }
            for (_, symbol) in touched {
                let Some(state) = progress.get_mut(&symbol) else {
                    continue;
                };
                if state.created {
                    let sources = std::mem::take(&mut state.pending);
                    if sources.is_empty() {
                        continue;
                    }
                    let event = OutputEvent::FillSymbol {
                        project: self.project_of(Lod::Branch(symbol)),
                        name: self.repo.symbols.name(symbol).to_string(),
                        path: self.paths.path(Lod::Branch(symbol)).unwrap_or_default().to_string(),
                        sources,
                    };
                    self.send(sink, &event)?;
                    summary.fills += 1;
                } else if state.expected == 0 {
                    self.create(symbol, cs.timestamp, &mut progress, sink, &mut summary)?;
                }
            }
        }

        let last = changesets.last().map(|c| c.timestamp).unwrap_or(0);
        for symbol in &order {
            if progress.get(symbol).map_or(false, |p| !p.created) {
                debug!(symbol = %self.repo.symbols.name(*symbol), "symbol created without pending sprouts");
                self.create(*symbol, last, &mut progress, sink, &mut summary)?;
            }
        }

        sink.finish()?;
        info!(
            commits = summary.commits,
            symbols = summary.symbols_created,
            fills = summary.fills,
            "output emitted"
        );
        Ok(summary)
    }
}

/// Describe every classification decision in the hints-file format.
pub fn describe_symbols(
    repo: &CollectedRepository,
    kinds: &SymbolKinds,
    tree: &LodTree,
    paths: &LodPaths,
) -> SymbolHints {
    let hints = repo
        .symbols
        .iter()
        .filter_map(|symbol| {
            let kind = kinds.kind(symbol.id)?;
            let conversion = match kind {
                SymbolKind::Branch => HintConversion::Branch,
                SymbolKind::Tag => HintConversion::Tag,
                SymbolKind::Excluded => HintConversion::Exclude,
            };
            let parent = tree.parent(symbol.id).map(|lod| match lod {
                Lod::Trunk(_) => ParentHint::Trunk,
                Lod::Branch(p) => ParentHint::Symbol(repo.symbols.name(p).to_string()),
            });
            Some(SymbolHint {
                project: Some(symbol.project),
                name: symbol.name.clone(),
                conversion: Some(conversion),
                svn_path: paths.path(Lod::Branch(symbol.id)).map(str::to_string),
                parent,
            })
        })
        .collect();
    SymbolHints::new(hints)
}
