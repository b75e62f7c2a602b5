//! Vendor branches.
//!
//! `cvs import` commits to a vendor branch (`1.1.1`) and makes it the file's
//! default branch, so until `1.2` is committed every checkout of trunk sees
//! the vendor revisions. Those default-branch revisions are grafted onto
//! trunk: relabelled when the vendor branch is excluded, mirrored in a
//! companion changeset when it is kept.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::assemble::{sequence, ChangeSetDraft};
use crate::domain::{
    ChangeSet, CvsFile, FileOp, Lod, Revision, RevisionNumber, SymbolId, SymbolKind,
};
use crate::guard::ValidatedFile;
use crate::metrics;
use crate::symbols::classifier::SymbolKinds;
use crate::symbols::collator::SymbolStatistics;

/// Log message `cvs import` writes on `1.1`.
pub const IMPORT_LOG: &str = "Initial revision\n";

fn number(raw: &str) -> Option<RevisionNumber> {
    RevisionNumber::parse(raw).ok()
}

pub fn is_imported(file: &ValidatedFile) -> bool {
    number("1.1")
        .and_then(|n| file.revision(&n))
        .map(|r| r.log == IMPORT_LOG)
        .unwrap_or(false)
}

/// Revisions that were visible on trunk through the default branch.
///
/// With an explicit default branch that is every revision on it. Otherwise,
/// for an imported file, the `1.1.1` revisions committed before `1.2`.
pub fn default_branch_revisions(file: &ValidatedFile) -> BTreeSet<RevisionNumber> {
    let on_branch = |branch: &RevisionNumber| {
        file.revisions
            .iter()
            .filter(|r| r.number.branch_number().as_ref() == Some(branch))
            .map(|r| (r.number.clone(), r.timestamp))
            .collect::<Vec<_>>()
    };

    if let Some(branch) = &file.default_branch {
        return on_branch(branch).into_iter().map(|(n, _)| n).collect();
    }
    if !is_imported(file) {
        return BTreeSet::new();
    }
    let Some(vendor) = number("1.1.1") else {
        return BTreeSet::new();
    };
    let cutoff = number("1.2")
        .and_then(|n| file.revision(&n))
        .map(|r| r.timestamp);
    on_branch(&vendor)
        .into_iter()
        .filter(|(_, t)| cutoff.map_or(true, |c| *t < c))
        .map(|(n, _)| n)
        .collect()
}

/// `1.1` when it duplicates the first default-branch import.
///
/// Contents are compared only when both revisions carry a reference.
pub fn redundant_initial_revision(
    file: &ValidatedFile,
    defaults: &BTreeSet<RevisionNumber>,
) -> Option<RevisionNumber> {
    let initial = number("1.1")?;
    let first_import = number("1.1.1.1")?;
    if !defaults.contains(&first_import) {
        return None;
    }
    let r11 = file.revision(&initial)?;
    let import = file.revision(&first_import)?;
    let same_content = match (&r11.content, &import.content) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    };
    (import.parent.as_ref() == Some(&initial)
        && !r11.state.is_dead()
        && r11.timestamp == import.timestamp
        && same_content)
        .then_some(initial)
}

/// Which vendor branches get their default-branch revisions grafted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraftPlan {
    /// Excluded: revisions move to trunk.
    relabel: BTreeSet<SymbolId>,
    /// Kept: revisions stay and are copied to trunk.
    mirror: BTreeSet<SymbolId>,
}

impl GraftPlan {
    pub fn from_classification(stats: &SymbolStatistics, kinds: &SymbolKinds) -> Self {
        let mut plan = Self::default();
        for s in stats.iter() {
            if s.vendor.default_branch_files == 0 {
                continue;
            }
            match kinds.kind(s.symbol) {
                Some(SymbolKind::Excluded) => {
                    plan.relabel.insert(s.symbol);
                }
                Some(SymbolKind::Branch) => {
                    plan.mirror.insert(s.symbol);
                }
                _ => {}
            }
        }
        plan
    }

    pub fn is_grafted(&self, symbol: SymbolId) -> bool {
        self.relabel.contains(&symbol) || self.mirror.contains(&symbol)
    }

    pub fn relabels(&self, symbol: SymbolId) -> bool {
        self.relabel.contains(&symbol)
    }

    pub fn mirrors(&self, symbol: SymbolId) -> bool {
        self.mirror.contains(&symbol)
    }
}

pub struct VendorBranchGrafter<'a> {
    files: &'a [CvsFile],
    plan: &'a GraftPlan,
    kinds: &'a SymbolKinds,
}

impl<'a> VendorBranchGrafter<'a> {
    pub fn new(files: &'a [CvsFile], plan: &'a GraftPlan, kinds: &'a SymbolKinds) -> Self {
        Self { files, plan, kinds }
    }

    fn grafted(&self, revision: &Revision) -> bool {
        revision.default_branch
            && revision
                .lod
                .symbol()
                .map(|s| self.plan.is_grafted(s))
                .unwrap_or(false)
    }

    /// Revision whose state a revision replaces on its line of development.
    fn predecessor<'f>(
        &self,
        file: &'f CvsFile,
        revision: &Revision,
        on_trunk: bool,
    ) -> Option<&'f Revision> {
        if on_trunk && !revision.default_branch && revision.number.is_trunk_revision() {
            let follows_imports = revision
                .parent
                .as_ref()
                .map(|p| p.is_trunk_revision() && p.components() == [1, 1])
                .unwrap_or(false);
            if follows_imports {
                if let Some(last) = file.revisions.iter().filter(|r| self.grafted(r)).last() {
                    return Some(last);
                }
            }
        }
        let parent = revision.parent.as_ref()?;
        if file.is_redundant(parent) {
            return None;
        }
        file.revision(parent)
    }

    fn op(&self, file: &CvsFile, revision: &Revision, on_trunk: bool) -> Option<FileOp> {
        let predecessor = self.predecessor(file, revision, on_trunk);
        FileOp::derive(revision.state, predecessor.map(|p| p.state))
    }

    /// Graft default-branch revisions, drop redundant initial revisions and
    /// revisions on excluded lines of development, then re-sequence.
    pub fn graft(&self, changesets: Vec<ChangeSet>) -> Vec<ChangeSet> {
        let mut drafts = Vec::with_capacity(changesets.len());
        let mut grafted = 0u64;
        let mut dropped = 0u64;

        for changeset in changesets {
            let mut draft = ChangeSetDraft::from_changeset(changeset);
            let mut native = Vec::with_capacity(draft.items.len());
            let mut mirrors = Vec::new();

            for mut item in std::mem::take(&mut draft.items) {
                let Some(file) = self.files.get(item.file.0 as usize) else {
                    continue;
                };
                let Some(revision) = file.revision(&item.revision) else {
                    continue;
                };
                if file.is_redundant(&item.revision) {
                    dropped += 1;
                    continue;
                }
                let trunk = Lod::Trunk(file.project);

                match item.lod {
                    Lod::Branch(b) if self.kinds.is_excluded(b) => {
                        if self.plan.relabels(b) && revision.default_branch {
                            if let Some(op) = self.op(file, revision, true) {
                                item.grafted_from = Some(item.lod);
                                item.lod = trunk;
                                item.op = op;
                                native.push(item);
                                grafted += 1;
                            }
                        } else {
                            dropped += 1;
                        }
                    }
                    Lod::Branch(b) if self.plan.mirrors(b) && revision.default_branch => {
                        if let Some(op) = self.op(file, revision, true) {
                            let mut mirror = item.clone();
                            mirror.grafted_from = Some(item.lod);
                            mirror.lod = trunk;
                            mirror.mirror = true;
                            mirror.op = op;
                            mirrors.push(mirror);
                            grafted += 1;
                        }
                        if let Some(op) = self.op(file, revision, false) {
                            item.op = op;
                            native.push(item);
                        }
                    }
                    lod => {
                        if let Some(op) = self.op(file, revision, lod.is_trunk()) {
                            item.op = op;
                            native.push(item);
                        }
                    }
                }
            }

            if !native.is_empty() {
                drafts.push(ChangeSetDraft {
                    author: draft.author.clone(),
                    log: draft.log.clone(),
                    items: native,
                });
            }
            if !mirrors.is_empty() {
                drafts.push(ChangeSetDraft {
                    author: draft.author,
                    log: draft.log,
                    items: mirrors,
                });
            }
        }

        metrics::METRICS.inc_revisions_grafted(grafted);
        let changesets = sequence(drafts, self.files);
        info!(
            grafted,
            dropped,
            changesets = changesets.len(),
            "vendor branches grafted"
        );
        changesets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConversionOptions;
    use crate::domain::{SourceRevision, SymbolId};
    use crate::guard::ConsistencyGuard;
    use crate::source::SourceFile;
    use crate::symbols::classifier::{DecisionReason, SymbolDecision};

    fn validate(file: SourceFile) -> ValidatedFile {
        ConsistencyGuard::new(&ConversionOptions::default())
            .check_file(&file)
            .unwrap()
    }

    fn imported() -> SourceFile {
        SourceFile::new("lib.c")
            .with_symbol("VENDOR", "1.1.1")
            .with_revision(SourceRevision::new("1.1", None, 100, "jo", IMPORT_LOG).with_content("v1"))
            .with_revision(
                SourceRevision::new("1.1.1.1", Some("1.1"), 100, "jo", "import").with_content("v1"),
            )
            .with_revision(
                SourceRevision::new("1.1.1.2", Some("1.1.1.1"), 200, "jo", "import 2")
                    .with_content("v2"),
            )
    }

    fn rev(s: &str) -> RevisionNumber {
        s.parse().unwrap()
    }

    #[test]
    fn test_imported_file_defaults_until_trunk_commit() {
        let file = validate(imported());
        assert!(is_imported(&file));
        assert_eq!(
            default_branch_revisions(&file),
            BTreeSet::from([rev("1.1.1.1"), rev("1.1.1.2")])
        );

        let file = validate(
            imported().with_revision(SourceRevision::new("1.2", Some("1.1"), 150, "jo", "local")),
        );
        assert_eq!(default_branch_revisions(&file), BTreeSet::from([rev("1.1.1.1")]));
    }

    #[test]
    fn test_explicit_default_branch() {
        let file = validate(
            SourceFile::new("x.c")
                .with_default_branch("1.1.1")
                .with_symbol("VENDOR", "1.1.1")
                .with_revision(SourceRevision::new("1.1", None, 100, "jo", "not an import"))
                .with_revision(SourceRevision::new("1.1.1.1", Some("1.1"), 120, "jo", "v")),
        );
        assert!(!is_imported(&file));
        assert_eq!(default_branch_revisions(&file), BTreeSet::from([rev("1.1.1.1")]));
    }

    #[test]
    fn test_redundant_initial_revision_requires_same_content() {
        let file = validate(imported());
        let defaults = default_branch_revisions(&file);
        assert_eq!(redundant_initial_revision(&file, &defaults), Some(rev("1.1")));

        let differing = validate(
            SourceFile::new("lib.c")
                .with_symbol("VENDOR", "1.1.1")
                .with_revision(SourceRevision::new("1.1", None, 100, "jo", IMPORT_LOG).with_content("a"))
                .with_revision(
                    SourceRevision::new("1.1.1.1", Some("1.1"), 100, "jo", "i").with_content("b"),
                ),
        );
        let defaults = default_branch_revisions(&differing);
        assert_eq!(redundant_initial_revision(&differing, &defaults), None);
    }

    #[test]
    fn test_plan_follows_classification() {
        use crate::symbols::collator::SymbolCollator;
        let repo = crate::collect::RevisionCollector::new(&ConversionOptions::default())
            .unwrap()
            .collect(vec![imported()])
            .unwrap();
        let stats = SymbolCollator::collate(&repo.files, &repo.symbols);
        let decide = |kind| {
            SymbolKinds::new(vec![SymbolDecision {
                symbol: SymbolId(0),
                kind,
                reason: DecisionReason::Policy,
            }])
        };
        let excluded = GraftPlan::from_classification(&stats, &decide(SymbolKind::Excluded));
        assert!(excluded.relabels(SymbolId(0)));
        let kept = GraftPlan::from_classification(&stats, &decide(SymbolKind::Branch));
        assert!(kept.mirrors(SymbolId(0)));
        assert!(kept.is_grafted(SymbolId(0)));
    }
}
