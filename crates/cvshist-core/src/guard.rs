//! Consistency guard: halts the run on corrupt or contradictory input.
//!
//! Every check collects all of its findings before failing so that one run
//! reports every problem at once.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use rayon::prelude::*;
use tracing::warn;

use crate::config::ConversionOptions;
use crate::domain::{
    BlockedExclusion, ConvertError, CorruptionIssue, ProjectId, Result, RevisionNumber,
    RevisionState, SourceRevision, SymbolKind, SymbolTable, SymbolTarget,
};
use crate::source::SourceFile;
use crate::symbols::collator::SymbolStatistics;
use crate::symbols::classifier::SymbolKinds;
use crate::vendor::GraftPlan;

/// A revision whose numbers have been parsed and checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRevision {
    pub number: RevisionNumber,
    pub parent: Option<RevisionNumber>,
    pub timestamp: i64,
    pub author: String,
    pub log: String,
    pub state: RevisionState,
    pub content: Option<String>,
}

/// A file that passed every per-file check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedFile {
    pub project: ProjectId,
    pub path: String,
    pub keyword_mode: Option<String>,
    pub default_branch: Option<RevisionNumber>,
    /// Header order, duplicates removed.
    pub symbols: Vec<(String, SymbolTarget)>,
    /// Sorted by revision number.
    pub revisions: Vec<ParsedRevision>,
}

impl ValidatedFile {
    pub fn revision(&self, number: &RevisionNumber) -> Option<&ParsedRevision> {
        self.revisions
            .binary_search_by(|r| r.number.cmp(number))
            .ok()
            .map(|i| &self.revisions[i])
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConsistencyGuard {
    retain_conflicting_attic_files: bool,
    name_unlabeled_branches: bool,
}

impl ConsistencyGuard {
    pub fn new(options: &ConversionOptions) -> Self {
        Self {
            retain_conflicting_attic_files: options.retain_conflicting_attic_files,
            name_unlabeled_branches: options.name_unlabeled_branches,
        }
    }

    /// Run the layout checks and then every per-file check in parallel.
    pub fn check_all(&self, mut files: Vec<SourceFile>) -> Result<Vec<ValidatedFile>> {
        let mut issues = self.check_layout(&mut files);

        let results: Vec<_> = files.par_iter().map(|f| self.check_file(f)).collect();
        let mut validated = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(file) => validated.push(file),
                Err(mut found) => issues.append(&mut found),
            }
        }

        if issues.is_empty() {
            Ok(validated)
        } else {
            issues.sort();
            Err(ConvertError::Corruption { issues })
        }
    }

    /// Check Attic conflicts and directory/file collisions.
    ///
    /// With `retain_conflicting_attic_files`, the Attic copy of a conflicting
    /// file is renamed in place to live under an `Attic/` component.
    pub fn check_layout(&self, files: &mut [SourceFile]) -> Vec<CorruptionIssue> {
        let mut issues = Vec::new();

        let mut by_path: BTreeMap<(u32, String), Vec<usize>> = BTreeMap::new();
        for (i, f) in files.iter().enumerate() {
            if f.path.is_empty() || f.path.starts_with('/') || f.path.ends_with('/') {
                issues.push(CorruptionIssue::new(&f.path, "invalid file path"));
                continue;
            }
            by_path.entry((f.project, f.path.clone())).or_default().push(i);
        }

        for ((_, path), indices) in &by_path {
            if indices.len() < 2 {
                continue;
            }
            let attic: Vec<usize> = indices.iter().copied().filter(|&i| files[i].in_attic).collect();
            let live = indices.len() - attic.len();
            if live == 1 && attic.len() == 1 {
                if self.retain_conflicting_attic_files {
                    let renamed = attic_path(path);
                    warn!(path = %path, renamed = %renamed, "retaining conflicting Attic file");
                    files[attic[0]].path = renamed;
                } else {
                    issues.push(CorruptionIssue::new(
                        path,
                        "file is present both in and out of the Attic",
                    ));
                }
            } else {
                issues.push(CorruptionIssue::new(path, "file is defined more than once"));
            }
        }

        let mut paths: HashMap<u32, HashSet<&str>> = HashMap::new();
        for f in files.iter() {
            paths.entry(f.project).or_default().insert(f.path.as_str());
        }
        for f in files.iter() {
            let project_paths = &paths[&f.project];
            let mut prefix_end = 0;
            while let Some(pos) = f.path[prefix_end..].find('/') {
                let dir = &f.path[..prefix_end + pos];
                if project_paths.contains(dir) {
                    issues.push(CorruptionIssue::new(
                        dir,
                        format!("name is used both as a file and as a directory of '{}'", f.path),
                    ));
                }
                prefix_end += pos + 1;
            }
        }

        issues
    }

    /// Validate one file's revision graph and symbol table.
    pub fn check_file(
        &self,
        file: &SourceFile,
    ) -> std::result::Result<ValidatedFile, Vec<CorruptionIssue>> {
        let path = file.path.as_str();
        let mut issues = Vec::new();

        let revisions = parse_revisions(path, &file.revisions, &mut issues);
        let numbers: BTreeSet<&RevisionNumber> = revisions.keys().collect();
        check_graph(path, &revisions, &mut issues);

        let default_branch = match &file.default_branch {
            None => None,
            Some(raw) => match RevisionNumber::parse(raw) {
                Ok(n) if n.is_branch() => Some(n),
                _ => {
                    issues.push(
                        CorruptionIssue::new(path, "default branch is not a branch number")
                            .with_revisions([raw]),
                    );
                    None
                }
            },
        };

        let mut symbols: Vec<(String, SymbolTarget)> = Vec::new();
        let mut names: HashSet<&str> = HashSet::new();
        let mut branch_names: HashMap<RevisionNumber, &str> = HashMap::new();
        for (name, raw) in &file.symbols {
            if !names.insert(name.as_str()) {
                issues.push(CorruptionIssue::new(
                    path,
                    format!("multiple definitions of symbol '{name}'"),
                ));
                continue;
            }
            let target = match SymbolTarget::parse(raw) {
                Ok(t) => t,
                Err(_) => {
                    issues.push(
                        CorruptionIssue::new(
                            path,
                            format!("symbol '{name}' has a malformed revision number"),
                        )
                        .with_revisions([raw]),
                    );
                    continue;
                }
            };
            match &target {
                SymbolTarget::Revision(r) => {
                    if !numbers.contains(r) {
                        issues.push(
                            CorruptionIssue::new(
                                path,
                                format!("tag '{name}' refers to a nonexistent revision"),
                            )
                            .with_revisions([r]),
                        );
                        continue;
                    }
                }
                SymbolTarget::Branch(b) => {
                    let sprout_exists = b
                        .sprout_revision()
                        .map(|s| numbers.contains(&s))
                        .unwrap_or(false);
                    if !sprout_exists {
                        issues.push(
                            CorruptionIssue::new(
                                path,
                                format!("branch '{name}' sprouts from a nonexistent revision"),
                            )
                            .with_revisions([b]),
                        );
                        continue;
                    }
                    if let Some(existing) = branch_names.get(b) {
                        warn!(
                            path = %path,
                            branch = %b,
                            kept = %existing,
                            ignored = %name,
                            "branch has more than one name; ignoring the later one"
                        );
                        continue;
                    }
                    branch_names.insert(b.clone(), name.as_str());
                }
            }
            symbols.push((name.clone(), target));
        }

        let labeled: BTreeSet<RevisionNumber> = branch_names.keys().cloned().collect();
        let unlabeled: BTreeSet<RevisionNumber> = revisions
            .keys()
            .filter_map(|r| r.branch_number())
            .filter(|b| !labeled.contains(b))
            .collect();
        for branch in unlabeled {
            if self.name_unlabeled_branches {
                let name = format!("unlabeled-{branch}");
                warn!(path = %path, branch = %branch, name = %name, "naming unlabeled branch");
                symbols.push((name, SymbolTarget::Branch(branch)));
            } else {
                issues.push(
                    CorruptionIssue::new(path, "branch has revisions but no name")
                        .with_revisions([branch]),
                );
            }
        }

        if !issues.is_empty() {
            return Err(issues);
        }

        Ok(ValidatedFile {
            project: ProjectId(file.project),
            path: file.path.clone(),
            keyword_mode: file.keyword_mode.clone(),
            default_branch,
            symbols,
            revisions: revisions.into_values().collect(),
        })
    }

    /// Every excluded symbol must only be needed by excluded symbols.
    ///
    /// Observations that are all graftable onto trunk do not block when the
    /// excluded symbol is a grafted vendor branch.
    pub fn check_exclusions(
        stats: &SymbolStatistics,
        kinds: &SymbolKinds,
        plan: &GraftPlan,
        symbols: &SymbolTable,
    ) -> Result<()> {
        let mut blocked = Vec::new();
        for s in stats.iter() {
            if kinds.kind(s.symbol) != Some(SymbolKind::Excluded) {
                continue;
            }
            let grafted = plan.is_grafted(s.symbol);
            let mut blockers: Vec<String> = s
                .blockers
                .iter()
                .filter(|b| kinds.kind(b.symbol) != Some(SymbolKind::Excluded))
                .filter(|b| !(grafted && b.graftable == b.observations))
                .map(|b| symbols.name(b.symbol).to_string())
                .collect();
            if blockers.is_empty() {
                continue;
            }
            blockers.sort();
            blocked.push(BlockedExclusion {
                symbol: symbols.name(s.symbol).to_string(),
                blockers,
            });
        }
        if blocked.is_empty() {
            Ok(())
        } else {
            blocked.sort_by(|a, b| a.symbol.cmp(&b.symbol));
            Err(ConvertError::ExclusionDependency { blocked })
        }
    }
}

fn attic_path(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((dir, name)) => format!("{dir}/Attic/{name}"),
        None => format!("Attic/{path}"),
    }
}

/// Parse numbers and drop exact duplicates.
fn parse_revisions(
    path: &str,
    raw: &[SourceRevision],
    issues: &mut Vec<CorruptionIssue>,
) -> BTreeMap<RevisionNumber, ParsedRevision> {
    let mut seen: HashMap<&str, &SourceRevision> = HashMap::new();
    let mut out = BTreeMap::new();

    for r in raw {
        if let Some(first) = seen.get(r.number.as_str()) {
            if *first == r {
                warn!(path = %path, revision = %r.number, "ignoring duplicate revision record");
            } else {
                issues.push(
                    CorruptionIssue::new(path, "conflicting definitions of revision")
                        .with_revisions([&r.number]),
                );
            }
            continue;
        }
        seen.insert(r.number.as_str(), r);

        let number = match RevisionNumber::parse(&r.number) {
            Ok(n) if n.is_revision() => n,
            _ => {
                issues.push(
                    CorruptionIssue::new(path, "malformed revision number")
                        .with_revisions([&r.number]),
                );
                continue;
            }
        };
        let parent = match r.parent.as_deref().map(RevisionNumber::parse) {
            None => None,
            Some(Ok(p)) if p.is_revision() => Some(p),
            Some(_) => {
                issues.push(
                    CorruptionIssue::new(path, "malformed parent revision number")
                        .with_revisions([&r.number]),
                );
                continue;
            }
        };
        out.insert(
            number.clone(),
            ParsedRevision {
                number,
                parent,
                timestamp: r.timestamp,
                author: r.author.clone(),
                log: r.log.clone(),
                state: r.state,
                content: r.content.clone(),
            },
        );
    }
    out
}

/// Missing parents, unrelated parents, multiple roots and parent cycles.
fn check_graph(
    path: &str,
    revisions: &BTreeMap<RevisionNumber, ParsedRevision>,
    issues: &mut Vec<CorruptionIssue>,
) {
    let mut roots = Vec::new();
    for r in revisions.values() {
        let Some(parent) = &r.parent else {
            roots.push(&r.number);
            continue;
        };
        if !revisions.contains_key(parent) {
            issues.push(
                CorruptionIssue::new(path, "parent revision does not exist")
                    .with_revisions([&r.number, parent]),
            );
            continue;
        }
        let related = match r.number.branch_number() {
            None => parent.is_trunk_revision(),
            Some(branch) => {
                parent.branch_number().as_ref() == Some(&branch)
                    || branch.sprout_revision().as_ref() == Some(parent)
            }
        };
        if !related {
            issues.push(
                CorruptionIssue::new(path, "parent is on an unrelated line of development")
                    .with_revisions([&r.number, parent]),
            );
        }
    }

    if !revisions.is_empty() && roots.len() != 1 {
        let detail = if roots.is_empty() {
            "revision graph has no root".to_string()
        } else {
            "revision graph has more than one root".to_string()
        };
        issues.push(CorruptionIssue::new(path, detail).with_revisions(roots));
    }

    let mut in_cycle: BTreeSet<&RevisionNumber> = BTreeSet::new();
    for start in revisions.keys() {
        let mut current = Some(start);
        let mut steps = 0;
        while let Some(number) = current {
            steps += 1;
            if steps > revisions.len() {
                in_cycle.insert(start);
                break;
            }
            current = revisions.get(number).and_then(|r| r.parent.as_ref());
        }
    }
    if !in_cycle.is_empty() {
        issues.push(CorruptionIssue::new(path, "revision parents form a cycle").with_revisions(in_cycle));
    }
}
