//! Symbol collation.
//!
//! Scans every file's symbol table and aggregates, per symbol, how it was
//! used and which lines of development it could sprout from. Files are
//! scanned in parallel; the merge is sequential and ordered.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{CvsFile, Lod, ProjectId, RevisionNumber, SymbolId, SymbolTable};

/// Per-symbol usage counts, one unit per file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolUsage {
    pub tag_count: u32,
    pub branch_count: u32,
    pub commit_count: u32,
}

/// A line of development a symbol could sprout from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentCandidate {
    pub lod: Lod,
    /// Number of file observations.
    pub weight: u32,
    /// Observations whose sprout revision is a vendor default-branch revision.
    pub graftable: u32,
}

/// A symbol that sprouts from this branch in some file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blocker {
    pub symbol: SymbolId,
    pub observations: u32,
    pub graftable: u32,
}

/// Vendor-branch evidence for a branch symbol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorUsage {
    /// Files where the branch number has the vendor shape.
    pub vendor_files: u32,
    /// Files where the branch carries default-branch revisions.
    pub default_branch_files: u32,
    /// Files where the branch has more than one revision or revisions that
    /// are not default-branch revisions.
    pub written_files: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolStats {
    pub symbol: SymbolId,
    pub project: ProjectId,
    pub name: String,
    pub usage: SymbolUsage,
    /// Sorted by line of development.
    pub candidates: Vec<ParentCandidate>,
    /// Sorted by symbol.
    pub blockers: Vec<Blocker>,
    pub vendor: VendorUsage,
    pub earliest_sprout: Option<i64>,
    pub latest_sprout: Option<i64>,
}

impl SymbolStats {
    fn empty(symbol: SymbolId, project: ProjectId, name: &str) -> Self {
        Self {
            symbol,
            project,
            name: name.to_string(),
            usage: SymbolUsage::default(),
            candidates: Vec::new(),
            blockers: Vec::new(),
            vendor: VendorUsage::default(),
            earliest_sprout: None,
            latest_sprout: None,
        }
    }

    pub fn is_ambiguous(&self) -> bool {
        self.usage.tag_count > 0 && self.usage.branch_count > 0
    }

    /// Vendor branch that only ever received a single import.
    pub fn is_trivial_import(&self) -> bool {
        self.usage.tag_count == 0
            && self.usage.branch_count > 0
            && self.vendor.vendor_files == self.usage.branch_count
            && self.vendor.default_branch_files > 0
            && self.vendor.written_files == 0
    }

    pub fn candidate(&self, lod: Lod) -> Option<&ParentCandidate> {
        self.candidates.iter().find(|c| c.lod == lod)
    }
}

/// Statistics for every symbol, indexed by [`SymbolId`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolStatistics {
    stats: Vec<SymbolStats>,
}

impl SymbolStatistics {
    pub fn get(&self, symbol: SymbolId) -> Option<&SymbolStats> {
        self.stats.get(symbol.0 as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SymbolStats> {
        self.stats.iter()
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }
}

#[derive(Default)]
struct Observation {
    usage: SymbolUsage,
    candidates: BTreeMap<Lod, (u32, u32)>,
    blockers: BTreeMap<SymbolId, (u32, u32)>,
    vendor: VendorUsage,
    earliest: Option<i64>,
    latest: Option<i64>,
}

impl Observation {
    fn sprout_at(&mut self, timestamp: i64) {
        self.earliest = Some(self.earliest.map_or(timestamp, |t| t.min(timestamp)));
        self.latest = Some(self.latest.map_or(timestamp, |t| t.max(timestamp)));
    }

    fn candidate(&mut self, lod: Lod, graftable: bool) {
        let entry = self.candidates.entry(lod).or_default();
        entry.0 += 1;
        entry.1 += graftable as u32;
    }

    fn merge(&mut self, other: Observation) {
        self.usage.tag_count += other.usage.tag_count;
        self.usage.branch_count += other.usage.branch_count;
        self.usage.commit_count += other.usage.commit_count;
        for (lod, (w, g)) in other.candidates {
            let entry = self.candidates.entry(lod).or_default();
            entry.0 += w;
            entry.1 += g;
        }
        for (symbol, (o, g)) in other.blockers {
            let entry = self.blockers.entry(symbol).or_default();
            entry.0 += o;
            entry.1 += g;
        }
        self.vendor.vendor_files += other.vendor.vendor_files;
        self.vendor.default_branch_files += other.vendor.default_branch_files;
        self.vendor.written_files += other.vendor.written_files;
        if let Some(t) = other.earliest {
            self.sprout_at(t);
        }
        if let Some(t) = other.latest {
            self.sprout_at(t);
        }
    }
}

pub struct SymbolCollator;

impl SymbolCollator {
    pub fn collate(files: &[CvsFile], symbols: &SymbolTable) -> SymbolStatistics {
        let per_file: Vec<BTreeMap<SymbolId, Observation>> =
            files.par_iter().map(scan_file).collect();

        let mut merged: BTreeMap<SymbolId, Observation> = BTreeMap::new();
        for file in per_file {
            for (symbol, observation) in file {
                merged.entry(symbol).or_default().merge(observation);
            }
        }

        let stats: Vec<SymbolStats> = symbols
            .iter()
            .map(|s| {
                let mut stats = SymbolStats::empty(s.id, s.project, &s.name);
                if let Some(o) = merged.remove(&s.id) {
                    stats.usage = o.usage;
                    stats.candidates = o
                        .candidates
                        .into_iter()
                        .map(|(lod, (weight, graftable))| ParentCandidate {
                            lod,
                            weight,
                            graftable,
                        })
                        .collect();
                    stats.blockers = o
                        .blockers
                        .into_iter()
                        .map(|(symbol, (observations, graftable))| Blocker {
                            symbol,
                            observations,
                            graftable,
                        })
                        .collect();
                    stats.vendor = o.vendor;
                    stats.earliest_sprout = o.earliest;
                    stats.latest_sprout = o.latest;
                }
                stats
            })
            .collect();

        info!(symbols = stats.len(), files = files.len(), "symbols collated");
        SymbolStatistics { stats }
    }
}

/// Observations for every symbol defined in one file.
fn scan_file(file: &CvsFile) -> BTreeMap<SymbolId, Observation> {
    let mut out: BTreeMap<SymbolId, Observation> = BTreeMap::new();
    let is_default = |number: &RevisionNumber| {
        file.revision(number)
            .map(|r| r.default_branch)
            .unwrap_or(false)
    };

    let observe = |out: &mut BTreeMap<SymbolId, Observation>,
                       symbol: SymbolId,
                       sprout: &RevisionNumber,
                       extra_parents: Vec<SymbolId>| {
        let Some(revision) = file.revision(sprout) else {
            return;
        };
        let graftable = revision.default_branch;
        let o = out.entry(symbol).or_default();
        o.sprout_at(revision.timestamp);
        o.candidate(revision.lod, graftable);
        for parent in extra_parents {
            o.candidate(Lod::Branch(parent), false);
        }
        if let Lod::Branch(parent) = revision.lod {
            let entry = out
                .entry(parent)
                .or_default()
                .blockers
                .entry(symbol)
                .or_default();
            entry.0 += 1;
            entry.1 += graftable as u32;
        }
    };

    for branch in &file.branches {
        let revisions: Vec<_> = file.revisions_on(&branch.number).collect();
        {
            let o = out.entry(branch.symbol).or_default();
            o.usage.branch_count += 1;
            if !revisions.is_empty() {
                o.usage.commit_count += 1;
            }
            if branch.number.is_vendor_branch() {
                o.vendor.vendor_files += 1;
            }
            if revisions.iter().any(|r| r.default_branch) {
                o.vendor.default_branch_files += 1;
            }
            if revisions.len() > 1 || revisions.iter().any(|r| !is_default(&r.number)) {
                o.vendor.written_files += 1;
            }
        }

        // Branches from the same revision listed later in the header were
        // created earlier and are possible parents.
        let earlier: Vec<SymbolId> = file
            .branches
            .iter()
            .filter(|b| b.sprout == branch.sprout && b.header_order > branch.header_order)
            .filter(|b| file.revisions_on(&b.number).next().is_some())
            .map(|b| b.symbol)
            .collect();
        observe(&mut out, branch.symbol, &branch.sprout, earlier);
    }

    for tag in &file.tags {
        out.entry(tag.symbol).or_default().usage.tag_count += 1;
        let on_branches: Vec<SymbolId> = file
            .branches
            .iter()
            .filter(|b| b.sprout == tag.revision)
            .filter(|b| file.revisions_on(&b.number).next().is_some())
            .map(|b| b.symbol)
            .collect();
        observe(&mut out, tag.symbol, &tag.revision, on_branches);
    }

    out
}
