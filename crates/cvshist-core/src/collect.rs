//! Revision collection: turns source records into validated [`CvsFile`]s
//! and the run's [`SymbolTable`].

use std::collections::HashMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ConversionOptions;
use crate::domain::{
    BranchSprout, ConvertError, CorruptionIssue, CvsFile, FileId, FileOp, Lod, Result, Revision,
    RevisionNumber, SymbolId, SymbolTable, SymbolTarget, TagSprout,
};
use crate::guard::{ConsistencyGuard, ValidatedFile};
use crate::metrics;
use crate::source::SourceFile;
use crate::symbols::transform::{SymbolTransform, TransformChain};
use crate::vendor;

/// Output of the collection pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectedRepository {
    /// Sorted by `(project, path)`; `files[i].id == FileId(i)`.
    pub files: Vec<CvsFile>,
    pub symbols: SymbolTable,
}

impl CollectedRepository {
    pub fn file(&self, id: FileId) -> Option<&CvsFile> {
        self.files.get(id.0 as usize)
    }
}

pub struct RevisionCollector {
    guard: ConsistencyGuard,
    transforms: TransformChain,
}

impl RevisionCollector {
    pub fn new(options: &ConversionOptions) -> Result<Self> {
        Ok(Self {
            guard: ConsistencyGuard::new(options),
            transforms: TransformChain::from_rules(&options.symbol_transforms)?,
        })
    }

    pub fn collect(&self, mut files: Vec<SourceFile>) -> Result<CollectedRepository> {
        if !self.transforms.is_empty() {
            for file in &mut files {
                for (name, _) in &mut file.symbols {
                    *name = self.transforms.transform(&file.path, name);
                }
            }
        }

        let mut validated = self.guard.check_all(files)?;
        validated.sort_by(|a, b| (a.project, &a.path).cmp(&(b.project, &b.path)));

        let symbols = SymbolTable::from_names(validated.iter().flat_map(|f| {
            f.symbols
                .iter()
                .map(move |(name, _)| (f.project, name.clone()))
        }));

        let results: Vec<_> = validated
            .par_iter()
            .enumerate()
            .map(|(i, v)| build_file(FileId(i as u32), v, &symbols))
            .collect();

        let mut out = Vec::with_capacity(results.len());
        let mut issues = Vec::new();
        for result in results {
            match result {
                Ok(file) => out.push(file),
                Err(issue) => issues.push(issue),
            }
        }
        if !issues.is_empty() {
            return Err(ConvertError::Corruption { issues });
        }

        let revisions: usize = out.iter().map(|f| f.revisions.len()).sum();
        metrics::METRICS.inc_revisions_collected(revisions as u64);
        info!(
            files = out.len(),
            revisions,
            symbols = symbols.len(),
            "revisions collected"
        );

        Ok(CollectedRepository {
            files: out,
            symbols,
        })
    }
}

fn build_file(
    id: FileId,
    v: &ValidatedFile,
    symbols: &SymbolTable,
) -> std::result::Result<CvsFile, CorruptionIssue> {
    let lookup = |name: &str| {
        symbols
            .find(v.project, name)
            .map(|s| s.id)
            .ok_or_else(|| CorruptionIssue::new(&v.path, format!("unknown symbol '{name}'")))
    };

    let mut branches = Vec::new();
    let mut tags = Vec::new();
    let mut branch_ids: HashMap<&RevisionNumber, SymbolId> = HashMap::new();
    for (header_order, (name, target)) in v.symbols.iter().enumerate() {
        let symbol = lookup(name.as_str())?;
        match target {
            SymbolTarget::Revision(revision) => tags.push(TagSprout {
                symbol,
                revision: revision.clone(),
                header_order,
            }),
            SymbolTarget::Branch(number) => {
                let Some(sprout) = number.sprout_revision() else {
                    continue;
                };
                branch_ids.insert(number, symbol);
                branches.push(BranchSprout {
                    symbol,
                    number: number.clone(),
                    sprout,
                    header_order,
                });
            }
        }
    }

    let defaults = vendor::default_branch_revisions(v);
    let redundant_initial = vendor::redundant_initial_revision(v, &defaults);

    let mut revisions = Vec::with_capacity(v.revisions.len());
    for r in &v.revisions {
        let lod = match r.number.branch_number() {
            None => Lod::Trunk(v.project),
            Some(branch) => match branch_ids.get(&branch) {
                Some(symbol) => Lod::Branch(*symbol),
                None => {
                    return Err(CorruptionIssue::new(&v.path, "branch has revisions but no name")
                        .with_revisions([branch]))
                }
            },
        };
        let predecessor = r
            .parent
            .as_ref()
            .and_then(|p| v.revision(p))
            .map(|p| p.state);
        revisions.push(Revision {
            file: id,
            number: r.number.clone(),
            parent: r.parent.clone(),
            lod,
            timestamp: r.timestamp,
            author: r.author.clone(),
            log: r.log.clone(),
            state: r.state,
            content: r.content.clone(),
            op: FileOp::derive(r.state, predecessor),
            default_branch: defaults.contains(&r.number),
        });
    }

    Ok(CvsFile {
        id,
        project: v.project,
        path: v.path.clone(),
        keyword_mode: v.keyword_mode.clone(),
        default_branch: v.default_branch.clone(),
        imported: vendor::is_imported(v),
        revisions,
        branches,
        tags,
        redundant_initial,
    })
}
