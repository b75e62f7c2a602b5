use std::fmt;

use serde::{Deserialize, Serialize};

use super::lod::Lod;
use super::revision::{Revision, RevisionNumber};
use super::symbol::SymbolId;

/// Index of a file within a conversion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(pub u32);

/// Index of a project within a conversion run.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ProjectId(pub u32);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A branch symbol as seen in one file's header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchSprout {
    pub symbol: SymbolId,
    pub number: RevisionNumber,
    pub sprout: RevisionNumber,
    /// Position in the header; CVS lists newer branches first.
    pub header_order: usize,
}

/// A tag symbol as seen in one file's header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSprout {
    pub symbol: SymbolId,
    pub revision: RevisionNumber,
    pub header_order: usize,
}

/// One CVS file after validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CvsFile {
    pub id: FileId,
    pub project: ProjectId,
    /// Path relative to the project root.
    pub path: String,
    pub keyword_mode: Option<String>,
    pub default_branch: Option<RevisionNumber>,
    /// `1.1` carries the log message written by `cvs import`.
    pub imported: bool,
    /// Sorted by revision number.
    pub revisions: Vec<Revision>,
    pub branches: Vec<BranchSprout>,
    pub tags: Vec<TagSprout>,
    /// `1.1` made redundant by an identical vendor import.
    pub redundant_initial: Option<RevisionNumber>,
}

impl CvsFile {
    pub fn revision(&self, number: &RevisionNumber) -> Option<&Revision> {
        self.revisions
            .binary_search_by(|r| r.number.cmp(number))
            .ok()
            .map(|i| &self.revisions[i])
    }

    pub fn lod_of(&self, number: &RevisionNumber) -> Option<Lod> {
        self.revision(number).map(|r| r.lod)
    }

    pub fn branch(&self, symbol: SymbolId) -> Option<&BranchSprout> {
        self.branches.iter().find(|b| b.symbol == symbol)
    }

    /// Revisions whose branch number is `branch`, oldest first.
    pub fn revisions_on<'a>(
        &'a self,
        branch: &'a RevisionNumber,
    ) -> impl Iterator<Item = &'a Revision> + 'a {
        self.revisions
            .iter()
            .filter(move |r| r.number.branch_number().as_ref() == Some(branch))
    }

    pub fn is_redundant(&self, number: &RevisionNumber) -> bool {
        self.redundant_initial.as_ref() == Some(number)
    }
}
