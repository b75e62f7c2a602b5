use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::file::FileId;
use super::lod::Lod;
use super::revision::{FileOp, RevisionNumber};

/// Position of a changeset in the emitted order, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChangeSetId(pub u32);

/// One file revision inside a changeset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSetItem {
    pub file: FileId,
    pub path: String,
    pub revision: RevisionNumber,
    pub lod: Lod,
    pub op: FileOp,
    pub content: Option<String>,
    /// Raw revision timestamp.
    pub timestamp: i64,
    /// Line of development the revision was grafted from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grafted_from: Option<Lod>,
    /// Trunk copy of a revision that also stays on its vendor branch.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub mirror: bool,
}

/// One reconstructed commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub id: ChangeSetId,
    pub author: String,
    pub log: String,
    /// Corrected timestamp; non-decreasing per line of development.
    pub timestamp: i64,
    /// Latest raw timestamp of the member revisions.
    pub original_timestamp: i64,
    /// Items sorted by path.
    pub items: Vec<ChangeSetItem>,
}

impl ChangeSet {
    pub fn lods(&self) -> BTreeSet<Lod> {
        self.items.iter().map(|i| i.lod).collect()
    }

    pub fn was_clamped(&self) -> bool {
        self.timestamp != self.original_timestamp
    }

    pub fn contains(&self, file: FileId, revision: &RevisionNumber) -> bool {
        self.items
            .iter()
            .any(|i| i.file == file && &i.revision == revision)
    }
}
