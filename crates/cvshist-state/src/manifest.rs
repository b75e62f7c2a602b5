//! Pass manifest: the commit log of a conversion run.
//!
//! A pass's output becomes visible only when its [`CommittedPass`] entry is
//! written to the manifest. Recording a pass invalidates every entry with
//! the same or a later index, since those were computed from older input.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::digest::Digest;

/// Location and size of one committed artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub digest: Digest,
    pub size: u64,
}

/// One successfully committed pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommittedPass {
    /// 1-based pass number.
    pub index: usize,
    pub name: String,
    /// Artifacts produced by the pass, keyed by artifact name.
    pub artifacts: BTreeMap<String, ArtifactRecord>,
    pub committed_at: DateTime<Utc>,
}

/// Commit log for a conversion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassManifest {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Committed passes in ascending index order.
    pub passes: Vec<CommittedPass>,
}

impl Default for PassManifest {
    fn default() -> Self {
        Self::new()
    }
}

impl PassManifest {
    /// Start a fresh manifest with a new run id.
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            created_at: Utc::now(),
            passes: Vec::new(),
        }
    }

    /// Index of the last committed pass, if any.
    pub fn last_committed(&self) -> Option<usize> {
        self.passes.last().map(|p| p.index)
    }

    pub fn is_committed(&self, index: usize) -> bool {
        self.passes.iter().any(|p| p.index == index)
    }

    /// The most recent committed record for `name`.
    pub fn artifact(&self, name: &str) -> Option<&ArtifactRecord> {
        self.passes
            .iter()
            .rev()
            .find_map(|p| p.artifacts.get(name))
    }

    /// Record `pass`, dropping entries at or after its index.
    ///
    /// Returns the entries that were dropped so their blobs can be discarded.
    pub fn record(&mut self, pass: CommittedPass) -> Vec<CommittedPass> {
        let dropped = self.truncate_from(pass.index);
        self.passes.push(pass);
        dropped
    }

    /// Remove every entry whose index is `>= index`.
    pub fn truncate_from(&mut self, index: usize) -> Vec<CommittedPass> {
        let split = self
            .passes
            .iter()
            .position(|p| p.index >= index)
            .unwrap_or(self.passes.len());
        self.passes.split_off(split)
    }

    /// Forget the record of `name` without touching other artifacts.
    ///
    /// Used when an artifact's blob has been discarded after its last
    /// consumer committed.
    pub fn forget_artifact(&mut self, name: &str) -> Option<ArtifactRecord> {
        self.passes
            .iter_mut()
            .rev()
            .find_map(|p| p.artifacts.remove(name))
    }
}
