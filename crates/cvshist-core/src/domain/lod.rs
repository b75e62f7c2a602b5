//! Lines of development and the resolved LOD tree.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::file::ProjectId;
use super::symbol::{SymbolId, SymbolKind};

/// Trunk of a project, or a branch symbol. Trunk sorts before every branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "lod", content = "id", rename_all = "lowercase")]
pub enum Lod {
    Trunk(ProjectId),
    Branch(SymbolId),
}

impl Lod {
    pub fn is_trunk(&self) -> bool {
        matches!(self, Self::Trunk(_))
    }

    pub fn symbol(&self) -> Option<SymbolId> {
        match self {
            Self::Trunk(_) => None,
            Self::Branch(id) => Some(*id),
        }
    }
}

/// Resolved placement of one non-excluded symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LodNode {
    pub symbol: SymbolId,
    pub project: ProjectId,
    pub kind: SymbolKind,
    pub parent: Lod,
    /// Number of file observations supporting `parent`.
    pub weight: u32,
    /// Attached to trunk after every candidate was exhausted.
    pub fallback: bool,
    /// Latest timestamp among the symbol's sprout revisions.
    pub sprout_time: i64,
}

/// Acyclic tree rooted at trunk. Nodes are kept sorted by symbol id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LodTree {
    nodes: Vec<LodNode>,
}

impl LodTree {
    pub fn new(mut nodes: Vec<LodNode>) -> Self {
        nodes.sort_by_key(|n| n.symbol);
        Self { nodes }
    }

    pub fn get(&self, symbol: SymbolId) -> Option<&LodNode> {
        self.nodes
            .binary_search_by_key(&symbol, |n| n.symbol)
            .ok()
            .map(|i| &self.nodes[i])
    }

    pub fn parent(&self, symbol: SymbolId) -> Option<Lod> {
        self.get(symbol).map(|n| n.parent)
    }

    pub fn nodes(&self) -> &[LodNode] {
        &self.nodes
    }

    /// Symbols whose resolved parent is `lod`.
    pub fn children(&self, lod: Lod) -> Vec<SymbolId> {
        self.nodes
            .iter()
            .filter(|n| n.parent == lod)
            .map(|n| n.symbol)
            .collect()
    }

    /// Lines of development from `symbol`'s parent up to trunk.
    pub fn ancestors(&self, symbol: SymbolId) -> Vec<Lod> {
        let mut out = Vec::new();
        let mut seen = BTreeSet::new();
        let mut current = self.parent(symbol);
        while let Some(lod) = current {
            out.push(lod);
            match lod {
                Lod::Trunk(_) => break,
                Lod::Branch(id) => {
                    if !seen.insert(id) {
                        break;
                    }
                    current = self.parent(id);
                }
            }
        }
        out
    }

    /// Check that every node reaches trunk through branch nodes.
    ///
    /// Returns the symbols that do not, sorted.
    pub fn validate(&self) -> Result<(), Vec<SymbolId>> {
        let index: BTreeMap<SymbolId, &LodNode> =
            self.nodes.iter().map(|n| (n.symbol, n)).collect();
        let mut bad = Vec::new();

        for node in &self.nodes {
            let mut steps = 0usize;
            let mut current = node.parent;
            let rooted = loop {
                match current {
                    Lod::Trunk(_) => break true,
                    Lod::Branch(id) => {
                        steps += 1;
                        match index.get(&id) {
                            Some(parent) if parent.kind == SymbolKind::Branch => {
                                if steps > self.nodes.len() {
                                    break false;
                                }
                                current = parent.parent;
                            }
                            _ => break false,
                        }
                    }
                }
            };
            if !rooted {
                bad.push(node.symbol);
            }
        }

        if bad.is_empty() {
            Ok(())
        } else {
            Err(bad)
        }
    }
}
