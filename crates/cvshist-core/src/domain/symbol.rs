use std::fmt;

use serde::{Deserialize, Serialize};

use super::file::ProjectId;

/// Index of a symbol in the run's [`SymbolTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(pub u32);

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Final classification of a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Branch,
    Tag,
    Excluded,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Branch => "branch",
            Self::Tag => "tag",
            Self::Excluded => "exclude",
        })
    }
}

/// A symbolic name within one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub project: ProjectId,
    pub name: String,
}

/// Every symbol of a run, indexed by [`SymbolId`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    /// Build a table from `(project, name)` pairs; ids follow the sorted
    /// order of the pairs.
    pub fn from_names<I>(names: I) -> Self
    where
        I: IntoIterator<Item = (ProjectId, String)>,
    {
        let mut names: Vec<_> = names.into_iter().collect();
        names.sort();
        names.dedup();
        let symbols = names
            .into_iter()
            .enumerate()
            .map(|(i, (project, name))| Symbol {
                id: SymbolId(i as u32),
                project,
                name,
            })
            .collect();
        Self { symbols }
    }

    pub fn get(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.get(id.0 as usize)
    }

    /// Name of `id`, or an empty string for an unknown id.
    pub fn name(&self, id: SymbolId) -> &str {
        self.get(id).map(|s| s.name.as_str()).unwrap_or("")
    }

    pub fn find(&self, project: ProjectId, name: &str) -> Option<&Symbol> {
        self.symbols
            .binary_search_by(|s| (s.project, s.name.as_str()).cmp(&(project, name)))
            .ok()
            .map(|i| &self.symbols[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
