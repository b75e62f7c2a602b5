//! Target paths of lines of development.

use std::collections::BTreeMap;

use crate::config::ConversionOptions;
use crate::domain::{Lod, ProjectId, SymbolId, SymbolKind, SymbolTable};
use crate::symbols::classifier::SymbolKinds;
use crate::symbols::hints::SymbolHints;

/// Make a symbol name usable as a single path component.
pub fn clean_symbol_name(name: &str) -> String {
    name.replace('/', "++").replace('\\', "--")
}

fn join(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Path of every line of development that is converted.
#[derive(Debug, Clone, Default)]
pub struct LodPaths {
    trunks: BTreeMap<ProjectId, String>,
    symbols: BTreeMap<SymbolId, String>,
}

impl LodPaths {
    pub fn new(
        options: &ConversionOptions,
        symbols: &SymbolTable,
        kinds: &SymbolKinds,
        hints: &SymbolHints,
    ) -> Self {
        let mut paths = Self::default();
        for symbol in symbols.iter() {
            paths
                .trunks
                .entry(symbol.project)
                .or_insert_with(|| Self::trunk_path(options, symbol.project));

            let layout = options.layout(symbol.project);
            let dir = match kinds.kind(symbol.id) {
                Some(SymbolKind::Branch) => &layout.branches,
                Some(SymbolKind::Tag) => &layout.tags,
                _ => continue,
            };
            let path = hints
                .lookup(symbol.project, &symbol.name)
                .and_then(|h| h.svn_path.clone())
                .unwrap_or_else(|| join(&[&layout.root, dir, &clean_symbol_name(&symbol.name)]));
            paths.symbols.insert(symbol.id, path);
        }
        paths
    }

    fn trunk_path(options: &ConversionOptions, project: ProjectId) -> String {
        let layout = options.layout(project);
        join(&[&layout.root, &layout.trunk])
    }

    /// Register a project that has no symbols.
    pub fn add_project(&mut self, options: &ConversionOptions, project: ProjectId) {
        self.trunks
            .entry(project)
            .or_insert_with(|| Self::trunk_path(options, project));
    }

    /// `None` for excluded symbols.
    pub fn path(&self, lod: Lod) -> Option<&str> {
        match lod {
            Lod::Trunk(p) => self.trunks.get(&p).map(String::as_str),
            Lod::Branch(s) => self.symbols.get(&s).map(String::as_str),
        }
    }

    /// Path of `file` on `lod`.
    pub fn file_path(&self, lod: Lod, file: &str) -> Option<String> {
        self.path(lod).map(|dir| join(&[dir, file]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectLayout;
    use crate::symbols::classifier::{DecisionReason, SymbolDecision};

    fn decide(kinds: &[SymbolKind]) -> SymbolKinds {
        SymbolKinds::new(
            kinds
                .iter()
                .enumerate()
                .map(|(i, kind)| SymbolDecision {
                    symbol: SymbolId(i as u32),
                    kind: *kind,
                    reason: DecisionReason::Policy,
                })
                .collect(),
        )
    }

    #[test]
    fn test_clean_symbol_name() {
        assert_eq!(clean_symbol_name("rel/1.0\\beta"), "rel++1.0--beta");
    }

    #[test]
    fn test_default_layout_and_hint_override() {
        let symbols = SymbolTable::from_names([
            (ProjectId(0), "FEATURE".to_string()),
            (ProjectId(0), "OLD".to_string()),
            (ProjectId(0), "REL/1".to_string()),
        ]);
        let kinds = decide(&[SymbolKind::Branch, SymbolKind::Excluded, SymbolKind::Tag]);
        let hints = SymbolHints::parse("0 FEATURE branch /topic/feature\n").unwrap();
        let paths = LodPaths::new(&ConversionOptions::default(), &symbols, &kinds, &hints);

        assert_eq!(paths.path(Lod::Trunk(ProjectId(0))), Some("trunk"));
        assert_eq!(paths.path(Lod::Branch(SymbolId(0))), Some("topic/feature"));
        assert_eq!(paths.path(Lod::Branch(SymbolId(1))), None);
        assert_eq!(paths.path(Lod::Branch(SymbolId(2))), Some("tags/REL++1"));
        assert_eq!(
            paths.file_path(Lod::Trunk(ProjectId(0)), "src/main.c").as_deref(),
            Some("trunk/src/main.c")
        );
    }

    #[test]
    fn test_project_root() {
        let options = ConversionOptions {
            projects: vec![
                ProjectLayout::default(),
                ProjectLayout {
                    root: "tools".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let symbols = SymbolTable::from_names([(ProjectId(1), "B".to_string())]);
        let kinds = decide(&[SymbolKind::Branch]);
        let paths = LodPaths::new(&options, &symbols, &kinds, &SymbolHints::default());
        assert_eq!(paths.path(Lod::Trunk(ProjectId(1))), Some("tools/trunk"));
        assert_eq!(paths.path(Lod::Branch(SymbolId(0))), Some("tools/branches/B"));
    }
}
