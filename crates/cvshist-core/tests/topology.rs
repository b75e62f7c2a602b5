//! Branch/tag topology: classification, parent resolution and cycle breaking
//! over whole repositories.

use cvshist_core::output::{MemorySink, OutputEvent};
use cvshist_core::symbols::{SymbolClassifier, SymbolCollator, SymbolHints, SymbolParentResolver};
use cvshist_core::vendor::GraftPlan;
use cvshist_core::{
    ConversionOptions, Lod, MemorySource, PassManager, ProjectId, RevisionCollector,
    SourceFile, SourceRevision, SymbolKind,
};
use cvshist_state::fakes::MemoryArtifactStore;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// `count` files where `child` sprouts from a commit on `parent`.
fn nested(prefix: &str, count: usize, parent: &str, child: &str) -> Vec<SourceFile> {
    (0..count)
        .map(|i| {
            SourceFile::new(&format!("{prefix}{i}.c"))
                .with_symbol(child, "1.1.2.1.0.2")
                .with_symbol(parent, "1.1.0.2")
                .with_revision(SourceRevision::new("1.1", None, 100, "jo", "add"))
                .with_revision(SourceRevision::new("1.1.2.1", Some("1.1"), 200, "jo", parent))
        })
        .collect()
}

/// `count` files where `outer` sprouts from trunk, `middle` from a commit on
/// `outer` and `inner` from a commit on `middle`.
fn chain(prefix: &str, count: usize, outer: &str, middle: &str, inner: &str) -> Vec<SourceFile> {
    (0..count)
        .map(|i| {
            SourceFile::new(&format!("{prefix}{i}.c"))
                .with_symbol(outer, "1.1.0.2")
                .with_symbol(middle, "1.1.2.1.0.2")
                .with_symbol(inner, "1.1.2.1.2.1.0.2")
                .with_revision(SourceRevision::new("1.1", None, 100, "jo", "add"))
                .with_revision(SourceRevision::new("1.1.2.1", Some("1.1"), 200, "jo", outer))
                .with_revision(SourceRevision::new(
                    "1.1.2.1.2.1",
                    Some("1.1.2.1"),
                    300,
                    "jo",
                    middle,
                ))
        })
        .collect()
}

/// A prefers C (weight 5), B prefers A (5), C prefers B (4, against 3 for
/// trunk).
fn rotating_preferences() -> Vec<SourceFile> {
    let mut files = chain("cab", 3, "C", "A", "B");
    files.extend(chain("abc", 2, "A", "B", "C"));
    files.extend(chain("bca", 2, "B", "C", "A"));
    files
}

// ---------------------------------------------------------------------------
// Cycle breaking
// ---------------------------------------------------------------------------

#[test]
fn rotating_preference_cycle_is_broken_by_one_demotion() {
    let options = ConversionOptions::default();
    let repo = RevisionCollector::new(&options)
        .unwrap()
        .collect(rotating_preferences())
        .unwrap();
    let stats = SymbolCollator::collate(&repo.files, &repo.symbols);
    let hints = SymbolHints::default();
    let kinds = SymbolClassifier::new(&options, &hints)
        .unwrap()
        .classify(&stats)
        .unwrap();
    let plan = GraftPlan::from_classification(&stats, &kinds);
    let resolution = SymbolParentResolver::new(&stats, &kinds, &hints, &repo.symbols, &plan)
        .resolve()
        .unwrap();

    let id = |name: &str| repo.symbols.find(ProjectId(0), name).unwrap().id;
    assert_eq!(resolution.demotions.len(), 1);
    assert_eq!(resolution.demotions[0].symbol, id("C"));
    assert_eq!(resolution.demotions[0].weight, 4);

    let tree = &resolution.tree;
    assert!(tree.validate().is_ok());
    assert_eq!(tree.parent(id("C")), Some(Lod::Trunk(ProjectId(0))));
    assert_eq!(tree.parent(id("A")), Some(Lod::Branch(id("C"))));
    assert_eq!(tree.parent(id("B")), Some(Lod::Branch(id("A"))));
}

#[test]
fn rotating_preferences_convert_with_parents_created_first() {
    let store = MemoryArtifactStore::new();
    let mut sink = MemorySink::new();
    PassManager::standard()
        .run_all(
            &store,
            &ConversionOptions::default(),
            &MemorySource::new(rotating_preferences()),
            &mut sink,
        )
        .unwrap();

    let creates: Vec<(&str, &str)> = sink
        .events
        .iter()
        .filter_map(|e| match e {
            OutputEvent::CreateSymbol {
                name, parent_path, ..
            } => Some((name.as_str(), parent_path.as_str())),
            _ => None,
        })
        .collect();
    assert_eq!(
        creates,
        vec![
            ("C", "trunk"),
            ("A", "branches/C"),
            ("B", "branches/A"),
        ]
    );
}

// ---------------------------------------------------------------------------
// Resolved-tree invariants
// ---------------------------------------------------------------------------

#[test]
fn no_symbol_has_an_excluded_parent() {
    let options = ConversionOptions {
        exclude: vec!["C".to_string()],
        ..Default::default()
    };
    let files: Vec<SourceFile> = nested("f", 3, "C", "A")
        .into_iter()
        .chain([SourceFile::new("g.c")
            .with_symbol("A", "1.1.0.2")
            .with_revision(SourceRevision::new("1.1", None, 100, "jo", "add"))])
        .collect();

    let repo = RevisionCollector::new(&options)
        .unwrap()
        .collect(files)
        .unwrap();
    let stats = SymbolCollator::collate(&repo.files, &repo.symbols);
    let hints = SymbolHints::default();
    let kinds = SymbolClassifier::new(&options, &hints)
        .unwrap()
        .classify(&stats)
        .unwrap();
    let plan = GraftPlan::from_classification(&stats, &kinds);

    let err = cvshist_core::ConsistencyGuard::check_exclusions(&stats, &kinds, &plan, &repo.symbols)
        .unwrap_err();
    // A sprouts from revisions on C in three files.
    assert!(err.to_string().contains('A'));

    let resolution = SymbolParentResolver::new(&stats, &kinds, &hints, &repo.symbols, &plan)
        .resolve()
        .unwrap();
    for node in resolution.tree.nodes() {
        if let Lod::Branch(parent) = node.parent {
            assert_ne!(kinds.kind(parent), Some(SymbolKind::Excluded));
        }
    }
}

#[test]
fn parent_hint_overrides_preference() {
    let dir = tempfile::tempdir().unwrap();
    let hints_path = dir.path().join("hints.txt");
    std::fs::write(&hints_path, ". A branch . .trunk.\n").unwrap();
    let written = dir.path().join("resolved.txt");
    let options = ConversionOptions {
        symbol_hints: Some(hints_path),
        write_symbol_hints: Some(written.clone()),
        ..Default::default()
    };

    let store = MemoryArtifactStore::new();
    let mut sink = MemorySink::new();
    PassManager::standard()
        .run_all(
            &store,
            &options,
            &MemorySource::new(nested("f", 2, "C", "A")),
            &mut sink,
        )
        .unwrap();

    let resolved = SymbolHints::load(&written).unwrap();
    let a = resolved.lookup(ProjectId(0), "A").unwrap();
    assert_eq!(a.parent, Some(cvshist_core::symbols::ParentHint::Trunk));
    assert_eq!(a.svn_path.as_deref(), Some("branches/A"));
    let c = resolved.lookup(ProjectId(0), "C").unwrap();
    assert_eq!(c.conversion, Some(cvshist_core::symbols::HintConversion::Branch));
}
