//! Resuming conversions from a filesystem artifact store.

use std::fs;
use std::path::Path;

use cvshist_core::output::MemorySink;
use cvshist_core::{
    ConversionOptions, ConvertError, MemorySource, PassManager, SourceFile, SourceRevision,
};
use cvshist_state::{ArtifactStore, FsArtifactStore, StateError};

// ---- Helpers ----

fn source() -> MemorySource {
    MemorySource::new(vec![
        SourceFile::new("src/a.c")
            .with_symbol("REL_1", "1.2")
            .with_symbol("FEATURE", "1.2.0.2")
            .with_revision(SourceRevision::new("1.1", None, 1_000, "ann", "start"))
            .with_revision(SourceRevision::new("1.2", Some("1.1"), 2_000, "ann", "fix"))
            .with_revision(SourceRevision::new("1.2.2.1", Some("1.2"), 3_000, "bob", "feature")),
        SourceFile::new("src/b.c")
            .with_symbol("REL_1", "1.1")
            .with_revision(SourceRevision::new("1.1", None, 1_000, "ann", "start")),
    ])
}

/// Overwrite every stored blob with different bytes.
fn tamper_blobs(root: &Path) -> usize {
    let mut count = 0;
    for shard in fs::read_dir(root.join("objects")).unwrap() {
        for blob in fs::read_dir(shard.unwrap().path()).unwrap() {
            fs::write(blob.unwrap().path(), b"[]").unwrap();
            count += 1;
        }
    }
    count
}

// ---- Resumption ----

#[test]
fn split_run_matches_single_run() {
    let options = ConversionOptions::default();
    let manager = PassManager::standard();

    let whole_dir = tempfile::tempdir().unwrap();
    let whole_store = FsArtifactStore::new(whole_dir.path()).unwrap();
    let mut whole = MemorySink::new();
    manager
        .run_all(&whole_store, &options, &source(), &mut whole)
        .unwrap();

    let split_dir = tempfile::tempdir().unwrap();
    let mut split = MemorySink::new();
    {
        let store = FsArtifactStore::new(split_dir.path()).unwrap();
        let summary = manager
            .run(&store, &options, &source(), &mut split, 1, 3)
            .unwrap();
        assert_eq!(summary.passes.len(), 3);
        assert!(split.events.is_empty());
    }
    // A fresh store handle sees the committed manifest.
    let store = FsArtifactStore::new(split_dir.path()).unwrap();
    assert_eq!(store.load_manifest().unwrap().last_committed(), Some(3));
    manager
        .run(&store, &options, &source(), &mut split, 4, 7)
        .unwrap();

    assert_eq!(whole.events, split.events);
}

#[test]
fn failed_pass_leaves_previous_pass_committed() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsArtifactStore::new(dir.path()).unwrap();
    let manager = PassManager::standard();
    let mut sink = MemorySink::new();
    manager
        .run(&store, &ConversionOptions::default(), &source(), &mut sink, 1, 3)
        .unwrap();

    // FEATURE has commits, so it cannot be forced to a tag.
    let bad = ConversionOptions {
        force_tag: vec!["FEATURE".to_string()],
        ..Default::default()
    };
    let err = manager
        .run(&store, &bad, &source(), &mut sink, 4, 7)
        .unwrap_err();
    assert!(matches!(err, ConvertError::Configuration { .. }));
    assert_eq!(store.load_manifest().unwrap().last_committed(), Some(3));
    assert!(sink.events.is_empty());
}

// ---- Integrity ----

#[test]
fn tampered_artifact_is_rejected_on_resume() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsArtifactStore::new(dir.path()).unwrap();
    let manager = PassManager::standard();
    let mut sink = MemorySink::new();
    manager
        .run(&store, &ConversionOptions::default(), &source(), &mut sink, 1, 3)
        .unwrap();

    assert!(tamper_blobs(dir.path()) > 0);

    let err = manager
        .run(&store, &ConversionOptions::default(), &source(), &mut sink, 4, 7)
        .unwrap_err();
    assert!(matches!(
        err,
        ConvertError::Storage(StateError::DigestMismatch { .. })
    ));
    assert!(sink.events.is_empty());
}
