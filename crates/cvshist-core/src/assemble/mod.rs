//! Changeset assembly.
//!
//! Per-file revisions are clustered into candidate commits by line of
//! development, author, log message and a sliding commit window (`window`),
//! then ordered so each revision follows its predecessors with
//! clock skew corrected (`sequence`).

pub mod sequence;
pub mod window;

use tracing::info;

use crate::config::ConversionOptions;
use crate::domain::{ChangeSet, CvsFile};
use crate::metrics;

pub use sequence::{sequence, ChangeSetDraft};

#[derive(Debug, Clone, Copy)]
pub struct ChangeSetAssembler {
    window: i64,
    cross_branch_commits: bool,
}

impl ChangeSetAssembler {
    pub fn new(options: &ConversionOptions) -> Self {
        Self {
            window: options.commit_window_secs,
            cross_branch_commits: options.cross_branch_commits,
        }
    }

    /// Assemble every revision of `files` into ordered changesets.
    ///
    /// `files` must be indexed by file id.
    pub fn assemble(&self, files: &[CvsFile]) -> Vec<ChangeSet> {
        let drafts = window::cluster(files, self.window, !self.cross_branch_commits);
        let clustered = drafts.len();

        let changesets = sequence(drafts, files);
        metrics::METRICS.inc_changesets_assembled(changesets.len() as u64);
        info!(
            candidates = clustered,
            changesets = changesets.len(),
            "changesets assembled"
        );
        changesets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::RevisionCollector;
    use crate::domain::{FileOp, Lod, SourceRevision};
    use crate::source::SourceFile;

    const T: i64 = 1_000_000;

    fn assemble_with(options: &ConversionOptions, files: Vec<SourceFile>) -> Vec<ChangeSet> {
        let repo = RevisionCollector::new(options).unwrap().collect(files).unwrap();
        ChangeSetAssembler::new(options).assemble(&repo.files)
    }

    fn assemble(files: Vec<SourceFile>) -> Vec<ChangeSet> {
        assemble_with(&ConversionOptions::default(), files)
    }

    fn paths(cs: &ChangeSet) -> Vec<&str> {
        cs.items.iter().map(|i| i.path.as_str()).collect()
    }

    #[test]
    fn test_same_author_and_log_within_window_group() {
        let files = vec![
            SourceFile::new("a.c").with_revision(SourceRevision::new("1.1", None, T, "jo", "init")),
            SourceFile::new("b.c")
                .with_revision(SourceRevision::new("1.1", None, T + 200, "jo", "init")),
            SourceFile::new("c.c")
                .with_revision(SourceRevision::new("1.1", None, T + 100, "al", "init")),
        ];
        let changesets = assemble(files);
        assert_eq!(changesets.len(), 2);
        let jo = changesets.iter().find(|c| c.author == "jo").unwrap();
        assert_eq!(paths(jo), vec!["a.c", "b.c"]);
        assert_eq!(jo.original_timestamp, T + 200);
    }

    #[test]
    fn test_window_chains_through_members() {
        let files = (0..4)
            .map(|i| {
                SourceFile::new(&format!("f{i}.c")).with_revision(SourceRevision::new(
                    "1.1",
                    None,
                    T + i * 250,
                    "jo",
                    "bulk",
                ))
            })
            .collect();
        let changesets = assemble(files);
        assert_eq!(changesets.len(), 1);
        assert_eq!(changesets[0].items.len(), 4);
    }

    #[test]
    fn test_gap_beyond_window_splits() {
        let files = vec![
            SourceFile::new("a.c").with_revision(SourceRevision::new("1.1", None, T, "jo", "x")),
            SourceFile::new("b.c")
                .with_revision(SourceRevision::new("1.1", None, T + 301, "jo", "x")),
        ];
        assert_eq!(assemble(files).len(), 2);
    }

    #[test]
    fn test_one_revision_per_file() {
        let files = vec![SourceFile::new("a.c")
            .with_revision(SourceRevision::new("1.1", None, T, "jo", "same"))
            .with_revision(SourceRevision::new("1.2", Some("1.1"), T + 10, "jo", "same"))];
        let changesets = assemble(files);
        assert_eq!(changesets.len(), 2);
        assert_eq!(changesets[0].items[0].op, FileOp::Add);
        assert_eq!(changesets[1].items[0].op, FileOp::Modify);
    }

    #[test]
    fn test_lods_cluster_separately_unless_cross_branch() {
        let files = vec![
            SourceFile::new("a.c").with_revision(SourceRevision::new("1.1", None, T, "jo", "init")),
            SourceFile::new("b.c")
                .with_symbol("BR", "1.1.0.2")
                .with_revision(SourceRevision::new("1.1", None, T - 1000, "jo", "old"))
                .with_revision(SourceRevision::new("1.1.2.1", Some("1.1"), T + 5, "jo", "init")),
        ];
        let split = assemble(files.clone());
        assert_eq!(split.len(), 3);
        assert!(split.iter().all(|c| c.lods().len() == 1));

        let options = ConversionOptions {
            cross_branch_commits: true,
            ..Default::default()
        };
        let joined = assemble_with(&options, files);
        assert_eq!(joined.len(), 2);
        assert_eq!(joined[1].lods().len(), 2);
    }

    #[test]
    fn test_branch_commit_with_same_log_keeps_trunk_commit_whole() {
        let files = vec![
            SourceFile::new("a.c")
                .with_symbol("BR", "1.1.0.2")
                .with_revision(SourceRevision::new("1.1", None, T - 5000, "jo", "start"))
                .with_revision(SourceRevision::new("1.1.2.1", Some("1.1"), T, "jo", "fix"))
                .with_revision(SourceRevision::new("1.2", Some("1.1"), T + 20, "jo", "fix")),
            SourceFile::new("b.c")
                .with_revision(SourceRevision::new("1.1", None, T - 5000, "jo", "start"))
                .with_revision(SourceRevision::new("1.2", Some("1.1"), T + 10, "jo", "fix")),
        ];
        let changesets = assemble(files);
        let fixes: Vec<&ChangeSet> = changesets.iter().filter(|c| c.log == "fix").collect();
        assert_eq!(fixes.len(), 2);

        let trunk = Lod::Trunk(Default::default());
        let on_trunk: Vec<&ChangeSet> = fixes
            .iter()
            .copied()
            .filter(|c| c.lods().into_iter().collect::<Vec<_>>() == vec![trunk])
            .collect();
        assert_eq!(on_trunk.len(), 1);
        let mut trunk_paths = paths(on_trunk[0]);
        trunk_paths.sort();
        assert_eq!(trunk_paths, vec!["a.c", "b.c"]);
        assert!(on_trunk[0].items.iter().all(|i| i.revision.to_string() == "1.2"));
    }

    #[test]
    fn test_children_follow_parents() {
        let files = vec![SourceFile::new("a.c")
            .with_symbol("BR", "1.1.0.2")
            .with_revision(SourceRevision::new("1.1", None, T, "jo", "a"))
            .with_revision(SourceRevision::new("1.1.2.1", Some("1.1"), T - 50, "jo", "b"))];
        let changesets = assemble(files);
        assert_eq!(changesets[0].items[0].lod, Lod::Trunk(Default::default()));
        assert_eq!(changesets[1].original_timestamp, T - 50);
    }

    #[test]
    fn test_dependency_cycle_is_split() {
        let files = vec![
            SourceFile::new("a.c")
                .with_revision(SourceRevision::new("1.1", None, T, "jo", "one"))
                .with_revision(SourceRevision::new("1.2", Some("1.1"), T + 10, "jo", "two")),
            SourceFile::new("b.c")
                .with_revision(SourceRevision::new("1.1", None, T, "jo", "one"))
                .with_revision(SourceRevision::new("1.2", Some("1.1"), T + 10, "jo", "two")),
        ];
        let repo = RevisionCollector::new(&ConversionOptions::default())
            .unwrap()
            .collect(files)
            .unwrap();
        let item = |f: usize, r: &str| {
            let file = &repo.files[f];
            window::item_for(file, file.revision(&r.parse().unwrap()).unwrap()).unwrap()
        };
        // Each draft holds a revision whose parent sits in the other one.
        let drafts = vec![
            ChangeSetDraft {
                author: "jo".to_string(),
                log: "x".to_string(),
                items: vec![item(0, "1.1"), item(1, "1.2")],
            },
            ChangeSetDraft {
                author: "jo".to_string(),
                log: "y".to_string(),
                items: vec![item(1, "1.1"), item(0, "1.2")],
            },
        ];

        let changesets = sequence(drafts, &repo.files);
        assert_eq!(changesets.len(), 3);
        assert_eq!(paths(&changesets[0]), vec!["a.c"]);
        assert_eq!(paths(&changesets[1]), vec!["a.c", "b.c"]);
        assert_eq!(paths(&changesets[2]), vec!["b.c"]);
        for file in ["a.c", "b.c"] {
            let order: Vec<String> = changesets
                .iter()
                .flat_map(|c| c.items.iter())
                .filter(|i| i.path == file)
                .map(|i| i.revision.to_string())
                .collect();
            assert_eq!(order, vec!["1.1", "1.2"]);
        }
    }
}
