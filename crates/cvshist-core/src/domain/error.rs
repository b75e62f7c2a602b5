//! Error taxonomy for the conversion engine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One piece of evidence that the source repository is corrupt.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorruptionIssue {
    pub path: String,
    pub revisions: Vec<String>,
    pub detail: String,
}

impl CorruptionIssue {
    pub fn new(path: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            revisions: Vec::new(),
            detail: detail.into(),
        }
    }

    pub fn with_revisions<I, S>(mut self, revisions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        self.revisions = revisions.into_iter().map(|r| r.to_string()).collect();
        self
    }
}

impl fmt::Display for CorruptionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.detail)?;
        if !self.revisions.is_empty() {
            write!(f, " [{}]", self.revisions.join(", "))?;
        }
        Ok(())
    }
}

/// A symbol used as both a tag and a branch with no resolution directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbiguousSymbol {
    pub name: String,
    pub tag_count: u32,
    pub branch_count: u32,
    pub commit_count: u32,
}

impl fmt::Display for AmbiguousSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' is a tag in {} files, a branch in {} files and has commits in {} files",
            self.name, self.tag_count, self.branch_count, self.commit_count
        )
    }
}

/// An excluded symbol that other, non-excluded symbols still depend on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedExclusion {
    pub symbol: String,
    pub blockers: Vec<String>,
}

impl fmt::Display for BlockedExclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' cannot be excluded because these symbols depend on it: {}",
            self.symbol,
            self.blockers.join(", ")
        )
    }
}

fn lines<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| format!("  {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Conversion errors.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("repository corruption detected:\n{}", lines(.issues))]
    Corruption { issues: Vec<CorruptionIssue> },

    #[error(
        "symbols are tags in some files and branches in others; \
         resolve them with force-branch, force-tag or exclude:\n{}",
        lines(.symbols)
    )]
    Ambiguity { symbols: Vec<AmbiguousSymbol> },

    #[error("excluded symbols are still needed by other symbols:\n{}", lines(.blocked))]
    ExclusionDependency { blocked: Vec<BlockedExclusion> },

    #[error("configuration error:\n{}", lines(.problems))]
    Configuration { problems: Vec<String> },

    #[error("revision source error: {0}")]
    Source(String),

    #[error("invalid pass: {0}")]
    InvalidPass(String),

    #[error("artifact '{name}' has not been committed by an earlier pass")]
    MissingArtifact { name: String },

    #[error("storage error: {0}")]
    Storage(#[from] cvshist_state::StateError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConvertError {
    /// Single-problem configuration error.
    pub fn configuration(problem: impl Into<String>) -> Self {
        Self::Configuration {
            problems: vec![problem.into()],
        }
    }
}

/// Result type for conversion operations.
pub type Result<T> = std::result::Result<T, ConvertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corruption_lists_every_issue() {
        let err = ConvertError::Corruption {
            issues: vec![
                CorruptionIssue::new("src/a.c", "parent does not exist").with_revisions(["1.3"]),
                CorruptionIssue::new("src/b.c", "file is both in and out of the Attic"),
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("src/a.c: parent does not exist [1.3]"));
        assert!(msg.contains("src/b.c"));
    }

    #[test]
    fn test_ambiguity_reports_counts() {
        let err = ConvertError::Ambiguity {
            symbols: vec![AmbiguousSymbol {
                name: "REL_1".to_string(),
                tag_count: 3,
                branch_count: 1,
                commit_count: 0,
            }],
        };
        assert!(err
            .to_string()
            .contains("'REL_1' is a tag in 3 files, a branch in 1 files"));
    }

    #[test]
    fn test_exclusion_dependency_names_blockers() {
        let err = ConvertError::ExclusionDependency {
            blocked: vec![BlockedExclusion {
                symbol: "B".to_string(),
                blockers: vec!["T1".to_string(), "T2".to_string()],
            }],
        };
        assert!(err.to_string().contains("'B' cannot be excluded"));
        assert!(err.to_string().contains("T1, T2"));
    }

    #[test]
    fn test_storage_error_converts() {
        let state = cvshist_state::StateError::Manifest("truncated".to_string());
        let err: ConvertError = state.into();
        assert!(matches!(err, ConvertError::Storage(_)));
    }
}
