//! Revision sources.
//!
//! A [`RevisionSource`] yields one [`SourceFile`] per CVS file: the parsed
//! RCS header and revision graph. Extracting revision texts is the source's
//! business; the engine only sees opaque content references.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{ConvertError, Result, SourceRevision};

/// One CVS file as read from the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    #[serde(default)]
    pub project: u32,
    /// Path relative to the project root, without any `Attic/` component.
    pub path: String,
    #[serde(default)]
    pub in_attic: bool,
    /// Header `branch` field.
    #[serde(default)]
    pub default_branch: Option<String>,
    /// Header `expand` field (`kv`, `b`, ...).
    #[serde(default)]
    pub keyword_mode: Option<String>,
    /// Header symbol table in file order: `(name, revision-or-branch)`.
    #[serde(default)]
    pub symbols: Vec<(String, String)>,
    #[serde(default)]
    pub revisions: Vec<SourceRevision>,
}

impl SourceFile {
    pub fn new(path: &str) -> Self {
        Self {
            project: 0,
            path: path.to_string(),
            in_attic: false,
            default_branch: None,
            keyword_mode: None,
            symbols: Vec::new(),
            revisions: Vec::new(),
        }
    }

    pub fn in_project(mut self, project: u32) -> Self {
        self.project = project;
        self
    }

    pub fn in_attic(mut self) -> Self {
        self.in_attic = true;
        self
    }

    pub fn with_default_branch(mut self, branch: &str) -> Self {
        self.default_branch = Some(branch.to_string());
        self
    }

    pub fn with_keyword_mode(mut self, mode: &str) -> Self {
        self.keyword_mode = Some(mode.to_string());
        self
    }

    pub fn with_symbol(mut self, name: &str, number: &str) -> Self {
        self.symbols.push((name.to_string(), number.to_string()));
        self
    }

    pub fn with_revision(mut self, revision: SourceRevision) -> Self {
        self.revisions.push(revision);
        self
    }
}

/// Producer of per-file revision records.
pub trait RevisionSource: Send + Sync {
    fn files(&self) -> Result<Vec<SourceFile>>;

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

/// Reads one JSON-encoded [`SourceFile`] per line.
#[derive(Debug, Clone)]
pub struct JsonLinesSource {
    path: PathBuf,
}

impl JsonLinesSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl RevisionSource for JsonLinesSource {
    fn files(&self) -> Result<Vec<SourceFile>> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut files = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let file: SourceFile = serde_json::from_str(trimmed).map_err(|e| {
                ConvertError::Source(format!("{}:{}: {e}", self.path.display(), index + 1))
            })?;
            files.push(file);
        }
        debug!(path = %self.path.display(), files = files.len(), "source read");
        Ok(files)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory source.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: Vec<SourceFile>,
}

impl MemorySource {
    pub fn new(files: Vec<SourceFile>) -> Self {
        Self { files }
    }
}

impl RevisionSource for MemorySource {
    fn files(&self) -> Result<Vec<SourceFile>> {
        Ok(self.files.clone())
    }

    fn describe(&self) -> String {
        format!("memory ({} files)", self.files.len())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_json_lines_source_reads_records() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            tmp,
            r#"{{"path":"a.c","symbols":[["REL_1","1.1"]],"revisions":[{{"number":"1.1","timestamp":100,"author":"jo","log":"init"}}]}}"#
        )
        .unwrap();
        writeln!(tmp).unwrap();
        writeln!(tmp, r#"{{"path":"b.c","in_attic":true}}"#).unwrap();

        let files = JsonLinesSource::new(tmp.path()).files().unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].symbols, vec![("REL_1".to_string(), "1.1".to_string())]);
        assert_eq!(files[0].revisions[0].timestamp, 100);
        assert!(files[1].in_attic);
    }

    #[test]
    fn test_json_lines_source_reports_line() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, r#"{{"path":"a.c"}}"#).unwrap();
        writeln!(tmp, "not json").unwrap();

        match JsonLinesSource::new(tmp.path()).files() {
            Err(ConvertError::Source(msg)) => assert!(msg.contains(":2:")),
            other => panic!("expected Source error, got {other:?}"),
        }
    }
}
