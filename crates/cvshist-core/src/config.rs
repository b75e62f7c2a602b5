//! Conversion options.
//!
//! Options are plain data: loaded from a TOML file, overridden by command
//! line flags, and handed to every pass through the pass context.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::{ConvertError, ProjectId, Result};

/// Commit window used when grouping revisions into changesets, in seconds.
pub const DEFAULT_COMMIT_WINDOW_SECS: i64 = 300;

/// How to classify symbols used both as a tag and as a branch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolDefault {
    /// Commits make a branch, otherwise the majority of uses wins.
    #[default]
    Heuristic,
    /// Refuse to guess.
    Strict,
    Branch,
    Tag,
}

impl FromStr for SymbolDefault {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "heuristic" => Ok(Self::Heuristic),
            "strict" => Ok(Self::Strict),
            "branch" => Ok(Self::Branch),
            "tag" => Ok(Self::Tag),
            other => Err(ConvertError::configuration(format!(
                "unknown symbol default '{other}' (expected heuristic, strict, branch or tag)"
            ))),
        }
    }
}

impl fmt::Display for SymbolDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Heuristic => "heuristic",
            Self::Strict => "strict",
            Self::Branch => "branch",
            Self::Tag => "tag",
        })
    }
}

/// Target layout of one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectLayout {
    /// Path prefix of the project in the target repository.
    pub root: String,
    pub trunk: String,
    pub branches: String,
    pub tags: String,
}

impl Default for ProjectLayout {
    fn default() -> Self {
        Self {
            root: String::new(),
            trunk: "trunk".to_string(),
            branches: "branches".to_string(),
            tags: "tags".to_string(),
        }
    }
}

/// Regex rewrite applied to symbol names as they are read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformRule {
    pub pattern: String,
    pub replacement: String,
}

/// Sets a file property on every path matching `pattern`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropertyRule {
    pub pattern: String,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConversionOptions {
    pub commit_window_secs: i64,
    pub symbol_default: SymbolDefault,
    /// Regexes matched against whole symbol names.
    pub force_branch: Vec<String>,
    pub force_tag: Vec<String>,
    pub exclude: Vec<String>,
    pub symbol_transforms: Vec<TransformRule>,
    pub symbol_hints: Option<PathBuf>,
    /// Where to write the resolved symbol hints after conversion.
    pub write_symbol_hints: Option<PathBuf>,
    pub keep_trivial_imports: bool,
    pub cross_branch_commits: bool,
    pub trunk_only: bool,
    pub retain_conflicting_attic_files: bool,
    pub name_unlabeled_branches: bool,
    pub keep_artifacts: bool,
    pub keyword_properties: bool,
    pub properties: Vec<PropertyRule>,
    /// Layout per project, indexed by project id. Missing entries use the
    /// default layout.
    pub projects: Vec<ProjectLayout>,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            commit_window_secs: DEFAULT_COMMIT_WINDOW_SECS,
            symbol_default: SymbolDefault::default(),
            force_branch: Vec::new(),
            force_tag: Vec::new(),
            exclude: Vec::new(),
            symbol_transforms: Vec::new(),
            symbol_hints: None,
            write_symbol_hints: None,
            keep_trivial_imports: false,
            cross_branch_commits: false,
            trunk_only: false,
            retain_conflicting_attic_files: false,
            name_unlabeled_branches: false,
            keep_artifacts: false,
            keyword_properties: true,
            properties: Vec::new(),
            projects: Vec::new(),
        }
    }
}

impl ConversionOptions {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let options: Self = toml::from_str(text)
            .map_err(|e| ConvertError::configuration(format!("invalid options file: {e}")))?;
        options.validate()?;
        Ok(options)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Check every option, collecting all problems.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        if self.commit_window_secs <= 0 {
            problems.push(format!(
                "commit_window_secs must be positive, got {}",
                self.commit_window_secs
            ));
        }
        let patterns = self
            .force_branch
            .iter()
            .chain(&self.force_tag)
            .chain(&self.exclude)
            .chain(self.symbol_transforms.iter().map(|t| &t.pattern))
            .chain(self.properties.iter().map(|p| &p.pattern));
        for pattern in patterns {
            if let Err(e) = Regex::new(pattern) {
                problems.push(format!("invalid regex '{pattern}': {e}"));
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConvertError::Configuration { problems })
        }
    }

    pub fn layout(&self, project: ProjectId) -> ProjectLayout {
        self.projects
            .get(project.0 as usize)
            .cloned()
            .unwrap_or_default()
    }
}
