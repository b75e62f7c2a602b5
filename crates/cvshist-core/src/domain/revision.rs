//! CVS revision numbers and revision records.
//!
//! A revision number is a dotted tuple of integers. Trunk revisions have two
//! components (`1.4`), branch revisions four or more (`1.4.2.1`). A branch
//! number has an odd number of components (`1.4.2`) and sprouts from the
//! revision obtained by dropping its last component. CVS stores branch
//! symbols with a "magic" zero (`1.4.0.2`), which [`SymbolTarget::parse`]
//! normalizes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::file::FileId;
use super::lod::Lod;

/// A revision or branch number could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed revision number '{0}'")]
pub struct ParseRevisionError(pub String);

/// Dotted revision or branch number. Ordering is component-wise.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RevisionNumber(Vec<u32>);

impl RevisionNumber {
    pub fn parse(raw: &str) -> Result<Self, ParseRevisionError> {
        let malformed = || ParseRevisionError(raw.to_string());
        let parts = raw
            .split('.')
            .map(|p| {
                if p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(malformed());
                }
                p.parse::<u32>().map_err(|_| malformed())
            })
            .collect::<Result<Vec<_>, _>>()?;
        if parts.len() < 2 {
            return Err(malformed());
        }
        Ok(Self(parts))
    }

    pub fn components(&self) -> &[u32] {
        &self.0
    }

    /// Revision numbers have an even number of components.
    pub fn is_revision(&self) -> bool {
        self.0.len() % 2 == 0
    }

    /// Branch numbers have an odd number of components.
    pub fn is_branch(&self) -> bool {
        self.0.len() % 2 == 1
    }

    pub fn is_trunk_revision(&self) -> bool {
        self.0.len() == 2
    }

    /// Branch number a revision lives on, or `None` for trunk revisions.
    pub fn branch_number(&self) -> Option<RevisionNumber> {
        if !self.is_revision() || self.is_trunk_revision() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Revision a branch number sprouts from.
    pub fn sprout_revision(&self) -> Option<RevisionNumber> {
        if !self.is_branch() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Three-component branch with an odd last component (`1.1.1`, `1.1.3`).
    pub fn is_vendor_branch(&self) -> bool {
        self.0.len() == 3 && self.0[2] % 2 == 1
    }

    /// `n`-th revision on this branch number.
    pub fn branch_revision(&self, n: u32) -> Option<RevisionNumber> {
        if !self.is_branch() {
            return None;
        }
        let mut parts = self.0.clone();
        parts.push(n);
        Some(Self(parts))
    }
}

impl FromStr for RevisionNumber {
    type Err = ParseRevisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RevisionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for part in &self.0 {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{part}")?;
            first = false;
        }
        Ok(())
    }
}

impl fmt::Debug for RevisionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{self}")
    }
}

impl Serialize for RevisionNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RevisionNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// What a symbolic name in a file's header points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "number", rename_all = "snake_case")]
pub enum SymbolTarget {
    /// A revision: the symbol is a tag in this file.
    Revision(RevisionNumber),
    /// A branch number: the symbol is a branch in this file.
    Branch(RevisionNumber),
}

impl SymbolTarget {
    /// Parse a header entry, folding magic branch numbers (`1.7.0.2` →
    /// branch `1.7.2`).
    pub fn parse(raw: &str) -> Result<Self, ParseRevisionError> {
        let number = RevisionNumber::parse(raw)?;
        let parts = number.components();
        let n = parts.len();
        if number.is_revision() {
            if n >= 4 && parts[n - 2] == 0 {
                let mut folded = parts[..n - 2].to_vec();
                folded.push(parts[n - 1]);
                return Ok(Self::Branch(RevisionNumber(folded)));
            }
            if parts.contains(&0) {
                return Err(ParseRevisionError(raw.to_string()));
            }
            Ok(Self::Revision(number))
        } else {
            Ok(Self::Branch(number))
        }
    }

    /// The revision the symbol sprouts from in this file.
    pub fn sprout(&self) -> Option<RevisionNumber> {
        match self {
            Self::Revision(r) => Some(r.clone()),
            Self::Branch(b) => b.sprout_revision(),
        }
    }
}

/// Content state of a revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevisionState {
    #[serde(alias = "Exp", alias = "exp")]
    Live,
    Dead,
}

impl RevisionState {
    pub fn is_dead(self) -> bool {
        self == Self::Dead
    }
}

/// What a revision does to its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileOp {
    Add,
    Modify,
    Delete,
}

impl FileOp {
    /// Operation of a revision given the state of its visible predecessor.
    ///
    /// Returns `None` for a delete of a file that does not exist, which has
    /// no effect and is not converted.
    pub fn derive(state: RevisionState, predecessor: Option<RevisionState>) -> Option<Self> {
        match (state, predecessor) {
            (RevisionState::Dead, Some(RevisionState::Live)) => Some(Self::Delete),
            (RevisionState::Dead, _) => None,
            (RevisionState::Live, None | Some(RevisionState::Dead)) => Some(Self::Add),
            (RevisionState::Live, Some(RevisionState::Live)) => Some(Self::Modify),
        }
    }
}

/// A revision record as delivered by a revision source.
///
/// Numbers are kept as strings so that malformed input can be reported by
/// the consistency guard rather than rejected by the parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRevision {
    pub number: String,
    #[serde(default)]
    pub parent: Option<String>,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    pub author: String,
    #[serde(default)]
    pub log: String,
    #[serde(default = "live")]
    pub state: RevisionState,
    #[serde(default)]
    pub content: Option<String>,
}

fn live() -> RevisionState {
    RevisionState::Live
}

impl SourceRevision {
    pub fn new(
        number: &str,
        parent: Option<&str>,
        timestamp: i64,
        author: &str,
        log: &str,
    ) -> Self {
        Self {
            number: number.to_string(),
            parent: parent.map(str::to_string),
            timestamp,
            author: author.to_string(),
            log: log.to_string(),
            state: RevisionState::Live,
            content: None,
        }
    }

    pub fn dead(mut self) -> Self {
        self.state = RevisionState::Dead;
        self
    }

    pub fn with_content(mut self, content: &str) -> Self {
        self.content = Some(content.to_string());
        self
    }
}

/// A validated revision, placed on its line of development.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub file: FileId,
    pub number: RevisionNumber,
    pub parent: Option<RevisionNumber>,
    pub lod: Lod,
    pub timestamp: i64,
    pub author: String,
    pub log: String,
    pub state: RevisionState,
    pub content: Option<String>,
    /// `None` for a delete that has no effect.
    pub op: Option<FileOp>,
    /// Revision on the file's vendor default branch.
    pub default_branch: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rev(s: &str) -> RevisionNumber {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(rev("1.4.2.1").to_string(), "1.4.2.1");
        assert!(RevisionNumber::parse("1").is_err());
        assert!(RevisionNumber::parse("1..2").is_err());
        assert!(RevisionNumber::parse("1.x").is_err());
        assert!(RevisionNumber::parse("").is_err());
    }

    #[test]
    fn test_ordering_is_numeric() {
        assert!(rev("1.9") < rev("1.10"));
        assert!(rev("1.2") < rev("1.2.2.1"));
    }

    #[test]
    fn test_branch_structure() {
        assert_eq!(rev("1.4.2.3").branch_number(), Some(rev("1.4.2")));
        assert_eq!(rev("1.4").branch_number(), None);
        assert_eq!(rev("1.4.2").sprout_revision(), Some(rev("1.4")));
        assert_eq!(rev("1.4.2").branch_revision(1), Some(rev("1.4.2.1")));
    }

    #[test]
    fn test_vendor_branch_predicate() {
        assert!(rev("1.1.1").is_vendor_branch());
        assert!(rev("1.1.3").is_vendor_branch());
        assert!(!rev("1.1.2").is_vendor_branch());
        assert!(!rev("1.1.1.2.1").is_vendor_branch());
    }

    #[test]
    fn test_magic_branch_folding() {
        assert_eq!(
            SymbolTarget::parse("1.7.0.2").unwrap(),
            SymbolTarget::Branch(rev("1.7.2"))
        );
        assert_eq!(
            SymbolTarget::parse("1.1.1").unwrap(),
            SymbolTarget::Branch(rev("1.1.1"))
        );
        assert_eq!(
            SymbolTarget::parse("1.3").unwrap(),
            SymbolTarget::Revision(rev("1.3"))
        );
        assert_eq!(SymbolTarget::parse("1.7.0.2").unwrap().sprout(), Some(rev("1.7")));
        assert!(SymbolTarget::parse("1.0.3.0").is_err());
    }

    #[test]
    fn test_file_op_derivation() {
        use RevisionState::*;
        assert_eq!(FileOp::derive(Live, None), Some(FileOp::Add));
        assert_eq!(FileOp::derive(Live, Some(Dead)), Some(FileOp::Add));
        assert_eq!(FileOp::derive(Live, Some(Live)), Some(FileOp::Modify));
        assert_eq!(FileOp::derive(Dead, Some(Live)), Some(FileOp::Delete));
        assert_eq!(FileOp::derive(Dead, None), None);
        assert_eq!(FileOp::derive(Dead, Some(Dead)), None);
    }

    #[test]
    fn test_revision_number_serializes_as_string() {
        let json = serde_json::to_string(&rev("1.2.2.1")).unwrap();
        assert_eq!(json, "\"1.2.2.1\"");
        let back: RevisionNumber = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rev("1.2.2.1"));
    }

    #[test]
    fn test_source_revision_defaults() {
        let r: SourceRevision =
            serde_json::from_str(r#"{"number":"1.1","timestamp":10,"author":"jo"}"#).unwrap();
        assert_eq!(r.state, RevisionState::Live);
        assert_eq!(r.parent, None);
        assert!(r.log.is_empty());
    }
}
