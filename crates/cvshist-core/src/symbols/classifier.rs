//! Symbol classification: branch, tag or excluded.
//!
//! Precedence, highest first:
//!
//! 1. exclusion (hint or `exclude` pattern)
//! 2. forced kind (hint, `force_branch` or `force_tag` pattern)
//! 3. trunk-only mode and trivial vendor imports
//! 4. unambiguous usage
//! 5. the default policy for ambiguous symbols

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ConversionOptions, SymbolDefault};
use crate::domain::{AmbiguousSymbol, ConvertError, Result, SymbolId, SymbolKind};

use super::collator::{SymbolStatistics, SymbolStats};
use super::hints::{HintConversion, SymbolHints};

/// Why a symbol got its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    Hint,
    ExcludePattern,
    ForceBranchPattern,
    ForceTagPattern,
    TrunkOnly,
    TrivialImport,
    Unambiguous,
    Policy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolDecision {
    pub symbol: SymbolId,
    pub kind: SymbolKind,
    pub reason: DecisionReason,
}

/// Decisions for every symbol, indexed by [`SymbolId`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolKinds {
    decisions: Vec<SymbolDecision>,
}

impl SymbolKinds {
    pub fn new(mut decisions: Vec<SymbolDecision>) -> Self {
        decisions.sort_by_key(|d| d.symbol);
        Self { decisions }
    }

    pub fn kind(&self, symbol: SymbolId) -> Option<SymbolKind> {
        self.decision(symbol).map(|d| d.kind)
    }

    pub fn decision(&self, symbol: SymbolId) -> Option<&SymbolDecision> {
        self.decisions
            .binary_search_by_key(&symbol, |d| d.symbol)
            .ok()
            .map(|i| &self.decisions[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &SymbolDecision> {
        self.decisions.iter()
    }

    pub fn is_excluded(&self, symbol: SymbolId) -> bool {
        self.kind(symbol) == Some(SymbolKind::Excluded)
    }
}

/// Compiled whole-name patterns.
#[derive(Debug, Clone, Default)]
pub struct SymbolRules {
    force_branch: Vec<Regex>,
    force_tag: Vec<Regex>,
    exclude: Vec<Regex>,
}

fn compile_all(patterns: &[String], problems: &mut Vec<String>) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(&format!("^(?:{p})$")) {
            Ok(re) => Some(re),
            Err(e) => {
                problems.push(format!("invalid regex '{p}': {e}"));
                None
            }
        })
        .collect()
}

impl SymbolRules {
    pub fn compile(options: &ConversionOptions) -> Result<Self> {
        let mut problems = Vec::new();
        let rules = Self {
            force_branch: compile_all(&options.force_branch, &mut problems),
            force_tag: compile_all(&options.force_tag, &mut problems),
            exclude: compile_all(&options.exclude, &mut problems),
        };
        if problems.is_empty() {
            Ok(rules)
        } else {
            Err(ConvertError::Configuration { problems })
        }
    }

    fn matches(patterns: &[Regex], name: &str) -> bool {
        patterns.iter().any(|re| re.is_match(name))
    }
}

pub struct SymbolClassifier<'a> {
    rules: SymbolRules,
    hints: &'a SymbolHints,
    policy: SymbolDefault,
    trunk_only: bool,
    keep_trivial_imports: bool,
}

impl<'a> SymbolClassifier<'a> {
    pub fn new(options: &ConversionOptions, hints: &'a SymbolHints) -> Result<Self> {
        Ok(Self {
            rules: SymbolRules::compile(options)?,
            hints,
            policy: options.symbol_default,
            trunk_only: options.trunk_only,
            keep_trivial_imports: options.keep_trivial_imports,
        })
    }

    /// Classify every symbol. Configuration problems are reported before
    /// ambiguities; each error lists every offending symbol.
    pub fn classify(&self, stats: &SymbolStatistics) -> Result<SymbolKinds> {
        let mut decisions = Vec::with_capacity(stats.len());
        let mut problems = Vec::new();
        let mut ambiguous = Vec::new();

        for s in stats.iter() {
            match self.decide(s, &mut problems) {
                Some((kind, reason)) => {
                    if kind == SymbolKind::Tag && s.usage.commit_count > 0 {
                        problems.push(format!(
                            "'{}' cannot be converted as a tag because it has commits in {} files",
                            s.name, s.usage.commit_count
                        ));
                    }
                    debug!(symbol = %s.name, kind = %kind, reason = ?reason, "symbol classified");
                    decisions.push(SymbolDecision {
                        symbol: s.symbol,
                        kind,
                        reason,
                    });
                }
                None => ambiguous.push(AmbiguousSymbol {
                    name: s.name.clone(),
                    tag_count: s.usage.tag_count,
                    branch_count: s.usage.branch_count,
                    commit_count: s.usage.commit_count,
                }),
            }
        }

        if !problems.is_empty() {
            return Err(ConvertError::Configuration { problems });
        }
        if !ambiguous.is_empty() {
            ambiguous.sort_by(|a, b| a.name.cmp(&b.name));
            return Err(ConvertError::Ambiguity { symbols: ambiguous });
        }
        Ok(SymbolKinds::new(decisions))
    }

    /// `None` when the strict policy refuses to decide.
    fn decide(
        &self,
        s: &SymbolStats,
        problems: &mut Vec<String>,
    ) -> Option<(SymbolKind, DecisionReason)> {
        let hint = self
            .hints
            .lookup(s.project, &s.name)
            .and_then(|h| h.conversion);

        if hint == Some(HintConversion::Exclude) {
            return Some((SymbolKind::Excluded, DecisionReason::Hint));
        }
        if SymbolRules::matches(&self.rules.exclude, &s.name) {
            return Some((SymbolKind::Excluded, DecisionReason::ExcludePattern));
        }

        match hint {
            Some(HintConversion::Branch) => return Some((SymbolKind::Branch, DecisionReason::Hint)),
            Some(HintConversion::Tag) => return Some((SymbolKind::Tag, DecisionReason::Hint)),
            _ => {}
        }
        let force_branch = SymbolRules::matches(&self.rules.force_branch, &s.name);
        let force_tag = SymbolRules::matches(&self.rules.force_tag, &s.name);
        match (force_branch, force_tag) {
            (true, true) => {
                problems.push(format!(
                    "'{}' matches both a force-branch and a force-tag pattern",
                    s.name
                ));
                return Some((SymbolKind::Branch, DecisionReason::ForceBranchPattern));
            }
            (true, false) => return Some((SymbolKind::Branch, DecisionReason::ForceBranchPattern)),
            (false, true) => return Some((SymbolKind::Tag, DecisionReason::ForceTagPattern)),
            (false, false) => {}
        }

        if self.trunk_only {
            return Some((SymbolKind::Excluded, DecisionReason::TrunkOnly));
        }
        if !self.keep_trivial_imports && s.is_trivial_import() {
            return Some((SymbolKind::Excluded, DecisionReason::TrivialImport));
        }

        if !s.is_ambiguous() {
            let kind = if s.usage.branch_count > 0 {
                SymbolKind::Branch
            } else {
                SymbolKind::Tag
            };
            return Some((kind, DecisionReason::Unambiguous));
        }

        let kind = match self.policy {
            SymbolDefault::Strict => return None,
            SymbolDefault::Branch => SymbolKind::Branch,
            SymbolDefault::Tag => SymbolKind::Tag,
            SymbolDefault::Heuristic => {
                if s.usage.commit_count > 0 || s.usage.branch_count >= s.usage.tag_count {
                    SymbolKind::Branch
                } else {
                    SymbolKind::Tag
                }
            }
        };
        Some((kind, DecisionReason::Policy))
    }
}
