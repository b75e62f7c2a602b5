//! Parent resolution: turns the observed-parent multigraph into an acyclic
//! LOD tree.
//!
//! Each symbol ranks its candidate parents (weight descending, then the
//! candidate's earliest sprout, then name, trunk first) and tentatively
//! takes the best one. Cycles in the resulting symbol→parent graph are
//! broken by demoting the weakest edge of the first cycle found to that
//! child's next candidate, until the graph is a tree.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::domain::{
    ConvertError, CorruptionIssue, Lod, LodNode, LodTree, ProjectId, Result, SymbolId, SymbolKind, SymbolTable,
};
use crate::vendor::GraftPlan;
use crate::{metrics, obs};

use super::classifier::SymbolKinds;
use super::collator::SymbolStatistics;
use super::hints::{ParentHint, SymbolHints};

/// One cycle-breaking step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demotion {
    pub symbol: SymbolId,
    pub from: Lod,
    pub to: Lod,
    /// Weight of the abandoned edge.
    pub weight: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub tree: LodTree,
    pub demotions: Vec<Demotion>,
}

#[derive(Debug, Clone)]
struct PreferenceNode {
    name: String,
    project: ProjectId,
    kind: SymbolKind,
    earliest_sprout: i64,
    latest_sprout: i64,
    /// Unranked `(candidate, weight)` pairs.
    candidates: Vec<(Lod, u32)>,
}

/// Candidate parents of every non-excluded symbol.
#[derive(Debug, Clone, Default)]
pub struct PreferenceGraph {
    nodes: BTreeMap<SymbolId, PreferenceNode>,
}

impl PreferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_symbol(
        &mut self,
        symbol: SymbolId,
        name: &str,
        project: ProjectId,
        kind: SymbolKind,
        sprouts: (i64, i64),
        candidates: Vec<(Lod, u32)>,
    ) {
        self.nodes.insert(
            symbol,
            PreferenceNode {
                name: name.to_string(),
                project,
                kind,
                earliest_sprout: sprouts.0,
                latest_sprout: sprouts.1,
                candidates,
            },
        );
    }

    /// Candidates of `symbol`, best first. Only trunk and branch nodes other
    /// than the symbol itself qualify.
    fn ranked(&self, symbol: SymbolId) -> Vec<(Lod, u32)> {
        let Some(node) = self.nodes.get(&symbol) else {
            return Vec::new();
        };
        let mut ranked: Vec<(Lod, u32, i64, &str)> = node
            .candidates
            .iter()
            .filter_map(|&(lod, weight)| match lod {
                Lod::Trunk(_) => Some((lod, weight, i64::MIN, "")),
                Lod::Branch(id) if id == symbol => None,
                Lod::Branch(id) => self
                    .nodes
                    .get(&id)
                    .filter(|n| n.kind == SymbolKind::Branch)
                    .map(|n| (lod, weight, n.earliest_sprout, n.name.as_str())),
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.1.cmp(&a.1)
                .then(a.2.cmp(&b.2))
                .then(a.3.cmp(b.3))
                .then(a.0.cmp(&b.0))
        });
        ranked.into_iter().map(|(lod, w, _, _)| (lod, w)).collect()
    }

    /// Resolve to a tree, breaking cycles.
    pub fn resolve(&self) -> Resolution {
        let ranked: BTreeMap<SymbolId, Vec<(Lod, u32)>> =
            self.nodes.keys().map(|&s| (s, self.ranked(s))).collect();
        let mut choice: BTreeMap<SymbolId, usize> = self.nodes.keys().map(|&s| (s, 0)).collect();
        let mut by_name: Vec<SymbolId> = self.nodes.keys().copied().collect();
        by_name.sort_by(|a, b| self.nodes[a].name.cmp(&self.nodes[b].name).then(a.cmp(b)));

        let parent_of = |choice: &BTreeMap<SymbolId, usize>, symbol: SymbolId| -> Option<(Lod, u32)> {
            ranked
                .get(&symbol)
                .and_then(|list| list.get(choice[&symbol]).copied())
        };

        let mut demotions = Vec::new();
        while let Some(cycle) = find_cycle(&by_name, |s| parent_of(&choice, s).map(|(l, _)| l)) {
            // Weakest edge; ties go to the smallest child name.
            let Some(&victim) = cycle.iter().min_by(|a, b| {
                let wa = parent_of(&choice, **a).map_or(0, |(_, w)| w);
                let wb = parent_of(&choice, **b).map_or(0, |(_, w)| w);
                wa.cmp(&wb)
                    .then(self.nodes[*a].name.cmp(&self.nodes[*b].name))
            }) else {
                break;
            };
            let Some((from, weight)) = parent_of(&choice, victim) else {
                break;
            };
            if let Some(c) = choice.get_mut(&victim) {
                *c += 1;
            }
            let to = parent_of(&choice, victim)
                .map(|(l, _)| l)
                .unwrap_or(Lod::Trunk(self.nodes[&victim].project));
            let cycle_names: Vec<&str> = cycle.iter().map(|s| self.nodes[s].name.as_str()).collect();
            obs::emit_cycle_broken(&self.nodes[&victim].name, &cycle_names, weight);
            metrics::METRICS.inc_cycles_broken();
            demotions.push(Demotion {
                symbol: victim,
                from,
                to,
                weight,
            });
        }

        let nodes = self
            .nodes
            .iter()
            .map(|(&symbol, node)| {
                let (parent, weight, fallback) = match parent_of(&choice, symbol) {
                    Some((lod, weight)) => (lod, weight, false),
                    None => (Lod::Trunk(node.project), 0, true),
                };
                if fallback {
                    warn!(
                        symbol = %node.name,
                        sprout_time = node.latest_sprout,
                        "no usable parent; attaching to trunk"
                    );
                }
                LodNode {
                    symbol,
                    project: node.project,
                    kind: node.kind,
                    parent,
                    weight,
                    fallback,
                    sprout_time: node.latest_sprout,
                }
            })
            .collect();

        Resolution {
            tree: LodTree::new(nodes),
            demotions,
        }
    }
}

/// First cycle of the functional graph `parent`, visiting roots in `order`.
fn find_cycle(
    order: &[SymbolId],
    parent: impl Fn(SymbolId) -> Option<Lod>,
) -> Option<Vec<SymbolId>> {
    let mut done: BTreeSet<SymbolId> = BTreeSet::new();
    for &start in order {
        if done.contains(&start) {
            continue;
        }
        let mut path: Vec<SymbolId> = Vec::new();
        let mut on_path: BTreeSet<SymbolId> = BTreeSet::new();
        let mut current = Some(start);
        while let Some(symbol) = current {
            if done.contains(&symbol) {
                break;
            }
            if on_path.contains(&symbol) {
                let pos = path.iter().position(|&s| s == symbol).unwrap_or(0);
                return Some(path[pos..].to_vec());
            }
            path.push(symbol);
            on_path.insert(symbol);
            current = match parent(symbol) {
                Some(Lod::Branch(p)) => Some(p),
                _ => None,
            };
        }
        done.extend(path);
    }
    None
}

pub struct SymbolParentResolver<'a> {
    stats: &'a SymbolStatistics,
    kinds: &'a SymbolKinds,
    hints: &'a SymbolHints,
    symbols: &'a SymbolTable,
    plan: &'a GraftPlan,
}

impl<'a> SymbolParentResolver<'a> {
    pub fn new(
        stats: &'a SymbolStatistics,
        kinds: &'a SymbolKinds,
        hints: &'a SymbolHints,
        symbols: &'a SymbolTable,
        plan: &'a GraftPlan,
    ) -> Self {
        Self {
            stats,
            kinds,
            hints,
            symbols,
            plan,
        }
    }

    /// Build the preference graph, applying graft propagation and parent
    /// hints.
    pub fn preference_graph(&self) -> Result<PreferenceGraph> {
        let mut graph = PreferenceGraph::new();
        let mut problems = Vec::new();

        for s in self.stats.iter() {
            let Some(kind) = self.kinds.kind(s.symbol) else {
                continue;
            };
            if kind == SymbolKind::Excluded {
                continue;
            }
            let trunk = Lod::Trunk(s.project);

            let mut candidates: BTreeMap<Lod, u32> = BTreeMap::new();
            for c in &s.candidates {
                match c.lod {
                    Lod::Trunk(_) => *candidates.entry(c.lod).or_default() += c.weight,
                    Lod::Branch(b) => match self.kinds.kind(b) {
                        Some(SymbolKind::Branch) => {
                            *candidates.entry(c.lod).or_default() += c.weight
                        }
                        Some(SymbolKind::Excluded) if self.plan.is_grafted(b) => {
                            if c.graftable > 0 {
                                *candidates.entry(trunk).or_default() += c.graftable;
                            }
                        }
                        _ => {}
                    },
                }
            }

            if let Some(parent) = self
                .hints
                .lookup(s.project, &s.name)
                .and_then(|h| h.parent.as_ref())
            {
                let hinted = match parent {
                    ParentHint::Trunk => Some(trunk),
                    ParentHint::Symbol(name) => match self.symbols.find(s.project, name) {
                        Some(p) if self.kinds.kind(p.id) == Some(SymbolKind::Branch) => {
                            Some(Lod::Branch(p.id))
                        }
                        _ => {
                            problems.push(format!(
                                "parent hint for '{}' names '{name}', which is not a branch",
                                s.name
                            ));
                            None
                        }
                    },
                };
                if let Some(lod) = hinted {
                    let weight = candidates.get(&lod).copied().unwrap_or(0);
                    candidates = BTreeMap::from([(lod, weight)]);
                }
            }

            graph.add_symbol(
                s.symbol,
                &s.name,
                s.project,
                kind,
                (
                    s.earliest_sprout.unwrap_or(0),
                    s.latest_sprout.unwrap_or(0),
                ),
                candidates.into_iter().collect(),
            );
        }

        if problems.is_empty() {
            Ok(graph)
        } else {
            Err(ConvertError::Configuration { problems })
        }
    }

    pub fn resolve(&self) -> Result<Resolution> {
        let resolution = self.preference_graph()?.resolve();
        if let Err(bad) = resolution.tree.validate() {
            let names: Vec<String> = bad.iter().map(|s| self.symbols.name(*s).to_string()).collect();
            return Err(ConvertError::Corruption {
                issues: vec![CorruptionIssue::new(
                    "",
                    format!("symbols do not reach trunk: {}", names.join(", ")),
                )],
            });
        }
        info!(
            symbols = resolution.tree.nodes().len(),
            demotions = resolution.demotions.len(),
            "symbol parents resolved"
        );
        Ok(resolution)
    }
}
