//! Topological ordering of changesets and clock-skew correction.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};

use tracing::debug;

use crate::domain::{
    ChangeSet, ChangeSetId, ChangeSetItem, CvsFile, FileId, Lod, RevisionNumber,
};
use crate::{metrics, obs};

/// A changeset before ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSetDraft {
    pub author: String,
    pub log: String,
    pub items: Vec<ChangeSetItem>,
}

impl ChangeSetDraft {
    pub fn from_changeset(changeset: ChangeSet) -> Self {
        Self {
            author: changeset.author,
            log: changeset.log,
            items: changeset.items,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ItemKey {
    file: FileId,
    revision: RevisionNumber,
    mirror: bool,
}

impl ItemKey {
    fn of(item: &ChangeSetItem) -> Self {
        Self {
            file: item.file,
            revision: item.revision.clone(),
            mirror: item.mirror,
        }
    }

    fn native(file: FileId, revision: &RevisionNumber) -> Self {
        Self {
            file,
            revision: revision.clone(),
            mirror: false,
        }
    }
}

/// Items that must be emitted before `item`.
///
/// A native item waits for its nearest emitted ancestor. A trunk mirror
/// waits for its branch original and for the nearest revision already
/// visible on trunk.
fn dependencies(
    item: &ChangeSetItem,
    present: &HashSet<ItemKey>,
    files: &[CvsFile],
) -> Vec<ItemKey> {
    let Some(file) = files.get(item.file.0 as usize) else {
        return Vec::new();
    };
    let parent_of = |number: &RevisionNumber| file.revision(number).and_then(|r| r.parent.clone());

    let mut deps = Vec::new();
    let mut current = parent_of(&item.revision);
    if item.mirror {
        let native = ItemKey::native(item.file, &item.revision);
        if present.contains(&native) {
            deps.push(native);
        }
        while let Some(number) = current {
            let mirror = ItemKey {
                mirror: true,
                ..ItemKey::native(item.file, &number)
            };
            if present.contains(&mirror) {
                deps.push(mirror);
                break;
            }
            let native = ItemKey::native(item.file, &number);
            if number.is_trunk_revision() && present.contains(&native) {
                deps.push(native);
                break;
            }
            current = parent_of(&number);
        }
    } else {
        while let Some(number) = current {
            let native = ItemKey::native(item.file, &number);
            if present.contains(&native) {
                deps.push(native);
                break;
            }
            current = parent_of(&number);
        }
    }
    deps
}

struct Node {
    author: String,
    log: String,
    items: Vec<(ChangeSetItem, Vec<ItemKey>)>,
    blocked: usize,
}

type OrderKey = (i64, String, Lod, usize);

fn order_key(index: usize, items: &[(ChangeSetItem, Vec<ItemKey>)]) -> OrderKey {
    let t_max = items.iter().map(|(i, _)| i.timestamp).max().unwrap_or(0);
    let path = items
        .iter()
        .map(|(i, _)| i.path.as_str())
        .min()
        .unwrap_or("")
        .to_string();
    let lod = items
        .iter()
        .map(|(i, _)| i.lod)
        .min()
        .unwrap_or(Lod::Trunk(Default::default()));
    (t_max, path, lod, index)
}

/// Order drafts so every revision follows its predecessors, then correct
/// clock skew and number the result.
///
/// Among ready drafts the one with the smallest (latest timestamp, smallest
/// path, line of development, creation order) goes first. A dependency cycle
/// between drafts is broken by emitting the ready part of the smallest
/// blocked draft on its own.
pub fn sequence(drafts: Vec<ChangeSetDraft>, files: &[CvsFile]) -> Vec<ChangeSet> {
    let present: HashSet<ItemKey> = drafts
        .iter()
        .flat_map(|d| d.items.iter().map(ItemKey::of))
        .collect();
    let mut node_of: HashMap<ItemKey, usize> = HashMap::new();
    for (i, d) in drafts.iter().enumerate() {
        for item in &d.items {
            node_of.insert(ItemKey::of(item), i);
        }
    }

    let mut nodes: Vec<Option<Node>> = Vec::with_capacity(drafts.len());
    let mut waiting: HashMap<ItemKey, Vec<usize>> = HashMap::new();
    for (i, d) in drafts.into_iter().enumerate() {
        let mut blocked = 0;
        let mut items = Vec::with_capacity(d.items.len());
        for item in d.items {
            let deps: Vec<ItemKey> = dependencies(&item, &present, files)
                .into_iter()
                .filter(|k| node_of.get(k) != Some(&i))
                .collect();
            for dep in &deps {
                blocked += 1;
                waiting.entry(dep.clone()).or_default().push(i);
            }
            items.push((item, deps));
        }
        nodes.push(Some(Node {
            author: d.author,
            log: d.log,
            items,
            blocked,
        }));
    }

    let mut heap: BinaryHeap<Reverse<OrderKey>> = nodes
        .iter()
        .enumerate()
        .filter_map(|(i, n)| n.as_ref().filter(|n| n.blocked == 0).map(|n| Reverse(order_key(i, &n.items))))
        .collect();
    let mut emitted_keys: HashSet<ItemKey> = HashSet::new();
    let mut ordered: Vec<ChangeSetDraft> = Vec::new();
    let mut remaining = nodes.len();

    let mut release = |items: &[(ChangeSetItem, Vec<ItemKey>)],
                       nodes: &mut Vec<Option<Node>>,
                       heap: &mut BinaryHeap<Reverse<OrderKey>>,
                       emitted_keys: &mut HashSet<ItemKey>| {
        for (item, _) in items {
            let key = ItemKey::of(item);
            for j in waiting.remove(&key).unwrap_or_default() {
                if let Some(node) = nodes[j].as_mut() {
                    node.blocked -= 1;
                    if node.blocked == 0 {
                        heap.push(Reverse(order_key(j, &node.items)));
                    }
                }
            }
            emitted_keys.insert(key);
        }
    };

    while remaining > 0 {
        if let Some(Reverse((_, _, _, index))) = heap.pop() {
            let Some(node) = nodes[index].take() else {
                continue;
            };
            remaining -= 1;
            release(&node.items, &mut nodes, &mut heap, &mut emitted_keys);
            ordered.push(ChangeSetDraft {
                author: node.author,
                log: node.log,
                items: node.items.into_iter().map(|(item, _)| item).collect(),
            });
            continue;
        }

        // Every remaining node is blocked: split the smallest one that has
        // a ready item.
        let pick = nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|n| (i, n)))
            .filter(|(_, n)| {
                n.items
                    .iter()
                    .any(|(_, deps)| deps.iter().all(|d| emitted_keys.contains(d)))
            })
            .map(|(i, n)| order_key(i, &n.items))
            .min();
        let Some((_, _, _, index)) = pick else {
            break;
        };
        let Some(node) = nodes[index].as_mut() else {
            break;
        };
        let (ready, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut node.items)
            .into_iter()
            .partition(|(_, deps)| deps.iter().all(|d| emitted_keys.contains(d)));
        node.items = rest;
        let author = node.author.clone();
        let log = node.log.clone();
        debug!(
            author = %author,
            split_items = ready.len(),
            "changeset dependency cycle broken by splitting"
        );
        release(&ready, &mut nodes, &mut heap, &mut emitted_keys);
        ordered.push(ChangeSetDraft {
            author,
            log,
            items: ready.into_iter().map(|(item, _)| item).collect(),
        });
    }

    correct_clock_skew(ordered)
}

/// Clamp timestamps that regress on a line of development and assign ids.
fn correct_clock_skew(ordered: Vec<ChangeSetDraft>) -> Vec<ChangeSet> {
    let mut last: HashMap<Lod, i64> = HashMap::new();
    let mut out = Vec::with_capacity(ordered.len());

    for (n, mut draft) in ordered.into_iter().enumerate() {
        draft.items.sort_by(|a, b| (&a.path, a.lod, a.mirror).cmp(&(&b.path, b.lod, b.mirror)));
        let original = draft.items.iter().map(|i| i.timestamp).max().unwrap_or(0);
        let lods: BTreeSet<Lod> = draft.items.iter().map(|i| i.lod).collect();
        let previous = lods.iter().filter_map(|l| last.get(l)).copied().max();

        let timestamp = match previous {
            Some(p) if original < p => p + 1,
            _ => original,
        };
        let id = ChangeSetId(n as u32 + 1);
        if timestamp != original {
            metrics::METRICS.inc_timestamps_clamped();
            obs::emit_timestamp_clamped(id.0, original, timestamp);
        }
        for lod in lods {
            last.insert(lod, timestamp);
        }
        out.push(ChangeSet {
            id,
            author: draft.author,
            log: draft.log,
            timestamp,
            original_timestamp: original,
            items: draft.items,
        });
    }
    out
}
