//! Commit-window clustering.

use std::collections::{HashMap, HashSet};

use crate::domain::{ChangeSetItem, CvsFile, FileId, Lod, Revision};

use super::sequence::ChangeSetDraft;

struct Candidate<'a> {
    author: &'a str,
    log: &'a str,
    t_max: i64,
    files: HashSet<FileId>,
    items: Vec<ChangeSetItem>,
}

pub(crate) fn item_for(file: &CvsFile, revision: &Revision) -> Option<ChangeSetItem> {
    Some(ChangeSetItem {
        file: file.id,
        path: file.path.clone(),
        revision: revision.number.clone(),
        lod: revision.lod,
        op: revision.op?,
        content: revision.content.clone(),
        timestamp: revision.timestamp,
        grafted_from: None,
        mirror: false,
    })
}

/// Group revisions with the same author and log whose timestamps chain
/// within `window` seconds of the group's latest member.
///
/// With `per_lod`, each line of development clusters on its own and a
/// group never mixes LODs. A revision never joins a group that already
/// holds its file, nor one created before the group holding the file's
/// previous revision on the same key.
pub fn cluster(files: &[CvsFile], window: i64, per_lod: bool) -> Vec<ChangeSetDraft> {
    let mut revisions: Vec<(&CvsFile, &Revision)> = files
        .iter()
        .flat_map(|f| {
            f.revisions
                .iter()
                .filter(|r| r.op.is_some())
                .map(move |r| (f, r))
        })
        .collect();
    revisions.sort_by(|(fa, ra), (fb, rb)| {
        (ra.timestamp, &fa.path, &ra.number).cmp(&(rb.timestamp, &fb.path, &rb.number))
    });

    let mut candidates: Vec<Candidate<'_>> = Vec::new();
    let mut open: HashMap<(Option<Lod>, &str, &str), Vec<usize>> = HashMap::new();
    let mut latest_for_file: HashMap<(FileId, Option<Lod>), usize> = HashMap::new();

    for (file, revision) in revisions {
        let Some(item) = item_for(file, revision) else {
            continue;
        };
        let lod = per_lod.then_some(revision.lod);
        let floor = latest_for_file.get(&(file.id, lod)).copied();
        let groups = open
            .entry((lod, revision.author.as_str(), revision.log.as_str()))
            .or_default();
        groups.retain(|&g| revision.timestamp - candidates[g].t_max <= window);

        let chosen = groups.iter().copied().find(|&g| {
            floor.map_or(true, |f| g > f) && !candidates[g].files.contains(&file.id)
        });
        let index = match chosen {
            Some(g) => g,
            None => {
                candidates.push(Candidate {
                    author: &revision.author,
                    log: &revision.log,
                    t_max: revision.timestamp,
                    files: HashSet::new(),
                    items: Vec::new(),
                });
                let g = candidates.len() - 1;
                groups.push(g);
                g
            }
        };

        let candidate = &mut candidates[index];
        candidate.t_max = candidate.t_max.max(revision.timestamp);
        candidate.files.insert(file.id);
        candidate.items.push(item);
        latest_for_file.insert((file.id, lod), index);
    }

    candidates
        .into_iter()
        .map(|c| ChangeSetDraft {
            author: c.author.to_string(),
            log: c.log.to_string(),
            items: c.items,
        })
        .collect()
}
