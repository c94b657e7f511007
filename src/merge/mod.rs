//! Revision-based reconciliation of two vault snapshots.
//!
//! `merge` combines a local snapshot with a remote (or backup file)
//! snapshot record by record, keyed by id.  It never drops data
//! silently: every equal-revision disagreement and every forced folder
//! rename shows up in the conflict report.
//!
//! The result is deterministic.  Merging a snapshot with itself returns
//! it unchanged with no conflicts, and merging the result with either
//! input again changes nothing.

pub mod conflict;

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::{debug, info};

use crate::vault::model::{name_key, unique_name, Entity, Folder, VaultSnapshot};

pub use conflict::{resolve, ConflictRecord, Resolution, Winner};

/// How a restored snapshot is combined with the local vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeMode {
    /// The remote snapshot replaces the local vault.
    Overwrite,
    /// Record-by-record merge using revisions.
    #[default]
    Merge,
}

impl std::str::FromStr for MergeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "overwrite" => Ok(Self::Overwrite),
            "merge" => Ok(Self::Merge),
            other => Err(format!(
                "unknown merge mode '{other}' — use 'merge' or 'overwrite'"
            )),
        }
    }
}

/// The merged snapshot plus everything the user should be told about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub merged: VaultSnapshot,
    pub conflicts: Vec<ConflictRecord>,
}

impl MergeOutcome {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// Reconcile `local` with `remote`.
pub fn merge(local: &VaultSnapshot, remote: &VaultSnapshot, mode: MergeMode) -> MergeOutcome {
    if mode == MergeMode::Overwrite {
        info!("merge in overwrite mode: remote snapshot wins");
        return MergeOutcome {
            merged: VaultSnapshot::new(remote.folders.clone(), remote.items.clone()),
            conflicts: Vec::new(),
        };
    }

    let mut conflicts = Vec::new();
    let folders = merge_records(&local.folders, &remote.folders, &mut conflicts);
    let items = merge_records(&local.items, &remote.items, &mut conflicts);
    let folders = disambiguate_folder_names(folders, local, remote, &mut conflicts);

    let merged = VaultSnapshot::new(folders, items);
    info!(
        folders = merged.folders.len(),
        items = merged.items.len(),
        conflicts = conflicts.len(),
        "snapshots merged"
    );
    MergeOutcome { merged, conflicts }
}

/// Per-id merge of one record type, visited in id order.
fn merge_records<E: Entity>(
    local: &[E],
    remote: &[E],
    conflicts: &mut Vec<ConflictRecord>,
) -> Vec<E> {
    let local_by_id: BTreeMap<&str, &E> = local.iter().map(|e| (e.id(), e)).collect();
    let remote_by_id: BTreeMap<&str, &E> = remote.iter().map(|e| (e.id(), e)).collect();
    let ids: BTreeSet<&str> = local_by_id
        .keys()
        .chain(remote_by_id.keys())
        .copied()
        .collect();

    let mut merged = Vec::with_capacity(ids.len());
    for id in ids {
        let chosen = match (local_by_id.get(id), remote_by_id.get(id)) {
            (Some(l), None) => (*l).clone(),
            (None, Some(r)) => (*r).clone(),
            (Some(l), Some(r)) => {
                let (winner, conflicted) = resolve(*l, *r);
                if conflicted {
                    let resolution = match winner {
                        Winner::Local => Resolution::KeptLocal,
                        Winner::Remote => Resolution::TookRemote,
                    };
                    debug!(id, kind = %E::KIND, ?resolution, "equal-revision conflict");
                    conflicts.push(ConflictRecord {
                        entity_id: id.to_string(),
                        entity_kind: E::KIND,
                        local_revision: Some(l.revision()),
                        remote_revision: Some(r.revision()),
                        resolution,
                    });
                }
                match winner {
                    Winner::Local => (*l).clone(),
                    Winner::Remote => (*r).clone(),
                }
            }
            (None, None) => continue,
        };
        merged.push(chosen);
    }
    merged
}

/// Give every live folder a unique (case-insensitive) name.
///
/// In each clashing group the folder with the highest revision keeps
/// its name (ties: later `updated_at`, then smaller id).  The others get
/// a " (n)" suffix and a revision bump so the rename propagates.
fn disambiguate_folder_names(
    mut folders: Vec<Folder>,
    local: &VaultSnapshot,
    remote: &VaultSnapshot,
    conflicts: &mut Vec<ConflictRecord>,
) -> Vec<Folder> {
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (idx, folder) in folders.iter().enumerate().filter(|(_, f)| !f.deleted) {
        groups.entry(name_key(&folder.name)).or_default().push(idx);
    }
    if groups.values().all(|g| g.len() < 2) {
        return folders;
    }

    let mut taken: HashSet<String> = groups.keys().cloned().collect();
    for mut group in groups.into_values().filter(|g| g.len() > 1) {
        group.sort_by(|&a, &b| {
            let (fa, fb) = (&folders[a], &folders[b]);
            fb.revision
                .cmp(&fa.revision)
                .then_with(|| fb.updated_at.cmp(&fa.updated_at))
                .then_with(|| fa.id.cmp(&fb.id))
        });

        for &idx in &group[1..] {
            let folder = &mut folders[idx];
            let renamed = unique_name(&folder.name, &taken);
            taken.insert(name_key(&renamed));

            debug!(id = %folder.id, from = %folder.name, to = %renamed, "folder renamed to avoid clash");
            conflicts.push(ConflictRecord {
                entity_id: folder.id.clone(),
                entity_kind: Folder::KIND,
                local_revision: revision_of(&local.folders, &folder.id),
                remote_revision: revision_of(&remote.folders, &folder.id),
                resolution: Resolution::Renamed {
                    from: folder.name.clone(),
                    to: renamed.clone(),
                },
            });

            folder.name = renamed;
            folder.revision = folder.revision.saturating_add(1);
        }
    }
    folders
}

fn revision_of(folders: &[Folder], id: &str) -> Option<u64> {
    folders.iter().find(|f| f.id == id).map(|f| f.revision)
}
