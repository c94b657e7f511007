//! Revision-based resolution of two copies of the same record.

use std::cmp::Ordering;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::vault::model::{Entity, EntityKind};

/// How a conflict was settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    /// The local copy won; the remote copy was discarded.
    KeptLocal,
    /// The remote copy won; the local copy was discarded.
    TookRemote,
    /// A folder kept its id but was given a new display name because
    /// another folder already used the name.
    Renamed { from: String, to: String },
}

/// One entry of the conflict report returned by a merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictRecord {
    pub entity_id: String,
    pub entity_kind: EntityKind,
    /// Revision of the local copy, if there was one.
    pub local_revision: Option<u64>,
    /// Revision of the remote copy, if there was one.
    pub remote_revision: Option<u64>,
    pub resolution: Resolution,
}

/// Which side supplies the merged record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Local,
    Remote,
}

/// Decide between two copies of the same id.
///
/// Rules, in order:
/// 1. Identical copies: keep local, no conflict.
/// 2. Higher `revision` wins, no conflict.  A tombstone is just another
///    revision, so deleting after an edit and editing after a delete both
///    fall out of this rule.
/// 3. Equal revision with different content is a conflict: later
///    `updated_at` wins, then a live copy beats a tombstone, then the
///    larger content fingerprint wins.
///
/// Returns the winner and whether the pair was a true conflict.  The
/// outcome does not depend on which copy is called local.
pub fn resolve<E: Entity>(local: &E, remote: &E) -> (Winner, bool) {
    if local == remote {
        return (Winner::Local, false);
    }

    match local.revision().cmp(&remote.revision()) {
        Ordering::Greater => return (Winner::Local, false),
        Ordering::Less => return (Winner::Remote, false),
        Ordering::Equal => {}
    }

    let order = local
        .updated_at()
        .cmp(&remote.updated_at())
        // `false < true`, so reversing makes the live copy the greater one.
        .then_with(|| remote.is_deleted().cmp(&local.is_deleted()))
        .then_with(|| fingerprint(local).cmp(&fingerprint(remote)));

    let winner = match order {
        Ordering::Less => Winner::Remote,
        Ordering::Greater | Ordering::Equal => Winner::Local,
    };
    (winner, true)
}

/// SHA-256 of the record's JSON form.
fn fingerprint<E: Entity>(entity: &E) -> [u8; 32] {
    let bytes = serde_json::to_vec(entity).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}
