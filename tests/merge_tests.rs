//! Integration tests for revision-based snapshot merging.

use chrono::{DateTime, TimeZone, Utc};
use credvault::errors::CredVaultError;
use credvault::merge::{merge, MergeMode, Resolution};
use credvault::vault::{
    EntityKind, Folder, Item, ItemDraft, ItemKind, SecretValue, VaultSnapshot, VaultStore,
};

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn folder(id: &str, name: &str, revision: u64, secs: i64) -> Folder {
    Folder {
        id: id.into(),
        name: name.into(),
        revision,
        updated_at: at(secs),
        deleted: false,
    }
}

fn item(id: &str, folder_id: &str, name: &str, revision: u64, deleted: bool) -> Item {
    Item {
        id: id.into(),
        folder_id: folder_id.into(),
        name: name.into(),
        kind: ItemKind::Credential {
            username: Some("alice".into()),
            secret: Some(SecretValue::new(format!("pw-{revision}"))),
            url: None,
            custom_fields: vec![],
        },
        revision,
        updated_at: at(revision as i64 * 10),
        deleted,
    }
}

fn sample() -> VaultSnapshot {
    VaultSnapshot::new(
        vec![folder("F1", "Work", 2, 0), folder("F2", "Home", 1, 0)],
        vec![
            item("I1", "F1", "GitHub", 3, false),
            item("I2", "F2", "Bank", 1, false),
            item("I3", "F2", "Old router", 2, true),
        ],
    )
}

#[test]
fn merging_a_snapshot_with_itself_changes_nothing() {
    let s = sample();
    let out = merge(&s, &s, MergeMode::Merge);
    assert_eq!(out.merged, s);
    assert!(out.conflicts.is_empty());
}

#[test]
fn remerging_with_the_remote_does_not_oscillate() {
    let local = sample();
    let remote = VaultSnapshot::new(
        vec![folder("F1", "Work-renamed", 2, 30), folder("F3", "work", 1, 0)],
        vec![item("I1", "F1", "GitHub (old)", 2, false)],
    );

    let first = merge(&local, &remote, MergeMode::Merge);
    assert!(!first.conflicts.is_empty());

    let second = merge(&first.merged, &remote, MergeMode::Merge);
    assert_eq!(second.merged, first.merged);
    assert!(second.conflicts.is_empty());

    let third = merge(&second.merged, &local, MergeMode::Merge);
    assert_eq!(third.merged, first.merged);
}

#[test]
fn higher_revision_tombstone_beats_live_copy() {
    let local = VaultSnapshot::new(
        vec![folder("F1", "Work", 1, 0)],
        vec![item("I1", "F1", "GitHub", 2, false)],
    );
    let remote = VaultSnapshot::new(
        vec![folder("F1", "Work", 1, 0)],
        vec![item("I1", "F1", "GitHub", 3, true)],
    );

    let out = merge(&local, &remote, MergeMode::Merge);
    let merged = &out.merged.items[0];
    assert!(merged.deleted);
    assert_eq!(merged.revision, 3);
    assert!(out.conflicts.is_empty());
}

#[test]
fn edit_after_delete_restores_the_item() {
    let local = VaultSnapshot::new(
        vec![folder("F1", "Work", 1, 0)],
        vec![item("I1", "F1", "GitHub", 2, true)],
    );
    let remote = VaultSnapshot::new(
        vec![folder("F1", "Work", 1, 0)],
        vec![item("I1", "F1", "GitHub (recovered)", 3, false)],
    );

    let out = merge(&local, &remote, MergeMode::Merge);
    let merged = &out.merged.items[0];
    assert!(!merged.deleted);
    assert_eq!(merged.name, "GitHub (recovered)");
}

#[test]
fn equal_revision_rename_takes_later_update() {
    let local = VaultSnapshot::new(vec![folder("F1", "Work", 2, 0)], vec![]);
    let remote = VaultSnapshot::new(vec![folder("F1", "Work-renamed", 2, 60)], vec![]);

    let out = merge(&local, &remote, MergeMode::Merge);
    assert_eq!(out.merged.folders[0].name, "Work-renamed");

    assert_eq!(out.conflicts.len(), 1);
    let conflict = &out.conflicts[0];
    assert_eq!(conflict.entity_id, "F1");
    assert_eq!(conflict.entity_kind, EntityKind::Folder);
    assert_eq!(conflict.local_revision, Some(2));
    assert_eq!(conflict.remote_revision, Some(2));
    assert_eq!(conflict.resolution, Resolution::TookRemote);
}

#[test]
fn clashing_folder_names_are_suffixed_not_merged() {
    let local = VaultSnapshot::new(
        vec![folder("F1", "Personal", 2, 0)],
        vec![item("I1", "F1", "Mail", 1, false)],
    );
    let remote = VaultSnapshot::new(
        vec![folder("F2", "personal", 1, 0)],
        vec![item("I2", "F2", "Bank", 1, false)],
    );

    let out = merge(&local, &remote, MergeMode::Merge);
    let names: Vec<(&str, &str, u64)> = out
        .merged
        .folders
        .iter()
        .map(|f| (f.id.as_str(), f.name.as_str(), f.revision))
        .collect();
    assert_eq!(names, vec![("F1", "Personal", 2), ("F2", "personal (2)", 2)]);

    // Items keep pointing at their own folder.
    assert_eq!(out.merged.items[0].folder_id, "F1");
    assert_eq!(out.merged.items[1].folder_id, "F2");

    assert_eq!(out.conflicts.len(), 1);
    assert_eq!(
        out.conflicts[0].resolution,
        Resolution::Renamed {
            from: "personal".into(),
            to: "personal (2)".into()
        }
    );
}

#[test]
fn overwrite_discards_local_records() {
    let local = sample();
    let remote = VaultSnapshot::new(vec![folder("F9", "Archive", 1, 0)], vec![]);

    let out = merge(&local, &remote, MergeMode::Overwrite);
    assert_eq!(out.merged, remote);
    assert!(out.conflicts.is_empty());
}

#[test]
fn merged_snapshot_does_not_depend_on_side() {
    let a = VaultSnapshot::new(
        vec![folder("F1", "Work", 2, 0), folder("F2", "Shared", 1, 5)],
        vec![item("I1", "F1", "GitHub", 2, false)],
    );
    let b = VaultSnapshot::new(
        vec![folder("F1", "Office", 2, 9), folder("F3", "shared", 1, 5)],
        vec![item("I1", "F1", "GitHub", 2, true)],
    );

    let ab = merge(&a, &b, MergeMode::Merge);
    let ba = merge(&b, &a, MergeMode::Merge);
    assert_eq!(ab.merged, ba.merged);
    assert_eq!(ab.conflicts.len(), ba.conflicts.len());
}

#[test]
fn winners_match_regardless_of_grouping() {
    let a = VaultSnapshot::new(
        vec![folder("F1", "Work", 3, 0)],
        vec![item("I1", "F1", "a", 1, false), item("I2", "F1", "a", 5, false)],
    );
    let b = VaultSnapshot::new(
        vec![folder("F1", "Work", 1, 0)],
        vec![item("I1", "F1", "b", 4, true), item("I3", "F1", "b", 2, false)],
    );
    let c = VaultSnapshot::new(
        vec![folder("F1", "Work", 2, 0)],
        vec![item("I2", "F1", "c", 6, false), item("I3", "F1", "c", 7, false)],
    );

    let left = merge(&merge(&a, &b, MergeMode::Merge).merged, &c, MergeMode::Merge);
    let right = merge(&a, &merge(&b, &c, MergeMode::Merge).merged, MergeMode::Merge);
    assert_eq!(left.merged, right.merged);

    let winners: Vec<(&str, &str)> = left
        .merged
        .items
        .iter()
        .map(|i| (i.id.as_str(), i.name.as_str()))
        .collect();
    assert_eq!(winners, vec![("I1", "b"), ("I2", "c"), ("I3", "c")]);
}

#[test]
fn merge_of_two_diverged_stores_commits_cleanly() {
    let mut origin = VaultStore::new();
    let work = origin.create_folder("Work").unwrap();
    let shared = origin
        .add_item(ItemDraft {
            folder_id: work.id.clone(),
            name: "GitHub".into(),
            kind: ItemKind::Note { content: None },
        })
        .unwrap();
    let base = origin.export();

    // Device A deletes the item and creates "Shared".
    let mut device_a = VaultStore::from_snapshot(base.clone()).unwrap();
    device_a.create_folder("Shared").unwrap();
    device_a.delete_item(&shared.id).unwrap();

    // Device B also creates "Shared" and edits the item twice.
    let mut device_b = VaultStore::from_snapshot(base).unwrap();
    device_b.create_folder("shared").unwrap();
    let mut edit = device_b.item(&shared.id).unwrap().clone();
    edit.name = "GitHub (work)".into();
    let edit = device_b.update_item(edit).unwrap();
    device_b.update_item(edit).unwrap();

    let out = merge(&device_a.export(), &device_b.export(), MergeMode::Merge);
    device_a.commit(out.merged).unwrap();

    let names: Vec<String> = device_a.folders().iter().map(|f| f.name.to_lowercase()).collect();
    assert!(names.contains(&"shared".to_string()));
    assert!(names.contains(&"shared (2)".to_string()));

    let item = device_a.item(&shared.id).unwrap();
    assert_eq!(item.name, "GitHub (work)");
    assert_eq!(item.revision, 3);
}

#[test]
fn rename_bump_at_the_revision_limit_does_not_overflow() {
    let local = VaultSnapshot::new(vec![folder("F1", "Work", u64::MAX, 0)], vec![]);
    let remote = VaultSnapshot::new(vec![folder("F2", "work", u64::MAX, 10)], vec![]);

    // F2 is newer, so F1 takes the suffix and the bump.
    let out = merge(&local, &remote, MergeMode::Merge);
    let renamed = out.merged.folders.iter().find(|f| f.id == "F1").unwrap();
    assert_eq!(renamed.name, "Work (2)");
    assert_eq!(renamed.revision, u64::MAX);

    let mut store = VaultStore::new();
    store.create_folder("Home").unwrap();
    let before = store.export();
    assert!(matches!(
        store.commit(out.merged),
        Err(CredVaultError::Validation(_))
    ));
    assert_eq!(store.export(), before);
}
