//! Folder, Item and VaultSnapshot: the records a vault holds.
//!
//! Every record carries a `revision` counter, an `updated_at` timestamp
//! and a `deleted` tombstone flag.  Those three fields are all the
//! merge engine needs to reconcile two copies of the same record.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::errors::{CredVaultError, Result};

/// Version of the snapshot structure inside the encrypted blob.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Reserved id of the folder that receives orphaned items.
pub const DEFAULT_FOLDER_ID: &str = "ungrouped";

/// Display name of the default folder.
pub const DEFAULT_FOLDER_NAME: &str = "Ungrouped";

/// Highest revision a stored record may carry.
pub const MAX_REVISION: u64 = i64::MAX as u64;

/// Which kind of record an id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Folder,
    Item,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Folder => f.write_str("folder"),
            Self::Item => f.write_str("item"),
        }
    }
}

/// A named group of items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: String,
    pub name: String,
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted: bool,
}

/// A password or other secret string.
///
/// Zeroed on drop and never shown by `Debug`.  Serialized as a plain
/// string because it only ever travels inside an encrypted snapshot.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretValue([REDACTED])")
    }
}

/// A free-form label/value pair attached to a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomField {
    pub label: String,
    pub value: String,
}

/// The type-specific part of an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemKind {
    Credential {
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        secret: Option<SecretValue>,
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        custom_fields: Vec<CustomField>,
    },
    Note {
        #[serde(default)]
        content: Option<String>,
    },
}

impl ItemKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Credential { .. } => "credential",
            Self::Note { .. } => "note",
        }
    }
}

/// A credential or secure note stored in a folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub folder_id: String,
    pub name: String,
    pub kind: ItemKind,
    pub revision: u64,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted: bool,
}

/// The user-supplied fields of a new item; the store assigns the rest.
#[derive(Debug, Clone)]
pub struct ItemDraft {
    pub folder_id: String,
    pub name: String,
    pub kind: ItemKind,
}

/// Immutable full copy of a vault's contents.
///
/// Folders and items are kept sorted by id so the serialized form is
/// canonical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSnapshot {
    pub format_version: u32,
    pub folders: Vec<Folder>,
    pub items: Vec<Item>,
}

impl VaultSnapshot {
    pub fn new(mut folders: Vec<Folder>, mut items: Vec<Item>) -> Self {
        folders.sort_by(|a, b| a.id.cmp(&b.id));
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            folders,
            items,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    pub fn live_folders(&self) -> impl Iterator<Item = &Folder> {
        self.folders.iter().filter(|f| !f.deleted)
    }

    pub fn live_items(&self) -> impl Iterator<Item = &Item> {
        self.items.iter().filter(|i| !i.deleted)
    }
}

/// Common view over folders and items used by the merge engine.
pub trait Entity: Clone + PartialEq + Serialize {
    const KIND: EntityKind;

    fn id(&self) -> &str;
    fn revision(&self) -> u64;
    fn updated_at(&self) -> DateTime<Utc>;
    fn is_deleted(&self) -> bool;
}

impl Entity for Folder {
    const KIND: EntityKind = EntityKind::Folder;

    fn id(&self) -> &str {
        &self.id
    }
    fn revision(&self) -> u64 {
        self.revision
    }
    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
    fn is_deleted(&self) -> bool {
        self.deleted
    }
}

impl Entity for Item {
    const KIND: EntityKind = EntityKind::Item;

    fn id(&self) -> &str {
        &self.id
    }
    fn revision(&self) -> u64 {
        self.revision
    }
    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
    fn is_deleted(&self) -> bool {
        self.deleted
    }
}

/// Case-insensitive key used for folder name uniqueness.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Return `base` if it is free, otherwise the first of "base (2)",
/// "base (3)", ... whose key is not in `taken`.
pub fn unique_name(base: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(&name_key(base)) {
        return base.to_string();
    }
    let mut n = 2u32;
    loop {
        let candidate = format!("{base} ({n})");
        if !taken.contains(&name_key(&candidate)) {
            return candidate;
        }
        n += 1;
    }
}

/// The revision that follows `revision`.
pub fn next_revision(revision: u64) -> Result<u64> {
    if revision >= MAX_REVISION {
        return Err(CredVaultError::Validation(format!(
            "revision {revision} cannot be raised any further"
        )));
    }
    Ok(revision + 1)
}

/// Generate a fresh record id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_revision_stops_at_the_ceiling() {
        assert_eq!(next_revision(1).unwrap(), 2);
        assert_eq!(next_revision(MAX_REVISION - 1).unwrap(), MAX_REVISION);
        assert!(matches!(
            next_revision(MAX_REVISION),
            Err(CredVaultError::Validation(_))
        ));
        assert!(next_revision(u64::MAX).is_err());
    }

    #[test]
    fn unique_name_skips_taken_suffixes() {
        let taken: HashSet<String> = ["work", "work (2)"].iter().map(|s| s.to_string()).collect();
        assert_eq!(unique_name("Work", &taken), "Work (3)");
        assert_eq!(unique_name("Home", &taken), "Home");
    }

    #[test]
    fn snapshot_sorts_by_id() {
        let now = Utc::now();
        let f = |id: &str| Folder {
            id: id.into(),
            name: id.into(),
            revision: 1,
            updated_at: now,
            deleted: false,
        };
        let snap = VaultSnapshot::new(vec![f("b"), f("a")], vec![]);
        assert_eq!(snap.folders[0].id, "a");
    }

    #[test]
    fn item_kind_serializes_with_type_tag() {
        let kind = ItemKind::Note {
            content: Some("hi".into()),
        };
        let json = serde_json::to_string(&kind).unwrap();
        assert_eq!(json, r#"{"type":"note","content":"hi"}"#);
    }

    #[test]
    fn secret_value_debug_is_redacted() {
        let s = SecretValue::new("hunter2");
        assert!(!format!("{s:?}").contains("hunter2"));
        assert_eq!(s.expose(), "hunter2");
    }
}
