//! The in-memory vault: the single place where records are mutated.
//!
//! `VaultStore` holds decrypted folders and items and enforces the
//! cross-record invariants (unique folder names, items always in a live
//! folder, strictly increasing revisions).  It never touches the disk;
//! `vault::codec` turns its snapshots into encrypted blobs and a
//! `SecureBlobStore` persists them.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use super::model::{
    name_key, new_id, next_revision, unique_name, Folder, Item, ItemDraft, VaultSnapshot,
    DEFAULT_FOLDER_ID, DEFAULT_FOLDER_NAME, MAX_REVISION, SNAPSHOT_FORMAT_VERSION,
};
use crate::errors::{CredVaultError, Result};

/// Authoritative in-process model of the vault.
#[derive(Debug, Default)]
pub struct VaultStore {
    folders: BTreeMap<String, Folder>,
    items: BTreeMap<String, Item>,

    /// Bumped on every successful mutation or commit.
    generation: u64,
}

impl VaultStore {
    // ------------------------------------------------------------------
    // Construction
    // ------------------------------------------------------------------

    /// An empty vault.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a vault from a previously exported snapshot.
    ///
    /// Runs the same validation as `commit`.
    pub fn from_snapshot(snapshot: VaultSnapshot) -> Result<Self> {
        let mut store = Self::new();
        store.commit(snapshot)?;
        store.generation = 0;
        Ok(store)
    }

    // ------------------------------------------------------------------
    // Folder operations
    // ------------------------------------------------------------------

    /// Create a folder.  Names are unique case-insensitively among live
    /// folders.
    pub fn create_folder(&mut self, name: &str) -> Result<Folder> {
        let name = validate_name("folder", name)?;
        self.ensure_folder_name_free(&name, None)?;

        let folder = Folder {
            id: new_id(),
            name,
            revision: 1,
            updated_at: Utc::now(),
            deleted: false,
        };
        self.folders.insert(folder.id.clone(), folder.clone());
        self.touch();

        debug!(id = %folder.id, "folder created");
        Ok(folder)
    }

    /// Rename a live folder.
    pub fn rename_folder(&mut self, id: &str, new_name: &str) -> Result<()> {
        let new_name = validate_name("folder", new_name)?;
        self.live_folder(id)?;
        self.ensure_folder_name_free(&new_name, Some(id))?;

        let folder = self.live_folder_mut(id)?;
        let revision = next_revision(folder.revision)?;
        folder.name = new_name;
        folder.revision = revision;
        folder.updated_at = Utc::now();
        self.touch();

        debug!(id = %id, "folder renamed");
        Ok(())
    }

    /// Tombstone a folder.
    ///
    /// With `cascade` its items are tombstoned too; otherwise they move
    /// to the default folder, which is created on demand.
    pub fn delete_folder(&mut self, id: &str, cascade: bool) -> Result<()> {
        self.live_folder(id)?;
        if id == DEFAULT_FOLDER_ID && !cascade {
            return Err(CredVaultError::Validation(format!(
                "the '{DEFAULT_FOLDER_NAME}' folder can only be deleted together with its items"
            )));
        }

        // Every fallible step runs before the first write.
        let folder_revision = next_revision(self.live_folder(id)?.revision)?;
        let affected = self
            .items
            .values()
            .filter(|i| !i.deleted && i.folder_id == id)
            .map(|i| -> Result<(String, u64)> { Ok((i.id.clone(), next_revision(i.revision)?)) })
            .collect::<Result<Vec<(String, u64)>>>()?;

        let now = Utc::now();
        let target = if cascade {
            None
        } else {
            Some(self.ensure_default_folder(now, Some(id))?)
        };

        let folder = self.live_folder_mut(id)?;
        folder.deleted = true;
        folder.revision = folder_revision;
        folder.updated_at = now;

        for (item_id, revision) in &affected {
            if let Some(item) = self.items.get_mut(item_id) {
                match &target {
                    Some(default_id) => item.folder_id = default_id.clone(),
                    None => item.deleted = true,
                }
                item.revision = *revision;
                item.updated_at = now;
            }
        }
        let moved = affected.len();
        self.touch();

        debug!(id = %id, cascade, items = moved, "folder deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Item operations
    // ------------------------------------------------------------------

    /// Add a new item to a live folder.
    pub fn add_item(&mut self, draft: ItemDraft) -> Result<Item> {
        let name = validate_name("item", &draft.name)?;
        self.live_folder(&draft.folder_id)?;

        let item = Item {
            id: new_id(),
            folder_id: draft.folder_id,
            name,
            kind: draft.kind,
            revision: 1,
            updated_at: Utc::now(),
            deleted: false,
        };
        self.items.insert(item.id.clone(), item.clone());
        self.touch();

        debug!(id = %item.id, kind = item.kind.label(), "item added");
        Ok(item)
    }

    /// Replace the editable fields of a live item.
    ///
    /// `revision`, `updated_at` and `deleted` on the argument are
    /// ignored; the store assigns them.
    pub fn update_item(&mut self, item: Item) -> Result<Item> {
        let name = validate_name("item", &item.name)?;
        self.live_folder(&item.folder_id)?;

        let stored = self
            .items
            .get_mut(&item.id)
            .filter(|i| !i.deleted)
            .ok_or_else(|| CredVaultError::ItemNotFound(item.id.clone()))?;

        let revision = next_revision(stored.revision)?;
        stored.folder_id = item.folder_id;
        stored.name = name;
        stored.kind = item.kind;
        stored.revision = revision;
        stored.updated_at = Utc::now();
        let updated = stored.clone();
        self.touch();

        debug!(id = %updated.id, revision = updated.revision, "item updated");
        Ok(updated)
    }

    /// Tombstone an item.
    pub fn delete_item(&mut self, id: &str) -> Result<()> {
        let item = self
            .items
            .get_mut(id)
            .filter(|i| !i.deleted)
            .ok_or_else(|| CredVaultError::ItemNotFound(id.to_string()))?;

        let revision = next_revision(item.revision)?;
        item.deleted = true;
        item.revision = revision;
        item.updated_at = Utc::now();
        self.touch();

        debug!(id = %id, "item deleted");
        Ok(())
    }

    /// Id of the default folder, creating or reviving it if needed.
    pub fn default_folder(&mut self) -> Result<String> {
        let existed = self.folder(DEFAULT_FOLDER_ID).is_some();
        let id = self.ensure_default_folder(Utc::now(), None)?;
        if !existed {
            self.touch();
        }
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// A live folder by id.
    pub fn folder(&self, id: &str) -> Option<&Folder> {
        self.folders.get(id).filter(|f| !f.deleted)
    }

    /// Find a live folder by name (case-insensitive).
    pub fn folder_by_name(&self, name: &str) -> Option<&Folder> {
        let key = name_key(name);
        self.folders
            .values()
            .find(|f| !f.deleted && name_key(&f.name) == key)
    }

    /// A live item by id.
    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.get(id).filter(|i| !i.deleted)
    }

    /// Live folders sorted by name.
    pub fn folders(&self) -> Vec<&Folder> {
        let mut list: Vec<&Folder> = self.folders.values().filter(|f| !f.deleted).collect();
        list.sort_by_key(|f| name_key(&f.name));
        list
    }

    /// Live items sorted by name.
    pub fn items(&self) -> Vec<&Item> {
        let mut list: Vec<&Item> = self.items.values().filter(|i| !i.deleted).collect();
        list.sort_by_key(|i| name_key(&i.name));
        list
    }

    /// Live items of one folder, sorted by name.
    pub fn items_in_folder(&self, folder_id: &str) -> Vec<&Item> {
        self.items()
            .into_iter()
            .filter(|i| i.folder_id == folder_id)
            .collect()
    }

    /// Case-insensitive substring search over item name, username and url.
    pub fn search(&self, query: &str) -> Vec<&Item> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.items();
        }
        self.items()
            .into_iter()
            .filter(|item| {
                let mut haystacks = vec![item.name.as_str()];
                if let super::model::ItemKind::Credential { username, url, .. } = &item.kind {
                    haystacks.extend(username.as_deref());
                    haystacks.extend(url.as_deref());
                }
                haystacks
                    .iter()
                    .any(|h| h.to_lowercase().contains(&needle))
            })
            .collect()
    }

    /// Counter that changes whenever the vault contents change.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Point-in-time copy of every folder and item, tombstones included.
    pub fn export(&self) -> VaultSnapshot {
        VaultSnapshot::new(
            self.folders.values().cloned().collect(),
            self.items.values().cloned().collect(),
        )
    }

    /// Atomically replace the vault contents with `snapshot`.
    ///
    /// The snapshot is validated and normalized into fresh maps first;
    /// on error nothing changes.  Live items whose folder is missing or
    /// tombstoned are moved to the default folder.
    pub fn commit(&mut self, snapshot: VaultSnapshot) -> Result<()> {
        if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(CredVaultError::Validation(format!(
                "snapshot format {} is newer than supported {SNAPSHOT_FORMAT_VERSION}",
                snapshot.format_version
            )));
        }

        let mut staged = Self::default();

        for folder in snapshot.folders {
            if !folder.deleted {
                validate_name("folder", &folder.name)?;
            }
            check_revision(folder.revision)?;
            if staged.folders.insert(folder.id.clone(), folder).is_some() {
                return Err(CredVaultError::Validation("duplicate folder id in snapshot".into()));
            }
        }
        for item in snapshot.items {
            if !item.deleted {
                validate_name("item", &item.name)?;
            }
            check_revision(item.revision)?;
            if staged.items.insert(item.id.clone(), item).is_some() {
                return Err(CredVaultError::Validation("duplicate item id in snapshot".into()));
            }
        }

        let mut seen = HashSet::new();
        for folder in staged.folders.values().filter(|f| !f.deleted) {
            if !seen.insert(name_key(&folder.name)) {
                return Err(CredVaultError::Validation(format!(
                    "duplicate folder name '{}'",
                    folder.name
                )));
            }
        }

        let orphans: Vec<String> = staged
            .items
            .values()
            .filter(|i| !i.deleted && staged.folder(&i.folder_id).is_none())
            .map(|i| i.id.clone())
            .collect();
        if !orphans.is_empty() {
            let now = Utc::now();
            let default_id = staged.ensure_default_folder(now, None)?;
            for id in &orphans {
                if let Some(item) = staged.items.get_mut(id) {
                    item.folder_id = default_id.clone();
                    item.revision = next_revision(item.revision)?;
                    item.updated_at = now;
                }
            }
        }

        self.folders = staged.folders;
        self.items = staged.items;
        self.touch();

        info!(
            folders = self.folders.len(),
            items = self.items.len(),
            reparented = orphans.len(),
            "vault snapshot committed"
        );
        Ok(())
    }

    /// Permanently drop tombstones last changed before `now - retention`.
    ///
    /// Returns how many records were removed.  Must not run while a merge
    /// is pending; `SyncCoordinator::compact` enforces that.
    pub fn compact(&mut self, retention: Duration, now: DateTime<Utc>) -> usize {
        let cutoff = now - retention;
        let before = self.folders.len() + self.items.len();

        self.folders
            .retain(|_, f| !(f.deleted && f.updated_at < cutoff));
        self.items.retain(|_, i| !(i.deleted && i.updated_at < cutoff));

        let removed = before - (self.folders.len() + self.items.len());
        if removed > 0 {
            self.touch();
            info!(removed, "tombstones compacted");
        }
        removed
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn touch(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    fn live_folder(&self, id: &str) -> Result<&Folder> {
        self.folder(id)
            .ok_or_else(|| CredVaultError::FolderNotFound(id.to_string()))
    }

    fn live_folder_mut(&mut self, id: &str) -> Result<&mut Folder> {
        self.folders
            .get_mut(id)
            .filter(|f| !f.deleted)
            .ok_or_else(|| CredVaultError::FolderNotFound(id.to_string()))
    }

    fn ensure_folder_name_free(&self, name: &str, except_id: Option<&str>) -> Result<()> {
        let key = name_key(name);
        let clash = self
            .folders
            .values()
            .any(|f| !f.deleted && Some(f.id.as_str()) != except_id && name_key(&f.name) == key);
        if clash {
            return Err(CredVaultError::Validation(format!(
                "a folder named '{name}' already exists"
            )));
        }
        Ok(())
    }

    /// Make sure the default folder exists and is live; return its id.
    /// The live folder `leaving` does not block the default name.
    fn ensure_default_folder(
        &mut self,
        now: DateTime<Utc>,
        leaving: Option<&str>,
    ) -> Result<String> {
        if self.folder(DEFAULT_FOLDER_ID).is_some() {
            return Ok(DEFAULT_FOLDER_ID.to_string());
        }

        let taken: HashSet<String> = self
            .folders
            .values()
            .filter(|f| !f.deleted && Some(f.id.as_str()) != leaving)
            .map(|f| name_key(&f.name))
            .collect();
        let name = unique_name(DEFAULT_FOLDER_NAME, &taken);

        match self.folders.get_mut(DEFAULT_FOLDER_ID) {
            Some(tombstoned) => {
                let revision = next_revision(tombstoned.revision)?;
                tombstoned.deleted = false;
                tombstoned.name = name;
                tombstoned.revision = revision;
                tombstoned.updated_at = now;
            }
            None => {
                self.folders.insert(
                    DEFAULT_FOLDER_ID.to_string(),
                    Folder {
                        id: DEFAULT_FOLDER_ID.to_string(),
                        name,
                        revision: 1,
                        updated_at: now,
                        deleted: false,
                    },
                );
            }
        }
        Ok(DEFAULT_FOLDER_ID.to_string())
    }
}

/// Reject revisions above `MAX_REVISION`.
fn check_revision(revision: u64) -> Result<()> {
    if revision > MAX_REVISION {
        return Err(CredVaultError::Validation(format!(
            "revision {revision} is out of range"
        )));
    }
    Ok(())
}

/// Trim and reject empty names.
fn validate_name(what: &str, name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CredVaultError::Validation(format!("{what} name cannot be empty")));
    }
    Ok(trimmed.to_string())
}
