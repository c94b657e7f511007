use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crypto::KdfParams;
use crate::errors::{CredVaultError, Result};
use crate::sync::coordinator::SyncConfig;
use crate::sync::file::{CREDENTIALS_FILE_NAME, VAULT_FILE_NAME};

/// Project-level configuration, loaded from `.credvault.toml`.
///
/// Every field has a sensible default so CredVault works out-of-the-box
/// without any config file at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory (relative to project root) where the vault lives.
    #[serde(default = "default_vault_dir")]
    pub vault_dir: String,

    /// Argon2 memory cost in KiB (default: 64 MB).
    #[serde(default = "default_argon2_memory_kib")]
    pub argon2_memory_kib: u32,

    /// Argon2 iteration count (default: 3).
    #[serde(default = "default_argon2_iterations")]
    pub argon2_iterations: u32,

    /// Argon2 parallelism degree (default: 4).
    #[serde(default = "default_argon2_parallelism")]
    pub argon2_parallelism: u32,

    /// Upper bound on one backup upload or download.
    #[serde(default = "default_transport_timeout_secs")]
    pub transport_timeout_secs: u64,

    /// First retry delay after a failed backup.
    #[serde(default = "default_retry_base_secs")]
    pub retry_base_secs: u64,

    /// Cap on the retry delay.
    #[serde(default = "default_retry_max_secs")]
    pub retry_max_secs: u64,

    /// Tombstones older than this are dropped by `compact`.
    #[serde(default = "default_tombstone_retention_days")]
    pub tombstone_retention_days: u32,

    /// Directory used as the backup destination (relative paths are
    /// resolved against the project root).
    #[serde(default)]
    pub backup_dir: Option<String>,

    /// Inactivity timeout before an unlocked session locks itself;
    /// 0 disables auto-lock.
    #[serde(default = "default_auto_lock_secs")]
    pub auto_lock_secs: u64,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_vault_dir() -> String {
    ".credvault".to_string()
}

fn default_argon2_memory_kib() -> u32 {
    65_536 // 64 MB
}

fn default_argon2_iterations() -> u32 {
    3
}

fn default_argon2_parallelism() -> u32 {
    4
}

fn default_transport_timeout_secs() -> u64 {
    30
}

fn default_retry_base_secs() -> u64 {
    30
}

fn default_retry_max_secs() -> u64 {
    900
}

fn default_tombstone_retention_days() -> u32 {
    90
}

fn default_auto_lock_secs() -> u64 {
    300
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            vault_dir: default_vault_dir(),
            argon2_memory_kib: default_argon2_memory_kib(),
            argon2_iterations: default_argon2_iterations(),
            argon2_parallelism: default_argon2_parallelism(),
            transport_timeout_secs: default_transport_timeout_secs(),
            retry_base_secs: default_retry_base_secs(),
            retry_max_secs: default_retry_max_secs(),
            tombstone_retention_days: default_tombstone_retention_days(),
            backup_dir: None,
            auto_lock_secs: default_auto_lock_secs(),
        }
    }
}

impl Settings {
    /// Name of the config file we look for in the project root.
    pub const FILE_NAME: &'static str = ".credvault.toml";

    /// Load settings from `<project_dir>/.credvault.toml`.
    ///
    /// If the file does not exist, sensible defaults are returned.
    /// If the file exists but cannot be parsed, an error is returned.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let config_path = project_dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;

        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            CredVaultError::ConfigError(format!("Failed to parse {}: {e}", config_path.display()))
        })?;

        Ok(settings)
    }

    /// `project_dir/.credvault`
    pub fn vault_dir_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.vault_dir)
    }

    /// `project_dir/.credvault/vault.cvault`
    pub fn vault_path(&self, project_dir: &Path) -> PathBuf {
        self.vault_dir_path(project_dir).join(VAULT_FILE_NAME)
    }

    /// `project_dir/.credvault/credentials.json`
    pub fn credentials_path(&self, project_dir: &Path) -> PathBuf {
        self.vault_dir_path(project_dir).join(CREDENTIALS_FILE_NAME)
    }

    /// The configured backup directory, resolved against the project root.
    pub fn backup_path(&self, project_dir: &Path) -> Option<PathBuf> {
        self.backup_dir.as_ref().map(|dir| project_dir.join(dir))
    }

    /// Convert the Argon2 settings into crypto-layer params, rejecting
    /// values below the safety floor.
    pub fn kdf_params(&self) -> Result<KdfParams> {
        let params = KdfParams {
            memory_kib: self.argon2_memory_kib,
            iterations: self.argon2_iterations,
            parallelism: self.argon2_parallelism,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            transport_timeout: Duration::from_secs(self.transport_timeout_secs),
            retry_base: Duration::from_secs(self.retry_base_secs),
            retry_max: Duration::from_secs(self.retry_max_secs),
        }
    }

    pub fn tombstone_retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.tombstone_retention_days))
    }

    pub fn auto_lock(&self) -> Option<Duration> {
        (self.auto_lock_secs > 0).then(|| Duration::from_secs(self.auto_lock_secs))
    }
}

// ── Tests ────────────────────────────────────────────────────────────
