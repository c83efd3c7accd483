//! Persisted correspondence between local files and remote documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

pub const STATE_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("State file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("No mapping found for local path: {0}")]
    MappingNotFound(String),
}

/// Which way a mapping is meant to flow. Recorded for reporting; the engine
/// does not refuse transfers against it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    #[default]
    Bidirectional,
    #[serde(alias = "to_lark")]
    PushOnly,
    #[serde(alias = "from_lark")]
    PullOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMapping {
    /// Storage key: POSIX-relative under a project root, else as given.
    pub local_path: String,
    #[serde(alias = "lark_document_id")]
    pub remote_document_id: String,
    #[serde(default, alias = "lark_document_url")]
    pub remote_url: String,
    #[serde(default, alias = "lark_wiki_space_id")]
    pub wiki_space_id: Option<String>,
    #[serde(default, alias = "lark_wiki_node_token")]
    pub wiki_node_token: Option<String>,
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub local_hash_at_sync: String,
    #[serde(default)]
    pub remote_revision_at_sync: u64,
    #[serde(default, alias = "sync_direction")]
    pub direction: SyncDirection,
}

impl SyncMapping {
    pub fn new(local_path: impl Into<String>, remote_document_id: impl Into<String>) -> Self {
        Self {
            local_path: local_path.into(),
            remote_document_id: remote_document_id.into(),
            remote_url: String::new(),
            wiki_space_id: None,
            wiki_node_token: None,
            last_synced_at: None,
            local_hash_at_sync: String::new(),
            remote_revision_at_sync: 0,
            direction: SyncDirection::Bidirectional,
        }
    }
}

/// Fields to overwrite on an existing mapping; `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingUpdate {
    pub remote_document_id: Option<String>,
    pub remote_url: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub local_hash_at_sync: Option<String>,
    pub remote_revision_at_sync: Option<u64>,
    pub direction: Option<SyncDirection>,
}

impl MappingUpdate {
    fn apply(self, mapping: &mut SyncMapping) {
        if let Some(id) = self.remote_document_id {
            mapping.remote_document_id = id;
        }
        if let Some(url) = self.remote_url {
            mapping.remote_url = url;
        }
        if let Some(at) = self.last_synced_at {
            mapping.last_synced_at = Some(at);
        }
        if let Some(hash) = self.local_hash_at_sync {
            mapping.local_hash_at_sync = hash;
        }
        if let Some(revision) = self.remote_revision_at_sync {
            mapping.remote_revision_at_sync = revision;
        }
        if let Some(direction) = self.direction {
            mapping.direction = direction;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub mappings: Vec<SyncMapping>,
}

fn default_version() -> u32 {
    STATE_VERSION
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            mappings: Vec::new(),
        }
    }
}

/// SHA-256 hex digest of `content` with `\r\n` and `\r` folded to `\n`.
pub fn content_hash(content: &str) -> String {
    let normalized = normalize_newlines(content);
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

pub fn file_hash(path: &Path) -> io::Result<String> {
    Ok(content_hash(&fs::read_to_string(path)?))
}

pub(crate) fn normalize_newlines(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}

fn posix(path: &Path) -> String {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// JSON-backed mapping table. Every mutation rewrites the whole file.
#[derive(Debug)]
pub struct SyncStateStore {
    path: PathBuf,
    project_root: Option<PathBuf>,
    state: SyncState,
}

impl SyncStateStore {
    /// Opens the state file at `path`. An absent or empty file yields an
    /// empty state; nothing is written until the first mutation.
    pub fn open(
        path: impl Into<PathBuf>,
        project_root: Option<PathBuf>,
    ) -> Result<Self, StateError> {
        let path = path.into();
        let state = Self::read(&path)?;
        Ok(Self {
            path,
            project_root,
            state,
        })
    }

    fn read(path: &Path) -> Result<SyncState, StateError> {
        match fs::read_to_string(path) {
            Ok(raw) if raw.trim().is_empty() => Ok(SyncState::default()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(SyncState::default()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    pub fn mappings(&self) -> &[SyncMapping] {
        &self.state.mappings
    }

    /// Re-reads the file, dropping in-memory state.
    pub fn reload(&mut self) -> Result<(), StateError> {
        self.state = Self::read(&self.path)?;
        Ok(())
    }

    /// Writes the whole state through a temporary sibling file and a rename.
    pub fn save(&self) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut encoded = serde_json::to_string_pretty(&self.state)?;
        encoded.push('\n');
        let mut temp_name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        temp_name.push(".tmp");
        let temp_path = self.path.with_file_name(temp_name);
        fs::write(&temp_path, encoded)?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    pub fn get_mapping(&self, local_path: &Path) -> Option<&SyncMapping> {
        let key = self.normalize_path(local_path);
        self.state.mappings.iter().find(|m| m.local_path == key)
    }

    pub fn get_mapping_by_document(&self, document_id: &str) -> Option<&SyncMapping> {
        self.state
            .mappings
            .iter()
            .find(|m| m.remote_document_id == document_id)
    }

    /// Adds `mapping`, replacing any entry stored under the same path.
    pub fn add_mapping(&mut self, mapping: SyncMapping) -> Result<(), StateError> {
        self.add_mappings([mapping])
    }

    /// Adds every mapping in one write. The file is written even when
    /// `mappings` is empty.
    pub fn add_mappings(
        &mut self,
        mappings: impl IntoIterator<Item = SyncMapping>,
    ) -> Result<(), StateError> {
        for mut mapping in mappings {
            mapping.local_path = self.normalize_path(Path::new(&mapping.local_path));
            self.state
                .mappings
                .retain(|m| m.local_path != mapping.local_path);
            self.state.mappings.push(mapping);
        }
        self.save()
    }

    pub fn update_mapping(
        &mut self,
        local_path: &Path,
        update: MappingUpdate,
    ) -> Result<(), StateError> {
        let key = self.normalize_path(local_path);
        let mapping = self
            .state
            .mappings
            .iter_mut()
            .find(|m| m.local_path == key)
            .ok_or(StateError::MappingNotFound(key))?;
        update.apply(mapping);
        self.save()
    }

    /// Removes the mapping for `local_path`; absent mappings are ignored.
    pub fn remove_mapping(&mut self, local_path: &Path) -> Result<(), StateError> {
        let key = self.normalize_path(local_path);
        self.state.mappings.retain(|m| m.local_path != key);
        self.save()
    }

    /// Storage key for `local_path`. With a project root, absolute paths
    /// inside it become POSIX-relative and relative paths are POSIX-ified;
    /// everything else is kept as given.
    pub fn normalize_path(&self, local_path: &Path) -> String {
        let Some(root) = &self.project_root else {
            return local_path.to_string_lossy().into_owned();
        };
        if local_path.is_absolute() {
            match local_path.strip_prefix(root) {
                Ok(relative) => posix(relative),
                Err(_) => local_path.to_string_lossy().into_owned(),
            }
        } else {
            posix(local_path)
        }
    }

    /// Filesystem path for a stored key.
    pub fn resolve_path(&self, stored: &str) -> PathBuf {
        let path = Path::new(stored);
        match &self.project_root {
            Some(root) if !path.is_absolute() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}
