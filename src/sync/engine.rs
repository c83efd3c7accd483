//! Push, pull and status between local Markdown files and remote documents.

use super::conflict::{self, ConflictType};
use super::state::{
    MappingUpdate, StateError, SyncDirection, SyncMapping, SyncStateStore, file_hash,
};
use crate::config::SyncConfig;
use crate::doc::{markdown_to_blocks, render};
use crate::materialize::{MaterializeError, TreeMaterializer};
use crate::project::{Project, ProjectError};
use crate::remote::{DocumentStore, RemoteError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Local file not found: {0}")]
    LocalMissing(PathBuf),
    #[error("No mapping found for: {0}")]
    Unmapped(PathBuf),
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("Materialization failed: {0}")]
    Materialize(#[from] MaterializeError),
    #[error("State error: {0}")]
    State(#[from] StateError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result of one push or pull. Failures never escape as errors; they are
/// reported here with `success == false`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub success: bool,
    pub message: String,
    pub document_id: Option<String>,
    pub document_url: Option<String>,
    pub local_path: Option<PathBuf>,
    pub conflict: ConflictType,
    /// Unified diff from the remote rendering to the local file, when one
    /// was computed.
    pub diff: Option<String>,
}

impl SyncOutcome {
    fn failure(message: impl Into<String>, local_path: Option<PathBuf>) -> Self {
        Self {
            success: false,
            message: message.into(),
            local_path,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    InSync,
    LocalAhead,
    RemoteAhead,
    Conflict,
    Unlinked,
}

impl From<ConflictType> for SyncStatus {
    fn from(conflict: ConflictType) -> Self {
        match conflict {
            ConflictType::None => SyncStatus::InSync,
            ConflictType::LocalOnly => SyncStatus::LocalAhead,
            ConflictType::RemoteOnly => SyncStatus::RemoteAhead,
            ConflictType::BothChanged => SyncStatus::Conflict,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncStatus::InSync => "in_sync",
            SyncStatus::LocalAhead => "local_ahead",
            SyncStatus::RemoteAhead => "remote_ahead",
            SyncStatus::Conflict => "conflict",
            SyncStatus::Unlinked => "unlinked",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    /// Path as stored in the mapping.
    pub local_path: String,
    pub document_id: String,
    pub document_url: String,
    pub status: SyncStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushOptions {
    /// Target document; falls back to the file's mapping.
    pub document_id: Option<String>,
    /// Title for a newly created document; derived from the file name when
    /// absent.
    pub title: Option<String>,
    pub folder: Option<String>,
    pub force: bool,
}

/// Which state store a path belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
enum StateKey {
    Global,
    Project(PathBuf),
}

pub struct SyncEngine<S: DocumentStore> {
    store: S,
    config: SyncConfig,
    global: SyncStateStore,
    projects: HashMap<PathBuf, SyncStateStore>,
}

impl<S: DocumentStore> SyncEngine<S> {
    /// Opens the global state file named by `config`.
    pub fn new(store: S, config: SyncConfig) -> Result<Self, StateError> {
        let global = SyncStateStore::open(&config.state_file, None)?;
        Ok(Self {
            store,
            config,
            global,
            projects: HashMap::new(),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// State store that tracks `path`: the enclosing project's if there is
    /// one, otherwise the global store.
    pub fn state_for(&mut self, path: &Path) -> Result<&SyncStateStore, SyncError> {
        let key = self.state_key(path)?;
        Ok(self.state(&key))
    }

    fn state_key(&mut self, path: &Path) -> Result<StateKey, SyncError> {
        let Some(project) = Project::discover(path, &self.config.project_state_filename) else {
            return Ok(StateKey::Global);
        };
        let root = project.root().to_path_buf();
        if !self.projects.contains_key(&root) {
            self.projects.insert(root.clone(), project.store()?);
        }
        Ok(StateKey::Project(root))
    }

    fn state(&self, key: &StateKey) -> &SyncStateStore {
        match key {
            StateKey::Global => &self.global,
            StateKey::Project(root) => self.projects.get(root).unwrap_or(&self.global),
        }
    }

    fn state_mut(&mut self, key: &StateKey) -> &mut SyncStateStore {
        match key {
            StateKey::Global => &mut self.global,
            StateKey::Project(root) => match self.projects.get_mut(root) {
                Some(store) => store,
                None => &mut self.global,
            },
        }
    }

    /// Mapping for `document_id` together with its absolute path, read from
    /// the store that owns that path. A global entry for a file inside a
    /// project defers to the project's entry for the same path.
    fn find_by_document(
        &mut self,
        document_id: &str,
    ) -> Result<Option<(StateKey, PathBuf, SyncMapping)>, SyncError> {
        let found = match self.global.get_mapping_by_document(document_id) {
            Some(mapping) => Some((StateKey::Global, mapping.clone())),
            None => self.projects.iter().find_map(|(root, store)| {
                store
                    .get_mapping_by_document(document_id)
                    .map(|mapping| (StateKey::Project(root.clone()), mapping.clone()))
            }),
        };
        let Some((key, mapping)) = found else {
            return Ok(None);
        };
        let path = std::path::absolute(self.state(&key).resolve_path(&mapping.local_path))?;
        let owner = self.state_key(&path)?;
        if owner == key {
            return Ok(Some((key, path, mapping)));
        }
        let owned = self
            .state(&owner)
            .get_mapping(&path)
            .cloned()
            .unwrap_or(mapping);
        Ok(Some((owner, path, owned)))
    }

    /// Creates a project state file at the Git root enclosing `path`, copying
    /// in global mappings that live under it.
    pub fn init_project(&mut self, path: &Path) -> Result<(Project, usize), ProjectError> {
        let (project, migrated) =
            Project::init(path, &self.global, &self.config.project_state_filename)?;
        self.projects
            .insert(project.root().to_path_buf(), project.store()?);
        Ok((project, migrated))
    }

    /// Uploads the file at `path`, replacing the content of its document or
    /// creating a new one.
    pub fn push(&mut self, path: &Path, options: PushOptions) -> SyncOutcome {
        match self.try_push(path, options) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(path = %path.display(), %err, "push failed");
                SyncOutcome::failure(err.to_string(), Some(path.to_path_buf()))
            }
        }
    }

    fn try_push(&mut self, path: &Path, options: PushOptions) -> Result<SyncOutcome, SyncError> {
        let path = std::path::absolute(path)?;
        if !path.is_file() {
            return Err(SyncError::LocalMissing(path));
        }
        let markdown = fs::read_to_string(&path)?;
        let key = self.state_key(&path)?;
        let mapping = self.state(&key).get_mapping(&path).cloned();
        let target = options
            .document_id
            .clone()
            .or_else(|| mapping.as_ref().map(|m| m.remote_document_id.clone()));

        let blocks = markdown_to_blocks(&markdown);
        let (info, created) = match target {
            Some(document_id) => {
                let info = self.store.get_document(&document_id)?;
                // A sync point only describes the document it was taken from.
                let sync_point = mapping
                    .as_ref()
                    .filter(|m| !options.force && m.remote_document_id == document_id);
                if let Some(mapping) = sync_point {
                    let kind = conflict::detect(mapping, &path, info.revision);
                    if kind == ConflictType::BothChanged {
                        let diff = self.remote_markdown(&document_id).ok().map(|remote| {
                            conflict::diff(&markdown, &remote)
                        });
                        return Ok(SyncOutcome {
                            success: false,
                            message: "Conflict: both local and remote have changed since the \
                                      last sync. Use force to overwrite."
                                .to_string(),
                            document_id: Some(document_id),
                            document_url: Some(info.url),
                            local_path: Some(path),
                            conflict: kind,
                            diff,
                        });
                    }
                    if kind == ConflictType::None {
                        return Ok(SyncOutcome {
                            success: true,
                            message: "Already in sync".to_string(),
                            document_id: Some(document_id),
                            document_url: Some(info.url),
                            local_path: Some(path),
                            ..SyncOutcome::default()
                        });
                    }
                }
                self.clear_document(&document_id)?;
                (info, false)
            }
            None => {
                let title = options
                    .title
                    .clone()
                    .unwrap_or_else(|| title_from_path(&path));
                (
                    self.store
                        .create_document(&title, options.folder.as_deref())?,
                    true,
                )
            }
        };

        let document_id = info.document_id.clone();
        let report = TreeMaterializer::new(&self.store, &document_id, &self.config)
            .materialize(&document_id, &blocks)?;
        let refreshed = self.store.get_document(&document_id)?;
        let hash = file_hash(&path)?;
        let url = if refreshed.url.is_empty() {
            info.url
        } else {
            refreshed.url.clone()
        };

        let now = Utc::now();
        let store = self.state_mut(&key);
        if mapping.is_some() {
            store.update_mapping(
                &path,
                MappingUpdate {
                    remote_document_id: Some(document_id.clone()),
                    remote_url: Some(url.clone()),
                    last_synced_at: Some(now),
                    local_hash_at_sync: Some(hash),
                    remote_revision_at_sync: Some(refreshed.revision),
                    direction: None,
                },
            )?;
        } else {
            let mut fresh = SyncMapping::new(path.to_string_lossy(), document_id.clone());
            fresh.remote_url = url.clone();
            fresh.last_synced_at = Some(now);
            fresh.local_hash_at_sync = hash;
            fresh.remote_revision_at_sync = refreshed.revision;
            fresh.direction = SyncDirection::PushOnly;
            store.add_mapping(fresh)?;
        }

        info!(
            path = %path.display(),
            document_id = %document_id,
            revision = refreshed.revision,
            blocks = report.blocks_created,
            created,
            "pushed"
        );
        let mut message = format!("Pushed to document {document_id}");
        if !report.warnings.is_empty() {
            message.push_str(&format!(
                " ({} formatting step(s) skipped)",
                report.warnings.len()
            ));
        }
        Ok(SyncOutcome {
            success: true,
            message,
            document_id: Some(document_id),
            document_url: Some(url),
            local_path: Some(path),
            ..SyncOutcome::default()
        })
    }

    /// Downloads `document_id` into `local_path`, or into the path of its
    /// mapping, or into a file named after its title under the sync dir.
    pub fn pull(
        &mut self,
        document_id: &str,
        local_path: Option<&Path>,
        force: bool,
    ) -> SyncOutcome {
        match self.try_pull(document_id, local_path, force) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(document_id, %err, "pull failed");
                SyncOutcome {
                    document_id: Some(document_id.to_string()),
                    ..SyncOutcome::failure(err.to_string(), local_path.map(Path::to_path_buf))
                }
            }
        }
    }

    /// Pulls the document mapped to `local_path`.
    pub fn pull_mapped(&mut self, local_path: &Path, force: bool) -> SyncOutcome {
        let resolved = std::path::absolute(local_path)
            .map_err(SyncError::from)
            .and_then(|path| {
                let key = self.state_key(&path)?;
                self.state(&key)
                    .get_mapping(&path)
                    .map(|m| m.remote_document_id.clone())
                    .ok_or(SyncError::Unmapped(path))
            });
        match resolved {
            Ok(document_id) => self.pull(&document_id, Some(local_path), force),
            Err(err) => SyncOutcome::failure(err.to_string(), Some(local_path.to_path_buf())),
        }
    }

    fn try_pull(
        &mut self,
        document_id: &str,
        local_path: Option<&Path>,
        force: bool,
    ) -> Result<SyncOutcome, SyncError> {
        let info = self.store.get_document(document_id)?;

        let (key, path, mapping) = match local_path {
            Some(path) => {
                let path = std::path::absolute(path)?;
                let key = self.state_key(&path)?;
                let mapping = self.state(&key).get_mapping_by_document(document_id).cloned();
                (key, path, mapping)
            }
            None => match self.find_by_document(document_id)? {
                Some((key, path, mapping)) => (key, path, Some(mapping)),
                None => {
                    let name = file_name_for(&info.title);
                    let path = std::path::absolute(self.config.sync_dir.join(name))?;
                    let key = self.state_key(&path)?;
                    (key, path, None)
                }
            },
        };

        let remote = self.remote_markdown(document_id)?;
        let existing = match fs::read_to_string(&path) {
            Ok(content) => Some(content),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => return Err(err.into()),
        };
        let diff = existing
            .as_deref()
            .map(|local| conflict::diff(local, &remote))
            .filter(|diff| !diff.is_empty());

        if let Some(mapping) = mapping.as_ref().filter(|_| !force) {
            let mapped_path = self.state(&key).resolve_path(&mapping.local_path);
            let kind = conflict::detect(mapping, &mapped_path, info.revision);
            if kind == ConflictType::BothChanged {
                return Ok(SyncOutcome {
                    success: false,
                    message: "Conflict: both local and remote have changed since the last \
                              sync. Use force to overwrite."
                        .to_string(),
                    document_id: Some(document_id.to_string()),
                    document_url: Some(info.url),
                    local_path: Some(path),
                    conflict: kind,
                    diff,
                });
            }
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, &remote)?;
        let hash = file_hash(&path)?;

        let store = self.state_mut(&key);
        let mut next = match &mapping {
            Some(mapping) => {
                let previous = store.resolve_path(&mapping.local_path);
                if std::path::absolute(&previous)? != path {
                    store.remove_mapping(Path::new(&mapping.local_path))?;
                }
                mapping.clone()
            }
            None => {
                let mut fresh = SyncMapping::new("", document_id);
                fresh.direction = SyncDirection::PullOnly;
                fresh
            }
        };
        next.local_path = path.to_string_lossy().into_owned();
        if !info.url.is_empty() {
            next.remote_url = info.url.clone();
        }
        next.last_synced_at = Some(Utc::now());
        next.local_hash_at_sync = hash;
        next.remote_revision_at_sync = info.revision;
        store.add_mapping(next)?;

        info!(
            document_id,
            path = %path.display(),
            revision = info.revision,
            "pulled"
        );
        Ok(SyncOutcome {
            success: true,
            message: format!("Pulled document {document_id}"),
            document_id: Some(document_id.to_string()),
            document_url: Some(info.url),
            local_path: Some(path),
            conflict: ConflictType::None,
            diff,
        })
    }

    /// Status of one mapped path, or of every mapping in the global store
    /// and the project stores opened so far.
    pub fn status(&mut self, local_path: Option<&Path>) -> Result<Vec<StatusEntry>, SyncError> {
        let mut tracked: Vec<(PathBuf, SyncMapping)> = Vec::new();
        match local_path {
            Some(path) => {
                let path = std::path::absolute(path)?;
                let key = self.state_key(&path)?;
                let store = self.state(&key);
                if let Some(mapping) = store.get_mapping(&path) {
                    tracked.push((store.resolve_path(&mapping.local_path), mapping.clone()));
                }
            }
            None => {
                // Global entries for files inside a project are shadowed by
                // the project's own store.
                for mapping in self.global.mappings().to_vec() {
                    let path = std::path::absolute(&mapping.local_path)?;
                    if self.state_key(&path)? == StateKey::Global {
                        tracked.push((path, mapping));
                    }
                }
                let mut roots: Vec<&PathBuf> = self.projects.keys().collect();
                roots.sort();
                for store in roots.into_iter().filter_map(|root| self.projects.get(root)) {
                    for mapping in store.mappings() {
                        tracked.push((store.resolve_path(&mapping.local_path), mapping.clone()));
                    }
                }
            }
        }

        Ok(tracked
            .into_iter()
            .map(|(path, mapping)| StatusEntry {
                status: self.status_of(&mapping, &path),
                local_path: mapping.local_path,
                document_id: mapping.remote_document_id,
                document_url: mapping.remote_url,
                last_synced_at: mapping.last_synced_at,
            })
            .collect())
    }

    fn status_of(&self, mapping: &SyncMapping, path: &Path) -> SyncStatus {
        match self.store.get_document(&mapping.remote_document_id) {
            Ok(info) => conflict::detect(mapping, path, info.revision).into(),
            Err(err) => {
                warn!(document_id = %mapping.remote_document_id, %err, "document unreachable");
                SyncStatus::Unlinked
            }
        }
    }

    /// Forgets the mapping for `path`. Neither the file nor the document is
    /// touched.
    pub fn unlink(&mut self, path: &Path) -> Result<bool, SyncError> {
        let path = std::path::absolute(path)?;
        let key = self.state_key(&path)?;
        let store = self.state_mut(&key);
        if store.get_mapping(&path).is_none() {
            return Ok(false);
        }
        store.remove_mapping(&path)?;
        Ok(true)
    }

    fn remote_markdown(&self, document_id: &str) -> Result<String, RemoteError> {
        Ok(render(&self.store.list_all_blocks(document_id)?))
    }

    /// Deletes every top-level block of the document in one range delete.
    fn clear_document(&self, document_id: &str) -> Result<(), RemoteError> {
        let blocks = self.store.list_all_blocks(document_id)?;
        let count = match blocks.iter().find(|b| b.block_id == document_id) {
            Some(page) => page.children.len(),
            None => blocks
                .iter()
                .filter(|b| b.parent_id == document_id && b.block_id != document_id)
                .count(),
        };
        if count > 0 {
            self.store
                .batch_delete(document_id, document_id, 0, count)?;
        }
        Ok(())
    }
}

/// Document title for a new upload: the file stem with `-` and `_` turned
/// into spaces, each word capitalized.
pub fn title_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().replace(['-', '_'], " "))
        .unwrap_or_default();
    let mut title = String::with_capacity(stem.len());
    let mut in_word = false;
    for ch in stem.chars() {
        if ch.is_alphabetic() {
            if in_word {
                title.extend(ch.to_lowercase());
            } else {
                title.extend(ch.to_uppercase());
            }
            in_word = true;
        } else {
            title.push(ch);
            in_word = false;
        }
    }
    title
}

/// Local file name for a pulled document with no known path.
pub fn file_name_for(title: &str) -> String {
    let slug = title.to_lowercase().replace([' ', '/'], "-");
    if slug.is_empty() {
        "untitled.md".to_string()
    } else {
        format!("{slug}.md")
    }
}
