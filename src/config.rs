//! Configuration for the sync engine and the materializer.

use std::path::PathBuf;

/// Explicit settings passed to [`crate::sync::SyncEngine`]. Nothing in the
/// library reads the environment; front ends map their own flags onto this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Global state file, used for files outside any project.
    pub state_file: PathBuf,
    /// Directory pulled documents land in when no local path is known.
    pub sync_dir: PathBuf,
    /// File name marking a project root.
    pub project_state_filename: String,
    /// Width in pixels a materialized table is spread across.
    pub page_width: u32,
    /// Rows the remote store accepts in one table-creation call.
    pub max_rows_per_create: usize,
    /// Blocks sent in one `create_children` call.
    pub create_batch_limit: usize,
}

impl SyncConfig {
    pub fn new(state_file: impl Into<PathBuf>, sync_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_file: state_file.into(),
            sync_dir: sync_dir.into(),
            project_state_filename: ".lark-sync.json".to_string(),
            page_width: 820,
            max_rows_per_create: 9,
            create_batch_limit: 50,
        }
    }

    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_file = path.into();
        self
    }

    pub fn with_sync_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.sync_dir = path.into();
        self
    }

    pub fn with_project_state_filename(mut self, name: impl Into<String>) -> Self {
        self.project_state_filename = name.into();
        self
    }

    pub fn with_page_width(mut self, width: u32) -> Self {
        self.page_width = width;
        self
    }

    /// Sets the per-create row limit; values below 1 are raised to 1.
    pub fn with_max_rows_per_create(mut self, rows: usize) -> Self {
        self.max_rows_per_create = rows.max(1);
        self
    }

    /// Sets the create batch size; values below 1 are raised to 1.
    pub fn with_create_batch_limit(mut self, limit: usize) -> Self {
        self.create_batch_limit = limit.max(1);
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(".lark-sync-state.json", "./lark-docs/")
    }
}
