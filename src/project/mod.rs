//! Project-local sync state.
//!
//! A project is a directory tree whose root holds its own state file. Files
//! under it are tracked there with root-relative paths, so the state can be
//! committed alongside the documents.

use crate::sync::state::{StateError, SyncStateStore};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("Path does not exist: {0}")]
    PathDoesNotExist(PathBuf),
    #[error("No project state file found from: {0}")]
    NotInitialized(PathBuf),
    #[error("Project already initialized: {0}")]
    AlreadyInitialized(PathBuf),
    #[error("No Git repository found for: {0}")]
    NoGitRoot(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("State error: {0}")]
    State(#[from] StateError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    root: PathBuf,
    state_file: PathBuf,
}

impl Project {
    /// Walks up from `start` (a file or directory) to the nearest directory
    /// holding `state_filename`.
    pub fn discover(start: &Path, state_filename: &str) -> Option<Project> {
        let start = std::path::absolute(start).ok()?;
        let first = if start.is_dir() {
            start.as_path()
        } else {
            start.parent()?
        };
        first
            .ancestors()
            .find(|dir| dir.join(state_filename).is_file())
            .map(|root| Project {
                root: root.to_path_buf(),
                state_file: root.join(state_filename),
            })
    }

    /// Like [`Project::discover`], failing when nothing is found.
    pub fn open(start: &Path, state_filename: &str) -> Result<Project, ProjectError> {
        if !start.exists() {
            return Err(ProjectError::PathDoesNotExist(start.to_path_buf()));
        }
        Self::discover(start, state_filename)
            .ok_or_else(|| ProjectError::NotInitialized(start.to_path_buf()))
    }

    /// Creates a state file at the Git root enclosing `path` and copies in
    /// every mapping of `global` whose file lives under that root. Returns
    /// the project and the number of copied mappings.
    pub fn init(
        path: &Path,
        global: &SyncStateStore,
        state_filename: &str,
    ) -> Result<(Project, usize), ProjectError> {
        if !path.exists() {
            return Err(ProjectError::PathDoesNotExist(path.to_path_buf()));
        }
        let root = git_root(&std::path::absolute(path)?)
            .ok_or_else(|| ProjectError::NoGitRoot(path.to_path_buf()))?;
        let state_file = root.join(state_filename);
        if state_file.exists() {
            return Err(ProjectError::AlreadyInitialized(state_file));
        }

        let project = Project { root, state_file };
        let mut store = project.store()?;
        let migrated: Vec<_> = global
            .mappings()
            .iter()
            .filter(|mapping| Path::new(&mapping.local_path).starts_with(&project.root))
            .cloned()
            .collect();
        let count = migrated.len();
        store.add_mappings(migrated)?;
        tracing::info!(root = %project.root.display(), migrated = count, "initialized project");
        Ok((project, count))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    /// State store for this project, keyed by root-relative paths.
    pub fn store(&self) -> Result<SyncStateStore, StateError> {
        SyncStateStore::open(&self.state_file, Some(self.root.clone()))
    }

    /// Markdown files under the root, skipping hidden directories.
    pub fn files(&self) -> impl Iterator<Item = PathBuf> + '_ {
        WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "md"))
            .map(|e| e.path().to_path_buf())
    }

    /// Root-relative POSIX form of `path`, or the path as given when it lies
    /// outside the root.
    pub fn relative(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(relative) => relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => path.to_string_lossy().into_owned(),
        }
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

/// Nearest ancestor of `start` containing a `.git` entry.
pub fn git_root(start: &Path) -> Option<PathBuf> {
    let first = if start.is_dir() { start } else { start.parent()? };
    first
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::state::SyncMapping;
    use std::fs;
    use tempfile::tempdir;

    const STATE: &str = ".lark-sync.json";

    #[test]
    fn test_discover_walks_up() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("docs").join("deep");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("a.md"), "a").unwrap();
        assert!(Project::discover(&nested.join("a.md"), STATE).is_none());

        fs::write(dir.path().join(STATE), "").unwrap();
        let project = Project::discover(&nested.join("a.md"), STATE).unwrap();
        assert_eq!(project.root(), dir.path());
        assert_eq!(project.relative(&nested.join("a.md")), "docs/deep/a.md");
    }

    #[test]
    fn test_open_reports_missing_state() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            Project::open(dir.path(), STATE),
            Err(ProjectError::NotInitialized(_))
        ));
        assert!(matches!(
            Project::open(&dir.path().join("missing"), STATE),
            Err(ProjectError::PathDoesNotExist(_))
        ));
    }

    #[test]
    fn test_init_requires_git_root() {
        let dir = tempdir().unwrap();
        let global = SyncStateStore::open(dir.path().join("global.json"), None).unwrap();
        assert!(matches!(
            Project::init(dir.path(), &global, STATE),
            Err(ProjectError::NoGitRoot(_))
        ));
    }

    #[test]
    fn test_init_migrates_mappings_under_root() {
        let home = tempdir().unwrap();
        let repo = home.path().join("repo");
        fs::create_dir_all(repo.join(".git")).unwrap();
        fs::create_dir_all(repo.join("docs")).unwrap();

        let mut global = SyncStateStore::open(home.path().join("global.json"), None).unwrap();
        let inside = repo.join("docs").join("prd.md");
        global
            .add_mapping(SyncMapping::new(inside.to_string_lossy(), "doc1"))
            .unwrap();
        global
            .add_mapping(SyncMapping::new("/elsewhere/x.md", "doc2"))
            .unwrap();

        let (project, migrated) = Project::init(&repo.join("docs"), &global, STATE).unwrap();
        assert_eq!(migrated, 1);
        assert_eq!(project.root(), repo.as_path());
        let store = project.store().unwrap();
        assert_eq!(store.mappings()[0].local_path, "docs/prd.md");
        assert_eq!(global.mappings().len(), 2);

        assert!(matches!(
            Project::init(&repo, &global, STATE),
            Err(ProjectError::AlreadyInitialized(_))
        ));
    }

    #[test]
    fn test_files_skip_hidden_directories() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::create_dir_all(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join(STATE), "").unwrap();
        fs::write(dir.path().join(".git").join("x.md"), "").unwrap();
        fs::write(dir.path().join("docs").join("b.md"), "").unwrap();
        fs::write(dir.path().join("a.md"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        let project = Project::discover(dir.path(), STATE).unwrap();
        let files: Vec<String> = project.files().map(|f| project.relative(&f)).collect();
        assert_eq!(files, vec!["a.md", "docs/b.md"]);
    }
}
