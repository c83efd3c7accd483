//! md-blocksync: Markdown to cloud block-document conversion and sync.
//!
//! This crate converts Markdown files into the block trees used by cloud
//! document stores and back, and keeps local files and remote documents in
//! step. It includes:
//!
//! - **Block model** - block kinds, inline text runs and the flat wire schema
//! - **Markdown codec** - parser to block trees and renderer from flat lists
//! - **Materializer** - replays a block tree as batched remote write calls
//! - **Sync engine** - change detection, conflict classification, push and pull
//! - **Project state** - per-repository state files with relative paths
//!
//! # Quick Start
//!
//! ```rust
//! use md_blocksync::{flatten, markdown_to_blocks, render};
//!
//! let blocks = markdown_to_blocks("# Hello\n\nWorld");
//! let markdown = render(&flatten("page", &blocks));
//! assert_eq!(markdown, "# Hello\n\nWorld\n");
//! ```

// Block model and wire schema
pub mod block;

// Explicit engine configuration
pub mod config;

// Markdown parser and renderer
pub mod doc;

// Block tree to remote write calls
pub mod materialize;

// Project-local state discovery
pub mod project;

// Remote store seam, in-memory store and write throttle
pub mod remote;

// State store, conflict detection and the sync engine
pub mod sync;

pub use block::{
    Block, BlockBody, BlockType, CodeLanguage, TextElement, TextRun, TextStyle, WireBlock,
    flatten,
};
pub use config::SyncConfig;
pub use doc::{markdown_to_blocks, render, render_tree};
pub use materialize::{MaterializeError, MaterializeReport, TreeMaterializer};
pub use project::{Project, ProjectError};
pub use remote::{DocumentInfo, DocumentStore, MemoryStore, RemoteError, Throttled, UpdateRequest};
pub use sync::{
    ConflictType, PushOptions, StatusEntry, SyncEngine, SyncError, SyncOutcome, SyncStateStore,
    SyncStatus,
};
