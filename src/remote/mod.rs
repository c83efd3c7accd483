//! Remote document store abstraction.
//!
//! The network-backed client lives outside this crate. [`memory::MemoryStore`]
//! is the in-process implementation used by tests and offline tooling, and
//! [`throttle::Throttled`] wraps any store with the per-document write budget.

use crate::block::{Block, TextElement, WireBlock};
use serde::{Deserialize, Serialize};

pub mod memory;
pub mod throttle;

pub use memory::MemoryStore;
pub use throttle::Throttled;

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("Remote API error {code}: {message}")]
    Api { code: i64, message: String },
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Document metadata as reported by the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub document_id: String,
    pub title: String,
    /// Incremented by the store on every content change.
    pub revision: u64,
    #[serde(default)]
    pub url: String,
}

/// One entry of a batched block update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateRequest {
    /// Replace the inline elements of a text-bearing block.
    ReplaceText {
        block_id: String,
        elements: Vec<TextElement>,
    },
    /// Insert one empty row into a table before `row_index`.
    InsertTableRow { block_id: String, row_index: usize },
    /// Set the width in pixels of one table column.
    SetColumnWidth {
        block_id: String,
        column_index: usize,
        width: u32,
    },
}

impl UpdateRequest {
    pub fn block_id(&self) -> &str {
        match self {
            UpdateRequest::ReplaceText { block_id, .. }
            | UpdateRequest::InsertTableRow { block_id, .. }
            | UpdateRequest::SetColumnWidth { block_id, .. } => block_id,
        }
    }
}

/// Document and block operations offered by a remote store.
///
/// `create_children` accepts flat sibling lists only: every block passed in
/// must have no children of its own. Tables are created with their cells
/// pre-populated with one empty text block each.
pub trait DocumentStore: Send + Sync {
    fn create_document(&self, title: &str, folder: Option<&str>)
    -> Result<DocumentInfo, RemoteError>;

    fn get_document(&self, document_id: &str) -> Result<DocumentInfo, RemoteError>;

    /// Every block of the document, page block included, in document order.
    fn list_all_blocks(&self, document_id: &str) -> Result<Vec<WireBlock>, RemoteError>;

    fn get_block(&self, document_id: &str, block_id: &str) -> Result<WireBlock, RemoteError>;

    /// Creates `blocks` under `parent_id` at `index` (appended when `None`)
    /// and returns them in the order given.
    fn create_children(
        &self,
        document_id: &str,
        parent_id: &str,
        blocks: &[Block],
        index: Option<usize>,
    ) -> Result<Vec<WireBlock>, RemoteError>;

    fn batch_update(&self, document_id: &str, requests: &[UpdateRequest])
    -> Result<(), RemoteError>;

    /// Deletes the children of `parent_id` in the half-open range
    /// `start..end`.
    fn batch_delete(
        &self,
        document_id: &str,
        parent_id: &str,
        start: usize,
        end: usize,
    ) -> Result<(), RemoteError>;
}

impl<S: DocumentStore + ?Sized> DocumentStore for &S {
    fn create_document(
        &self,
        title: &str,
        folder: Option<&str>,
    ) -> Result<DocumentInfo, RemoteError> {
        (**self).create_document(title, folder)
    }

    fn get_document(&self, document_id: &str) -> Result<DocumentInfo, RemoteError> {
        (**self).get_document(document_id)
    }

    fn list_all_blocks(&self, document_id: &str) -> Result<Vec<WireBlock>, RemoteError> {
        (**self).list_all_blocks(document_id)
    }

    fn get_block(&self, document_id: &str, block_id: &str) -> Result<WireBlock, RemoteError> {
        (**self).get_block(document_id, block_id)
    }

    fn create_children(
        &self,
        document_id: &str,
        parent_id: &str,
        blocks: &[Block],
        index: Option<usize>,
    ) -> Result<Vec<WireBlock>, RemoteError> {
        (**self).create_children(document_id, parent_id, blocks, index)
    }

    fn batch_update(
        &self,
        document_id: &str,
        requests: &[UpdateRequest],
    ) -> Result<(), RemoteError> {
        (**self).batch_update(document_id, requests)
    }

    fn batch_delete(
        &self,
        document_id: &str,
        parent_id: &str,
        start: usize,
        end: usize,
    ) -> Result<(), RemoteError> {
        (**self).batch_delete(document_id, parent_id, start, end)
    }
}
