//! In-memory document store.
//!
//! Behaves like the remote store where it matters to callers: flat sibling
//! creation only, at most [`MAX_CREATE_ROWS`] table rows per create call,
//! tables born with empty cells, and a revision bump on every write. Every
//! call is recorded so tests can count round trips, and individual
//! operations can be made to fail.

use super::{DocumentInfo, DocumentStore, RemoteError, UpdateRequest};
use crate::block::{Block, BlockBody, BlockType, TextElement, WireBlock};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

/// Largest table the store accepts in a single create call.
pub const MAX_CREATE_ROWS: usize = 9;

const DEFAULT_COLUMN_WIDTH: u32 = 100;

/// A recorded store call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateDocument { title: String },
    GetDocument { document_id: String },
    ListBlocks { document_id: String },
    GetBlock { block_id: String },
    CreateChildren { parent_id: String, kinds: Vec<BlockType> },
    BatchUpdate { requests: Vec<UpdateRequest> },
    BatchDelete { parent_id: String, start: usize, end: usize },
}

/// Operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    CreateDocument,
    GetDocument,
    ListBlocks,
    GetBlock,
    CreateChildren,
    ReplaceText,
    InsertTableRow,
    SetColumnWidth,
    BatchDelete,
}

#[derive(Debug)]
struct Document {
    info: DocumentInfo,
    blocks: HashMap<String, WireBlock>,
}

impl Document {
    fn block_mut(&mut self, block_id: &str) -> Result<&mut WireBlock, RemoteError> {
        self.blocks.get_mut(block_id).ok_or_else(|| RemoteError::NotFound {
            kind: "block",
            id: block_id.to_string(),
        })
    }

    fn remove_subtree(&mut self, block_id: &str) {
        if let Some(block) = self.blocks.remove(block_id) {
            for child in &block.children {
                self.remove_subtree(child);
            }
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    documents: HashMap<String, Document>,
    next_id: u64,
    calls: Vec<Call>,
    failures: HashSet<FailPoint>,
}

impl Inner {
    fn fresh_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }

    fn check(&self, point: FailPoint) -> Result<(), RemoteError> {
        if self.failures.contains(&point) {
            return Err(RemoteError::Api {
                code: 500,
                message: format!("injected failure: {point:?}"),
            });
        }
        Ok(())
    }

    fn document_mut(&mut self, document_id: &str) -> Result<&mut Document, RemoteError> {
        self.documents
            .get_mut(document_id)
            .ok_or_else(|| RemoteError::NotFound {
                kind: "document",
                id: document_id.to_string(),
            })
    }

    /// Creates `count` empty cells (each holding one empty text block) under
    /// `table_id` and returns their ids.
    fn new_cells(
        &mut self,
        document_id: &str,
        table_id: &str,
        count: usize,
    ) -> Result<Vec<String>, RemoteError> {
        let mut created = Vec::with_capacity(count);
        for _ in 0..count {
            let cell_id = self.fresh_id("cell");
            let text_id = self.fresh_id("blk");
            let document = self.document_mut(document_id)?;
            document.blocks.insert(
                text_id.clone(),
                WireBlock::new(
                    text_id.as_str(),
                    cell_id.as_str(),
                    BlockType::Text,
                    BlockBody::text(Vec::new()),
                ),
            );
            document.blocks.insert(
                cell_id.clone(),
                WireBlock::new(
                    cell_id.as_str(),
                    table_id,
                    BlockType::TableCell,
                    BlockBody::Empty,
                )
                .with_children([text_id]),
            );
            created.push(cell_id);
        }
        Ok(created)
    }
}

/// Thread-safe in-memory [`DocumentStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> T {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut inner)
    }

    /// Calls recorded since creation or the last [`MemoryStore::clear_calls`].
    pub fn calls(&self) -> Vec<Call> {
        self.with(|inner| inner.calls.clone())
    }

    pub fn clear_calls(&self) {
        self.with(|inner| inner.calls.clear());
    }

    /// Makes every later call of `point` fail until cleared.
    pub fn fail(&self, point: FailPoint) {
        self.with(|inner| inner.failures.insert(point));
    }

    pub fn clear_failures(&self) {
        self.with(|inner| inner.failures.clear());
    }

    /// Simulates an edit made by someone else: appends a paragraph to the
    /// page and bumps the revision.
    pub fn append_remote_paragraph(
        &self,
        document_id: &str,
        text: &str,
    ) -> Result<(), RemoteError> {
        self.with(|inner| {
            let block_id = inner.fresh_id("blk");
            let document = inner.document_mut(document_id)?;
            document.blocks.insert(
                block_id.clone(),
                WireBlock::new(
                    block_id.as_str(),
                    document_id,
                    BlockType::Text,
                    BlockBody::text(vec![TextElement::plain(text)]),
                ),
            );
            document.block_mut(document_id)?.children.push(block_id);
            document.info.revision += 1;
            Ok(())
        })
    }
}

impl DocumentStore for MemoryStore {
    fn create_document(
        &self,
        title: &str,
        _folder: Option<&str>,
    ) -> Result<DocumentInfo, RemoteError> {
        self.with(|inner| {
            inner.calls.push(Call::CreateDocument {
                title: title.to_string(),
            });
            inner.check(FailPoint::CreateDocument)?;
            let document_id = inner.fresh_id("doc");
            let info = DocumentInfo {
                document_id: document_id.clone(),
                title: title.to_string(),
                revision: 1,
                url: format!("memory://docs/{document_id}"),
            };
            let page = WireBlock::new(
                document_id.as_str(),
                "",
                BlockType::Page,
                BlockBody::text(vec![TextElement::plain(title)]),
            );
            let mut blocks = HashMap::new();
            blocks.insert(document_id.clone(), page);
            inner.documents.insert(
                document_id,
                Document {
                    info: info.clone(),
                    blocks,
                },
            );
            Ok(info)
        })
    }

    fn get_document(&self, document_id: &str) -> Result<DocumentInfo, RemoteError> {
        self.with(|inner| {
            inner.calls.push(Call::GetDocument {
                document_id: document_id.to_string(),
            });
            inner.check(FailPoint::GetDocument)?;
            Ok(inner.document_mut(document_id)?.info.clone())
        })
    }

    fn list_all_blocks(&self, document_id: &str) -> Result<Vec<WireBlock>, RemoteError> {
        self.with(|inner| {
            inner.calls.push(Call::ListBlocks {
                document_id: document_id.to_string(),
            });
            inner.check(FailPoint::ListBlocks)?;
            let document = inner.document_mut(document_id)?;
            let mut listed = Vec::with_capacity(document.blocks.len());
            let mut stack = vec![document_id.to_string()];
            while let Some(block_id) = stack.pop() {
                if let Some(block) = document.blocks.get(&block_id) {
                    stack.extend(block.children.iter().rev().cloned());
                    listed.push(block.clone());
                }
            }
            Ok(listed)
        })
    }

    fn get_block(&self, document_id: &str, block_id: &str) -> Result<WireBlock, RemoteError> {
        self.with(|inner| {
            inner.calls.push(Call::GetBlock {
                block_id: block_id.to_string(),
            });
            inner.check(FailPoint::GetBlock)?;
            Ok(inner.document_mut(document_id)?.block_mut(block_id)?.clone())
        })
    }

    fn create_children(
        &self,
        document_id: &str,
        parent_id: &str,
        blocks: &[Block],
        index: Option<usize>,
    ) -> Result<Vec<WireBlock>, RemoteError> {
        self.with(|inner| {
            inner.calls.push(Call::CreateChildren {
                parent_id: parent_id.to_string(),
                kinds: blocks.iter().map(|b| b.kind).collect(),
            });
            inner.check(FailPoint::CreateChildren)?;
            inner.document_mut(document_id)?.block_mut(parent_id)?;
            for block in blocks {
                if !block.children.is_empty() {
                    return Err(RemoteError::Api {
                        code: 400,
                        message: "nested children are not accepted".to_string(),
                    });
                }
                if let BlockBody::Table(table) = &block.body {
                    if table.property.row_size > MAX_CREATE_ROWS {
                        return Err(RemoteError::Api {
                            code: 400,
                            message: format!(
                                "table row_size {} exceeds {MAX_CREATE_ROWS}",
                                table.property.row_size
                            ),
                        });
                    }
                }
            }

            let mut created = Vec::with_capacity(blocks.len());
            for block in blocks {
                let block_id = inner.fresh_id("blk");
                let mut wire =
                    WireBlock::new(block_id.as_str(), parent_id, block.kind, block.body.clone());
                if let BlockBody::Table(table) = &block.body {
                    let count = table.property.row_size * table.property.column_size;
                    wire.children = inner.new_cells(document_id, &block_id, count)?;
                }
                inner.document_mut(document_id)?.blocks.insert(block_id, wire.clone());
                created.push(wire);
            }

            let document = inner.document_mut(document_id)?;
            let parent = document.block_mut(parent_id)?;
            let at = index.unwrap_or(parent.children.len()).min(parent.children.len());
            let tail = parent.children.split_off(at);
            parent
                .children
                .extend(created.iter().map(|b| b.block_id.clone()));
            parent.children.extend(tail);
            document.info.revision += 1;
            Ok(created)
        })
    }

    fn batch_update(
        &self,
        document_id: &str,
        requests: &[UpdateRequest],
    ) -> Result<(), RemoteError> {
        self.with(|inner| {
            inner.calls.push(Call::BatchUpdate {
                requests: requests.to_vec(),
            });
            for request in requests {
                inner.check(match request {
                    UpdateRequest::ReplaceText { .. } => FailPoint::ReplaceText,
                    UpdateRequest::InsertTableRow { .. } => FailPoint::InsertTableRow,
                    UpdateRequest::SetColumnWidth { .. } => FailPoint::SetColumnWidth,
                })?;
            }
            inner.document_mut(document_id)?;
            for request in requests {
                match request {
                    UpdateRequest::ReplaceText { block_id, elements } => {
                        let block = inner.document_mut(document_id)?.block_mut(block_id)?;
                        match &mut block.body {
                            BlockBody::Text(body) => body.elements = elements.clone(),
                            BlockBody::Todo(body) => body.elements = elements.clone(),
                            BlockBody::Code(body) => body.elements = elements.clone(),
                            _ => {
                                return Err(RemoteError::Api {
                                    code: 400,
                                    message: format!("block {block_id} has no text"),
                                });
                            }
                        }
                    }
                    UpdateRequest::InsertTableRow { block_id, row_index } => {
                        let table = inner.document_mut(document_id)?.block_mut(block_id)?;
                        let (rows, columns) = match &table.body {
                            BlockBody::Table(table) => {
                                (table.property.row_size, table.property.column_size)
                            }
                            _ => {
                                return Err(RemoteError::Api {
                                    code: 400,
                                    message: format!("block {block_id} is not a table"),
                                });
                            }
                        };
                        let cells = inner.new_cells(document_id, block_id, columns)?;
                        let table = inner.document_mut(document_id)?.block_mut(block_id)?;
                        let at = (*row_index).min(rows) * columns;
                        let tail = table.children.split_off(at.min(table.children.len()));
                        table.children.extend(cells);
                        table.children.extend(tail);
                        if let BlockBody::Table(body) = &mut table.body {
                            body.property.row_size += 1;
                        }
                    }
                    UpdateRequest::SetColumnWidth {
                        block_id,
                        column_index,
                        width,
                    } => {
                        let table = inner.document_mut(document_id)?.block_mut(block_id)?;
                        let BlockBody::Table(body) = &mut table.body else {
                            return Err(RemoteError::Api {
                                code: 400,
                                message: format!("block {block_id} is not a table"),
                            });
                        };
                        let property = &mut body.property;
                        if *column_index >= property.column_size {
                            return Err(RemoteError::Api {
                                code: 400,
                                message: format!("column {column_index} out of range"),
                            });
                        }
                        property
                            .column_width
                            .resize(property.column_size, DEFAULT_COLUMN_WIDTH);
                        property.column_width[*column_index] = *width;
                    }
                }
            }
            inner.document_mut(document_id)?.info.revision += 1;
            Ok(())
        })
    }

    fn batch_delete(
        &self,
        document_id: &str,
        parent_id: &str,
        start: usize,
        end: usize,
    ) -> Result<(), RemoteError> {
        self.with(|inner| {
            inner.calls.push(Call::BatchDelete {
                parent_id: parent_id.to_string(),
                start,
                end,
            });
            inner.check(FailPoint::BatchDelete)?;
            let document = inner.document_mut(document_id)?;
            let parent = document.block_mut(parent_id)?;
            if start > end || end > parent.children.len() {
                return Err(RemoteError::Api {
                    code: 400,
                    message: format!(
                        "range {start}..{end} out of bounds for {} children",
                        parent.children.len()
                    ),
                });
            }
            let removed: Vec<String> = parent.children.drain(start..end).collect();
            for block_id in removed {
                document.remove_subtree(&block_id);
            }
            document.info.revision += 1;
            Ok(())
        })
    }
}
