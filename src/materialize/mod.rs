//! Turns a locally built block tree into remote write calls.
//!
//! The remote store only creates flat sibling lists and caps table rows per
//! create call, so the tree is walked depth-first: runs of childless blocks
//! go out as one batch, containers are created bare and then filled, and
//! tables are grown row by row before their cells are populated in a single
//! batched update.

use crate::block::{Block, BlockBody, BlockType, TextElement};
use crate::config::SyncConfig;
use crate::remote::{DocumentStore, RemoteError, UpdateRequest};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("Failed to populate {failed} cell(s) of table {table_id}")]
    CellPopulation { table_id: String, failed: usize },
}

/// What a materialization did, including best-effort steps that failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializeReport {
    pub blocks_created: usize,
    pub tables: usize,
    /// Formatting steps (row inserts, column widths) that failed and were
    /// skipped.
    pub warnings: Vec<String>,
}

pub struct TreeMaterializer<'a, S: DocumentStore + ?Sized> {
    store: &'a S,
    document_id: &'a str,
    page_width: u32,
    max_rows_per_create: usize,
    create_batch_limit: usize,
}

impl<'a, S: DocumentStore + ?Sized> TreeMaterializer<'a, S> {
    pub fn new(store: &'a S, document_id: &'a str, config: &SyncConfig) -> Self {
        Self {
            store,
            document_id,
            page_width: config.page_width,
            max_rows_per_create: config.max_rows_per_create.max(1),
            create_batch_limit: config.create_batch_limit.max(1),
        }
    }

    /// Appends `blocks` under `parent_id`.
    pub fn materialize(
        &self,
        parent_id: &str,
        blocks: &[Block],
    ) -> Result<MaterializeReport, MaterializeError> {
        let mut report = MaterializeReport::default();
        self.materialize_into(parent_id, blocks, &mut report)?;
        Ok(report)
    }

    fn materialize_into(
        &self,
        parent_id: &str,
        blocks: &[Block],
        report: &mut MaterializeReport,
    ) -> Result<(), MaterializeError> {
        let mut pending: Vec<Block> = Vec::new();
        for block in blocks {
            if block.is_container() {
                self.flush(parent_id, &mut pending, report)?;
                if block.kind == BlockType::Table {
                    self.create_table(parent_id, block, report)?;
                } else {
                    self.create_container(parent_id, block, report)?;
                }
            } else {
                pending.push(block.clone());
                if pending.len() >= self.create_batch_limit {
                    self.flush(parent_id, &mut pending, report)?;
                }
            }
        }
        self.flush(parent_id, &mut pending, report)
    }

    fn flush(
        &self,
        parent_id: &str,
        pending: &mut Vec<Block>,
        report: &mut MaterializeReport,
    ) -> Result<(), MaterializeError> {
        if pending.is_empty() {
            return Ok(());
        }
        let created = self
            .store
            .create_children(self.document_id, parent_id, pending, None)?;
        report.blocks_created += created.len();
        pending.clear();
        Ok(())
    }

    fn create_container(
        &self,
        parent_id: &str,
        block: &Block,
        report: &mut MaterializeReport,
    ) -> Result<(), MaterializeError> {
        let created = self.store.create_children(
            self.document_id,
            parent_id,
            std::slice::from_ref(&block.shallow()),
            None,
        )?;
        report.blocks_created += created.len();
        let Some(container) = created.first() else {
            return Err(RemoteError::Api {
                code: 0,
                message: format!("create returned nothing for {}", block.kind),
            }
            .into());
        };
        self.materialize_into(&container.block_id, &block.children, report)
    }

    fn create_table(
        &self,
        parent_id: &str,
        block: &Block,
        report: &mut MaterializeReport,
    ) -> Result<(), MaterializeError> {
        let (rows, columns) = match &block.body {
            BlockBody::Table(body) => (body.property.row_size, body.property.column_size),
            _ => (0, 0),
        };
        let first_rows = rows.min(self.max_rows_per_create);
        let mut head = block.shallow();
        if let BlockBody::Table(body) = &mut head.body {
            body.property.row_size = first_rows;
            body.property.column_width.clear();
        }

        let created = self.store.create_children(
            self.document_id,
            parent_id,
            std::slice::from_ref(&head),
            None,
        )?;
        let Some(table) = created.first() else {
            return Err(RemoteError::Api {
                code: 0,
                message: "create returned no table".to_string(),
            }
            .into());
        };
        let table_id = table.block_id.clone();
        report.blocks_created += 1;
        report.tables += 1;
        debug!(
            document_id = self.document_id,
            table_id = %table_id,
            rows,
            columns,
            "created table"
        );

        for row_index in first_rows..rows {
            let request = UpdateRequest::InsertTableRow {
                block_id: table_id.clone(),
                row_index,
            };
            if let Err(err) = self.store.batch_update(self.document_id, &[request]) {
                warn!(
                    document_id = self.document_id,
                    table_id = %table_id,
                    row_index,
                    %err,
                    "row insert failed"
                );
                report
                    .warnings
                    .push(format!("row {row_index} of table {table_id}: {err}"));
            }
        }

        if columns > 0 {
            let width = self.page_width / columns as u32;
            for column_index in 0..columns {
                let request = UpdateRequest::SetColumnWidth {
                    block_id: table_id.clone(),
                    column_index,
                    width,
                };
                if let Err(err) = self.store.batch_update(self.document_id, &[request]) {
                    warn!(
                        document_id = self.document_id,
                        table_id = %table_id,
                        column_index,
                        %err,
                        "column resize failed"
                    );
                    report
                        .warnings
                        .push(format!("column {column_index} of table {table_id}: {err}"));
                }
            }
        }

        self.populate_cells(&table_id, &block.children)
    }

    fn populate_cells(
        &self,
        table_id: &str,
        cells: &[Block],
    ) -> Result<(), MaterializeError> {
        let remote_cells = self.store.get_block(self.document_id, table_id)?.children;

        let mut requests = Vec::new();
        let mut failed = 0;
        for (index, cell) in cells.iter().enumerate() {
            let elements = cell_elements(cell);
            if elements.iter().all(|e| e.content().is_some_and(str::is_empty)) {
                continue;
            }
            let Some(cell_id) = remote_cells.get(index) else {
                warn!(document_id = self.document_id, table_id, index, "cell missing remotely");
                failed += 1;
                continue;
            };
            match self.store.get_block(self.document_id, cell_id) {
                Ok(remote_cell) => match remote_cell.children.first() {
                    Some(text_id) => requests.push(UpdateRequest::ReplaceText {
                        block_id: text_id.clone(),
                        elements: elements.to_vec(),
                    }),
                    None => {
                        warn!(
                            document_id = self.document_id,
                            cell_id = %cell_id,
                            "cell has no text block"
                        );
                        failed += 1;
                    }
                },
                Err(err) => {
                    warn!(
                        document_id = self.document_id,
                        cell_id = %cell_id,
                        %err,
                        "cell fetch failed"
                    );
                    failed += 1;
                }
            }
        }

        if !requests.is_empty() {
            if let Err(err) = self.store.batch_update(self.document_id, &requests) {
                warn!(document_id = self.document_id, table_id, %err, "cell population failed");
                failed += requests.len();
            }
        }
        if failed > 0 {
            return Err(MaterializeError::CellPopulation {
                table_id: table_id.to_string(),
                failed,
            });
        }
        Ok(())
    }
}

/// Inline content of a local table cell: its first text-bearing child.
fn cell_elements(cell: &Block) -> &[TextElement] {
    cell.children
        .iter()
        .find(|child| !child.elements().is_empty() || child.kind.is_text_like())
        .map(Block::elements)
        .unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::markdown_to_blocks;
    use crate::remote::MemoryStore;
    use crate::remote::memory::{Call, FailPoint};

    fn setup() -> (MemoryStore, String) {
        let store = MemoryStore::new();
        let doc = store.create_document("t", None).unwrap().document_id;
        store.clear_calls();
        (store, doc)
    }

    #[test]
    fn test_flat_blocks_go_out_in_one_call() {
        let (store, doc) = setup();
        let blocks = markdown_to_blocks("# A\n\npara\n\n- one\n- two\n");
        let report = TreeMaterializer::new(&store, &doc, &SyncConfig::default())
            .materialize(&doc, &blocks)
            .unwrap();
        assert_eq!(report.blocks_created, 4);
        assert_eq!(store.calls().len(), 1);
    }

    #[test]
    fn test_batch_limit_splits_calls() {
        let (store, doc) = setup();
        let blocks = markdown_to_blocks("a\n\nb\n\nc\n\nd\n\ne\n");
        let config = SyncConfig::default().with_create_batch_limit(2);
        TreeMaterializer::new(&store, &doc, &config)
            .materialize(&doc, &blocks)
            .unwrap();
        assert_eq!(store.calls().len(), 3);
    }

    #[test]
    fn test_container_children_created_under_container() {
        let (store, doc) = setup();
        let blocks = markdown_to_blocks("before\n\n> quoted\n> more\n\nafter\n");
        TreeMaterializer::new(&store, &doc, &SyncConfig::default())
            .materialize(&doc, &blocks)
            .unwrap();
        let creates: Vec<(String, Vec<BlockType>)> = store
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::CreateChildren { parent_id, kinds } => Some((parent_id, kinds)),
                _ => None,
            })
            .collect();
        assert_eq!(creates.len(), 4);
        assert_eq!(creates[1].1, vec![BlockType::QuoteContainer]);
        assert_ne!(creates[2].0, doc);
        assert_eq!(creates[3].0, doc);
    }

    #[test]
    fn test_empty_cells_are_skipped() {
        let (store, doc) = setup();
        let blocks = markdown_to_blocks("| a | |\n| --- | --- |\n| | d |\n");
        TreeMaterializer::new(&store, &doc, &SyncConfig::default())
            .materialize(&doc, &blocks)
            .unwrap();
        let replaced: usize = store
            .calls()
            .iter()
            .filter_map(|call| match call {
                Call::BatchUpdate { requests } => Some(
                    requests
                        .iter()
                        .filter(|r| matches!(r, UpdateRequest::ReplaceText { .. }))
                        .count(),
                ),
                _ => None,
            })
            .sum();
        assert_eq!(replaced, 2);
    }

    #[test]
    fn test_column_resize_failure_is_best_effort() {
        let (store, doc) = setup();
        store.fail(FailPoint::SetColumnWidth);
        let blocks = markdown_to_blocks("| a | b |\n| --- | --- |\n| c | d |\n");
        let report = TreeMaterializer::new(&store, &doc, &SyncConfig::default())
            .materialize(&doc, &blocks)
            .unwrap();
        assert_eq!(report.tables, 1);
        assert_eq!(report.warnings.len(), 2);
    }

    #[test]
    fn test_cell_population_failure_surfaces() {
        let (store, doc) = setup();
        store.fail(FailPoint::ReplaceText);
        let blocks = markdown_to_blocks("| a | b |\n| --- | --- |\n| c | d |\n");
        let err = TreeMaterializer::new(&store, &doc, &SyncConfig::default())
            .materialize(&doc, &blocks)
            .unwrap_err();
        assert!(matches!(err, MaterializeError::CellPopulation { failed: 4, .. }));
    }

    #[test]
    fn test_create_failure_is_fatal() {
        let (store, doc) = setup();
        store.fail(FailPoint::CreateChildren);
        let err = TreeMaterializer::new(&store, &doc, &SyncConfig::default())
            .materialize(&doc, &markdown_to_blocks("text\n"))
            .unwrap_err();
        assert!(matches!(err, MaterializeError::Remote(_)));
    }
}
