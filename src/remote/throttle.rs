//! Per-document write throttling.

use super::{DocumentInfo, DocumentStore, RemoteError, UpdateRequest};
use crate::block::{Block, WireBlock};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_WRITES_PER_WINDOW: usize = 3;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

/// Wraps a store so that at most `limit` write calls per sliding `window`
/// reach it for any one document. Callers over budget sleep until a slot
/// frees; reads are never delayed.
#[derive(Debug)]
pub struct Throttled<S> {
    inner: S,
    limit: usize,
    window: Duration,
    recent: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl<S> Throttled<S> {
    pub fn new(inner: S) -> Self {
        Self::with_limit(inner, DEFAULT_WRITES_PER_WINDOW, DEFAULT_WINDOW)
    }

    pub fn with_limit(inner: S, limit: usize, window: Duration) -> Self {
        Throttled {
            inner,
            limit: limit.max(1),
            window,
            recent: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn acquire(&self, document_id: &str) {
        loop {
            let wait = {
                let mut recent = self.recent.lock().unwrap_or_else(PoisonError::into_inner);
                let now = Instant::now();
                recent.retain(|_, stamps| {
                    while stamps
                        .front()
                        .is_some_and(|stamp| now.duration_since(*stamp) >= self.window)
                    {
                        stamps.pop_front();
                    }
                    !stamps.is_empty()
                });
                let stamps = recent.entry(document_id.to_string()).or_default();
                match stamps.front() {
                    Some(oldest) if stamps.len() >= self.limit => {
                        self.window.saturating_sub(now.duration_since(*oldest))
                    }
                    _ => {
                        stamps.push_back(now);
                        return;
                    }
                }
            };
            tracing::debug!(document_id, wait_ms = wait.as_millis() as u64, "write throttled");
            thread::sleep(wait);
        }
    }
}

impl<S: DocumentStore> DocumentStore for Throttled<S> {
    fn create_document(
        &self,
        title: &str,
        folder: Option<&str>,
    ) -> Result<DocumentInfo, RemoteError> {
        self.inner.create_document(title, folder)
    }

    fn get_document(&self, document_id: &str) -> Result<DocumentInfo, RemoteError> {
        self.inner.get_document(document_id)
    }

    fn list_all_blocks(&self, document_id: &str) -> Result<Vec<WireBlock>, RemoteError> {
        self.inner.list_all_blocks(document_id)
    }

    fn get_block(&self, document_id: &str, block_id: &str) -> Result<WireBlock, RemoteError> {
        self.inner.get_block(document_id, block_id)
    }

    fn create_children(
        &self,
        document_id: &str,
        parent_id: &str,
        blocks: &[Block],
        index: Option<usize>,
    ) -> Result<Vec<WireBlock>, RemoteError> {
        self.acquire(document_id);
        self.inner
            .create_children(document_id, parent_id, blocks, index)
    }

    fn batch_update(
        &self,
        document_id: &str,
        requests: &[UpdateRequest],
    ) -> Result<(), RemoteError> {
        self.acquire(document_id);
        self.inner.batch_update(document_id, requests)
    }

    fn batch_delete(
        &self,
        document_id: &str,
        parent_id: &str,
        start: usize,
        end: usize,
    ) -> Result<(), RemoteError> {
        self.acquire(document_id);
        self.inner.batch_delete(document_id, parent_id, start, end)
    }
}
