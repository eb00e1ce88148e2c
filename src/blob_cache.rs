//! Inline blob cache
//!
//! From protocol 19 the server may push small blobs inline with fetched rows
//! (`op_inline_blob`). Those payloads are held per transaction until the
//! blob is first opened, at which point the entry is consumed. Commit and
//! rollback drop every entry of the transaction.
//!
//! The cache never admits a blob larger than the per-blob inline limit and
//! refuses inserts that would exceed its byte budget.

use bytes::Bytes;
use indexmap::IndexMap;

use crate::blob::BlobId;

/// One cached inline blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedBlob {
    /// Blob info items as sent by the server
    pub info: Bytes,
    /// Payload with segment headers stripped
    pub data: Bytes,
}

impl CachedBlob {
    /// Bytes charged against the budget
    pub fn size(&self) -> usize {
        self.data.len() + self.info.len()
    }
}

/// Byte-bounded cache of inline blobs for one transaction
#[derive(Debug)]
pub struct InlineBlobCache {
    entries: IndexMap<BlobId, CachedBlob>,
    max_blob_size: usize,
    budget: usize,
    used: usize,
}

impl InlineBlobCache {
    /// Create a cache
    ///
    /// `max_blob_size` is the largest payload admitted; `budget` bounds the
    /// total cached bytes.
    pub fn new(max_blob_size: usize, budget: usize) -> Self {
        Self {
            entries: IndexMap::new(),
            max_blob_size,
            budget,
            used: 0,
        }
    }

    /// Store a blob; returns whether it was admitted
    pub fn insert(&mut self, id: BlobId, blob: CachedBlob) -> bool {
        if blob.data.len() > self.max_blob_size {
            tracing::trace!(blob_id = id.0, size = blob.data.len(), "inline blob exceeds size limit");
            return false;
        }
        let previous = self.entries.get(&id).map(CachedBlob::size).unwrap_or(0);
        if self.used - previous + blob.size() > self.budget {
            tracing::trace!(
                blob_id = id.0,
                size = blob.size(),
                used = self.used,
                budget = self.budget,
                "inline blob cache full, dropping newest entry"
            );
            return false;
        }
        self.used = self.used - previous + blob.size();
        self.entries.insert(id, blob);
        true
    }

    /// Remove and return the entry for `id`
    pub fn take(&mut self, id: BlobId) -> Option<CachedBlob> {
        let blob = self.entries.shift_remove(&id)?;
        self.used -= blob.size();
        Some(blob)
    }

    /// Peek at the entry for `id` without consuming it
    pub fn get(&self, id: BlobId) -> Option<&CachedBlob> {
        self.entries.get(&id)
    }

    /// Whether an entry for `id` is cached
    pub fn contains(&self, id: BlobId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
        self.used = 0;
    }

    /// Number of cached blobs
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes currently cached
    pub fn used(&self) -> usize {
        self.used
    }
}
