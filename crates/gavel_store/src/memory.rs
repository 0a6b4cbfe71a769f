//! An in-memory, thread-safe store backed by a versioned `HashMap`.
//! Meant for tests / local development, *not* production.
//!
//! Every key carries a monotonically increasing version.  A transaction
//! records the version of everything it reads; commit takes the write
//! lock, re-checks those versions and aborts with `Conflict` if any
//! concurrent committer got there first.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::kv::{CommitError, Key, KvStore, KvTransaction, StoreError};

/// Version 0 means "key absent"; the first write stores version 1.
type VersionedMap = Arc<RwLock<HashMap<Vec<u8>, (u64, Vec<u8>)>>>;

#[derive(Clone, Default)]
pub struct MemoryKvStore {
    map: VersionedMap,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn begin(&self) -> Result<Box<dyn KvTransaction>, StoreError> {
        Ok(Box::new(MemoryTransaction {
            map: Arc::clone(&self.map),
            reads: Vec::new(),
            writes: Vec::new(),
        }))
    }

    async fn snapshot(&self, key: &Key) -> Result<Option<Vec<u8>>, StoreError> {
        let map = self.map.read().await;
        Ok(map.get(&key.encode()).map(|(_, bytes)| bytes.clone()))
    }
}

struct MemoryTransaction {
    map: VersionedMap,
    /// `(encoded key, observed version)` for commit-time validation.
    reads: Vec<(Vec<u8>, u64)>,
    /// Buffered writes, applied in order on commit.
    writes: Vec<(Vec<u8>, Vec<u8>)>,
}

#[async_trait]
impl KvTransaction for MemoryTransaction {
    async fn read(&mut self, key: &Key) -> Result<Option<Vec<u8>>, StoreError> {
        let encoded = key.encode();

        // Read-your-writes within the same transaction.
        if let Some((_, bytes)) = self.writes.iter().rev().find(|(k, _)| *k == encoded) {
            return Ok(Some(bytes.clone()));
        }

        let map = self.map.read().await;
        let (version, value) = match map.get(&encoded) {
            Some((version, bytes)) => (*version, Some(bytes.clone())),
            None => (0, None),
        };
        if !self.reads.iter().any(|(k, _)| *k == encoded) {
            self.reads.push((encoded, version));
        }
        Ok(value)
    }

    fn write(&mut self, key: Key, value: Vec<u8>) {
        self.writes.push((key.encode(), value));
    }

    async fn commit(self: Box<Self>) -> Result<(), CommitError> {
        let mut map = self.map.write().await;

        for (key, observed) in &self.reads {
            let current = map.get(key).map(|(v, _)| *v).unwrap_or(0);
            if current != *observed {
                return Err(CommitError::Conflict);
            }
        }

        for (key, value) in self.writes {
            let next = map.get(&key).map(|(v, _)| *v + 1).unwrap_or(1);
            let _ = map.insert(key, (next, value));
        }
        Ok(())
    }
}
