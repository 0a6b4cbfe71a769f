//! Embedded, durable backend on `sled`.
//!
//! Values are stored as `[8-byte BE version][payload]`.  Reads happen
//! against the live tree and remember the version they saw; commit runs
//! a sled transaction that re-checks every one of those versions before
//! applying the buffered writes, so a concurrent committer surfaces as
//! `CommitError::Conflict` exactly like on any other backend.

use async_trait::async_trait;
use sled::{
    transaction::{ConflictableTransactionError, TransactionError},
    Db, Tree,
};

use crate::kv::{CommitError, Key, KvStore, KvTransaction, StoreError};

const TREE_NAME: &str = "gavel";

fn encode_versioned(version: u64, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + payload.len());
    out.extend_from_slice(&version.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

fn decode_versioned(raw: &[u8]) -> Result<(u64, Vec<u8>), StoreError> {
    if raw.len() < 8 {
        return Err(StoreError::Codec("versioned value shorter than header".into()));
    }
    let (header, payload) = raw.split_at(8);
    let version = u64::from_be_bytes(header.try_into().expect("8 bytes"));
    Ok((version, payload.to_vec()))
}

pub struct SledKvStore {
    db: Db,
    tree: Tree,
}

impl SledKvStore {
    /// Open or create a store at `path`.
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|e| StoreError::Backend(e.to_string()))?;
        let tree = db
            .open_tree(TREE_NAME)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { db, tree })
    }

    /// Ephemeral store living in a temp dir, dropped on close.  For
    /// tests and local experimentation.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let tree = db
            .open_tree(TREE_NAME)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { db, tree })
    }
}

#[async_trait]
impl KvStore for SledKvStore {
    async fn begin(&self) -> Result<Box<dyn KvTransaction>, StoreError> {
        Ok(Box::new(SledTransaction {
            tree: self.tree.clone(),
            reads: Vec::new(),
            writes: Vec::new(),
        }))
    }

    async fn snapshot(&self, key: &Key) -> Result<Option<Vec<u8>>, StoreError> {
        match self
            .tree
            .get(key.encode())
            .map_err(|e| StoreError::Backend(e.to_string()))?
        {
            Some(ivec) => {
                let (_, payload) = decode_versioned(&ivec)?;
                Ok(Some(payload))
            }
            None => Ok(None),
        }
    }
}

impl Drop for SledKvStore {
    fn drop(&mut self) {
        // Best effort; temporary stores discard the data anyway.
        let _ = self.db.flush();
    }
}

/// Reason a sled transaction closure bailed out.
enum Abort {
    Conflict,
    Codec(String),
}

struct SledTransaction {
    tree: Tree,
    reads: Vec<(Vec<u8>, u64)>,
    writes: Vec<(Vec<u8>, Vec<u8>)>,
}

#[async_trait]
impl KvTransaction for SledTransaction {
    async fn read(&mut self, key: &Key) -> Result<Option<Vec<u8>>, StoreError> {
        let encoded = key.encode();

        if let Some((_, bytes)) = self.writes.iter().rev().find(|(k, _)| *k == encoded) {
            return Ok(Some(bytes.clone()));
        }

        let (version, value) = match self
            .tree
            .get(&encoded)
            .map_err(|e| StoreError::Backend(e.to_string()))?
        {
            Some(ivec) => {
                let (version, payload) = decode_versioned(&ivec)?;
                (version, Some(payload))
            }
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
        let SledTransaction { tree, reads, writes } = *self;

        let result = tree.transaction(|tx| {
            for (key, observed) in &reads {
                let current = match tx.get(key.as_slice())? {
                    Some(ivec) => decode_versioned(&ivec)
                        .map_err(|e| {
                            ConflictableTransactionError::Abort(Abort::Codec(e.to_string()))
                        })?
                        .0,
                    None => 0,
                };
                if current != *observed {
                    return Err(ConflictableTransactionError::Abort(Abort::Conflict));
                }
            }
            for (key, value) in &writes {
                let current = match tx.get(key.as_slice())? {
                    Some(ivec) => decode_versioned(&ivec)
                        .map_err(|e| {
                            ConflictableTransactionError::Abort(Abort::Codec(e.to_string()))
                        })?
                        .0,
                    None => 0,
                };
                let _ = tx.insert(key.as_slice(), encode_versioned(current + 1, value))?;
            }
            Ok(())
        });

        match result {
            Ok(()) => {
                tree.flush()
                    .map_err(|e| CommitError::Store(StoreError::Backend(e.to_string())))?;
                Ok(())
            }
            Err(TransactionError::Abort(Abort::Conflict)) => Err(CommitError::Conflict),
            Err(TransactionError::Abort(Abort::Codec(msg))) => {
                Err(CommitError::Store(StoreError::Codec(msg)))
            }
            Err(TransactionError::Storage(e)) => {
                Err(CommitError::Store(StoreError::Backend(e.to_string())))
            }
        }
    }
}
