//! Store traits and the key layout.
//!
//! The contract is the minimum the engine needs from any transactional
//! backend: `begin` → snapshot `read`s → buffered `write`s → `commit`
//! that either applies everything atomically or reports a conflict with
//! a concurrent committer.  Reads record the version they observed;
//! commit re-validates the whole read set (first committer wins).

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use gavel_common::types::{AuctionId, UserId};

/// Non-conflict storage failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("codec error: {0}")]
    Codec(String),
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Codec(err.to_string())
    }
}

/// Outcome of a commit attempt.
#[derive(Debug, Error)]
pub enum CommitError {
    /// Another transaction committed between our read and our write.
    /// The whole operation must be retried against fresh state.
    #[error("conflicting write transaction")]
    Conflict,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Every record the engine persists, with a stable byte encoding:
/// a tag byte followed by big-endian components, so related entries
/// sort together under range scans.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    /// The contended `AuctionRecord` for one auction.
    Auction(AuctionId),
    /// List of every auction id, walked by the sweep loop.
    AuctionIndex,
    /// One append-only bid-log entry.
    BidLog(AuctionId, u64),
    /// One user's private max-bid ceiling.
    Ceiling(AuctionId, UserId),
    /// Users holding a ceiling on this auction.
    CeilingIndex(AuctionId),
}

const TAG_AUCTION: u8 = 0x01;
const TAG_AUCTION_INDEX: u8 = 0x02;
const TAG_BID_LOG: u8 = 0x03;
const TAG_CEILING: u8 = 0x04;
const TAG_CEILING_INDEX: u8 = 0x05;

impl Key {
    /// Stable byte encoding used verbatim by every backend.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Key::Auction(id) => {
                let mut out = Vec::with_capacity(17);
                out.push(TAG_AUCTION);
                out.extend_from_slice(id.as_bytes());
                out
            }
            Key::AuctionIndex => vec![TAG_AUCTION_INDEX],
            Key::BidLog(id, seq) => {
                let mut out = Vec::with_capacity(25);
                out.push(TAG_BID_LOG);
                out.extend_from_slice(id.as_bytes());
                out.extend_from_slice(&seq.to_be_bytes());
                out
            }
            Key::Ceiling(id, user) => {
                let mut out = Vec::with_capacity(33);
                out.push(TAG_CEILING);
                out.extend_from_slice(id.as_bytes());
                out.extend_from_slice(user.as_bytes());
                out
            }
            Key::CeilingIndex(id) => {
                let mut out = Vec::with_capacity(17);
                out.push(TAG_CEILING_INDEX);
                out.extend_from_slice(id.as_bytes());
                out
            }
        }
    }
}

/// One atomic unit of work against the store.
///
/// Writes are buffered until `commit`; reads see this transaction's own
/// buffered writes first, then the store snapshot.
#[async_trait]
pub trait KvTransaction: Send {
    /// Read a value, recording the observed version for commit-time
    /// validation.
    async fn read(&mut self, key: &Key) -> Result<Option<Vec<u8>>, StoreError>;

    /// Buffer a write; nothing is visible to other transactions until
    /// `commit` succeeds.
    fn write(&mut self, key: Key, value: Vec<u8>);

    /// Validate the read set and apply every buffered write atomically.
    async fn commit(self: Box<Self>) -> Result<(), CommitError>;
}

/// A transactional key-value backend.
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    async fn begin(&self) -> Result<Box<dyn KvTransaction>, StoreError>;

    /// Read-only snapshot outside any transaction, for audit and state
    /// queries that tolerate a slightly stale view.
    async fn snapshot(&self, key: &Key) -> Result<Option<Vec<u8>>, StoreError>;
}

/// Typed read helper over the byte-level transaction API.
pub async fn read_record<T: DeserializeOwned>(
    txn: &mut dyn KvTransaction,
    key: &Key,
) -> Result<Option<T>, StoreError> {
    match txn.read(key).await? {
        Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
        None => Ok(None),
    }
}

/// Typed write helper over the byte-level transaction API.
pub fn write_record<T: Serialize>(
    txn: &mut dyn KvTransaction,
    key: Key,
    value: &T,
) -> Result<(), StoreError> {
    let bytes = bincode::serialize(value)?;
    txn.write(key, bytes);
    Ok(())
}

/// Typed snapshot helper.
pub async fn snapshot_record<T: DeserializeOwned, S: KvStore + ?Sized>(
    store: &S,
    key: &Key,
) -> Result<Option<T>, StoreError> {
    match store.snapshot(key).await? {
        Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
        None => Ok(None),
    }
}
