//! Transactional key-value storage for the Gavel auction engine.
//!
//! The engine is stateless: every operation is a read-modify-write
//! transaction against a store implementing [`KvStore`].  Correctness
//! under concurrent bidders comes from the store's commit-time conflict
//! detection, not from in-process locks, which is what lets any number
//! of engine instances run behind a load balancer.
//!
//! Two implementations ship out of the box:
//! * [`MemoryKvStore`] - versioned map for unit tests and local dev.
//! * [`SledKvStore`] - embedded, durable backend on `sled`.

pub mod kv;
pub mod memory;
pub mod sled_store;

pub use kv::{
    read_record, snapshot_record, write_record, CommitError, Key, KvStore, KvTransaction,
    StoreError,
};
pub use memory::MemoryKvStore;
pub use sled_store::SledKvStore;
