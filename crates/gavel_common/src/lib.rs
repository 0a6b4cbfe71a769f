//! Gavel – Common primitives & helpers
//!
//! This crate is the canonical place for *shared* types used by every
//! component of the Gavel auction engine: domain records, the error
//! taxonomy, the event vocabulary and runtime configuration.  Keeping
//! them in an isolated crate avoids cyclic dependencies and makes sure
//! we never end up with two incompatible versions of `AuctionId` or
//! `BidError` floating around in the dependency graph.
//!
//! The crate purposefully stays *lightweight*: only foundational,
//! non-mechanism abstractions live here.  Anything that touches storage
//! or drives transactions belongs in `gavel_store` / `gavel_engine`.

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use crate::{
    config::EngineConfig,
    error::{BidError, Result},
    events::{AuctionEvent, EventBus},
    types::{
        AuctionConfig, AuctionId, AuctionRecord, AuctionState, AuctionStatus, AutoBidCeiling,
        BidLogEntry, BidLogStatus, ExtendRule, Money, UserId,
    },
};

/// Wildcard import for convenience.
///
/// Example:
/// ```ignore
/// use gavel_common::prelude::*;
/// ```
pub mod prelude {
    pub use super::{
        AuctionConfig, AuctionEvent, AuctionId, AuctionRecord, AuctionState, AuctionStatus,
        AutoBidCeiling, BidError, BidLogEntry, BidLogStatus, EngineConfig, EventBus, ExtendRule,
        Money, Result, UserId,
    };
}
