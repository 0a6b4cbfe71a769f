//! Canonical, cross-crate types for the Gavel auction engine.
//!
//! This module is **dependency-light** and **stable**, making it safe to
//! be imported by every service and tool that talks to the engine.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Simple aliases
// ----------------------------------------------------------------------------

/// Monetary amount in the platform's smallest denomination (e.g. satang).
///
/// 128 bits is enough for any realistic listing price and keeps the
/// increment arithmetic overflow-free without checked ops on hot paths.
pub type Money = u128;

// ----------------------------------------------------------------------------
// Primitive new-types
// ----------------------------------------------------------------------------

/// Unique identifier of one auction listing.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AuctionId(Uuid);

impl AuctionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for AuctionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AuctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique identifier of a bidder / ceiling owner.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ----------------------------------------------------------------------------
// Auction configuration
// ----------------------------------------------------------------------------

/// Anti-snipe deadline extension rule.
///
/// Windows are stored as whole seconds so the record stays trivially
/// serializable; use the accessors when doing timestamp arithmetic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendRule {
    pub enabled: bool,
    pub trigger_window_secs: u64,
    pub extend_by_secs: u64,
}

impl ExtendRule {
    /// Rule that never extends, for fixed-deadline auctions.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            trigger_window_secs: 0,
            extend_by_secs: 0,
        }
    }

    pub fn trigger_window(&self) -> Duration {
        Duration::seconds(self.trigger_window_secs as i64)
    }

    pub fn extend_by(&self) -> Duration {
        Duration::seconds(self.extend_by_secs as i64)
    }
}

/// Immutable auction parameters.
///
/// The one exception is `end_time`, which the anti-snipe extender may
/// push forward while the auction is active.  Nothing else mutates a
/// config after the auction is created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionConfig {
    pub start_price: Money,
    /// Minimum step between bids; must be > 0.
    pub bid_increment: Money,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub extend_rule: ExtendRule,
}

// ----------------------------------------------------------------------------
// Auction live state
// ----------------------------------------------------------------------------

/// The finite set of phases an auction can occupy.
///
/// `Ended` and `Cancelled` are terminal.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum AuctionStatus {
    Scheduled,
    Active,
    Ended,
    Cancelled,
}

impl fmt::Display for AuctionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuctionStatus::Scheduled => "scheduled",
            AuctionStatus::Active => "active",
            AuctionStatus::Ended => "ended",
            AuctionStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// The single mutable record contended over by concurrent bidders.
///
/// Invariants:
/// * `current_price` is monotonically non-decreasing.
/// * `total_bids` equals the count of `Valid` bid-log entries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionState {
    pub current_price: Money,
    pub last_bidder_id: Option<UserId>,
    pub total_bids: u64,
    pub status: AuctionStatus,
}

/// Config and state of one auction, stored as a single versioned KV
/// record so a bid transaction reads and compare-and-swaps them as one
/// unit.  `log_len` tracks the next bid-log sequence number; it can run
/// ahead of `total_bids` when compensating `Reversed` entries are
/// appended after a cancellation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionRecord {
    pub config: AuctionConfig,
    pub state: AuctionState,
    pub log_len: u64,
}

impl AuctionRecord {
    /// Fresh record for a newly created auction.
    pub fn new(config: AuctionConfig, now: DateTime<Utc>) -> Self {
        let status = if now >= config.start_time {
            AuctionStatus::Active
        } else {
            AuctionStatus::Scheduled
        };
        let current_price = config.start_price;
        Self {
            config,
            state: AuctionState {
                current_price,
                last_bidder_id: None,
                total_bids: 0,
                status,
            },
            log_len: 0,
        }
    }

    /// Smallest amount the next bid must reach to be accepted.
    pub fn minimum_next_bid(&self) -> Money {
        self.state.current_price + self.config.bid_increment
    }
}

// ----------------------------------------------------------------------------
// Bid log
// ----------------------------------------------------------------------------

/// Disposition of a bid-log entry.  Entries are never mutated or
/// deleted; corrections append a `Reversed` compensating entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum BidLogStatus {
    Valid,
    Rejected,
    Reversed,
}

/// Append-only audit record, one per accepted bid (manual and proxy
/// alike).  Source of truth for `total_bids` and for reconstruction of
/// the final price if the live state is ever corrupted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidLogEntry {
    pub auction_id: AuctionId,
    pub bidder_id: UserId,
    pub amount: Money,
    pub timestamp: DateTime<Utc>,
    pub is_auto_bid: bool,
    pub status: BidLogStatus,
}

// ----------------------------------------------------------------------------
// Proxy bidding
// ----------------------------------------------------------------------------

/// A private maximum-bid ceiling.  At most one active ceiling per user
/// per auction; `max_amount` is never exposed to other bidders, only
/// the resulting price movements are visible.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoBidCeiling {
    pub auction_id: AuctionId,
    pub user_id: UserId,
    pub max_amount: Money,
    pub created_at: DateTime<Utc>,
}
