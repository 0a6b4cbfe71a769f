//! gavel_common::error
//! -----------------------------------------------------------------------------
//! Centralised error vocabulary for the bidding engine.
//!
//! A rejected bid is an expected, frequent outcome, not a system fault,
//! so every variant is returned as a typed `Result` and nothing here is
//! ever raised as a panic.  Storage-layer trouble is deliberately folded
//! into `ContentionExhausted` by the transaction executor after bounded
//! retries, so callers deal with one stable vocabulary regardless of the
//! backend in use.
//! -----------------------------------------------------------------------------

use thiserror::Error;

use crate::types::Money;

/// A convenient `Result` alias tied to [`BidError`].
pub type Result<T, E = BidError> = std::result::Result<T, E>;

/// Every way a bid or engine operation can be refused.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum BidError {
    /// No auction exists under the requested id.
    #[error("auction not found")]
    AuctionNotFound,

    /// The auction is not accepting bids (scheduled, ended or cancelled).
    #[error("auction is not active")]
    AuctionNotActive,

    /// The bid arrived after the (possibly extended) deadline.
    #[error("auction expired")]
    AuctionExpired,

    /// The amount does not clear the current price plus increment.
    /// Carries the computed minimum so the caller can resubmit without
    /// an extra round-trip.
    #[error("bid too low; minimum next bid is {minimum_next_bid}")]
    BidTooLow { minimum_next_bid: Money },

    /// The current leader may not manually out-bid themselves.
    #[error("consecutive self-bid rejected")]
    ConsecutiveSelfBid,

    /// Too many conflicting concurrent writers; the operation was
    /// retried up to the configured bound and never committed.
    #[error("write contention exhausted retries")]
    ContentionExhausted,

    /// A max-bid ceiling must be registered above the current price.
    #[error("auto-bid ceiling must exceed current price {current_price}")]
    InvalidAutoBidCeiling { current_price: Money },

    /// Auction creation parameters failed validation.
    #[error("invalid auction config: {0}")]
    InvalidAuctionConfig(String),

    /// Non-transient storage failure on a read-only path.
    #[error("storage error: {0}")]
    Storage(String),
}

impl BidError {
    /// Whether retrying the same request could ever succeed.
    ///
    /// Validator rejections are deterministic against the observed
    /// state; only contention and storage trouble are worth a retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BidError::ContentionExhausted | BidError::Storage(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bid_too_low_reports_minimum() {
        let err = BidError::BidTooLow {
            minimum_next_bid: 200,
        };
        assert_eq!(format!("{err}"), "bid too low; minimum next bid is 200");
    }

    #[test]
    fn transience_classification() {
        assert!(BidError::ContentionExhausted.is_transient());
        assert!(!BidError::ConsecutiveSelfBid.is_transient());
        assert!(!BidError::BidTooLow { minimum_next_bid: 1 }.is_transient());
    }
}
