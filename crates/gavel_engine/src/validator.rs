//! Bid validation policy.
//!
//! Pure functions over the observed auction record and a proposed bid
//! (no I/O, no clocks, no side effects) so the acceptance rules can be
//! verified without a live store.  The transaction executor re-runs
//! these checks inside every transaction attempt against the snapshot
//! it just read.

use gavel_common::prelude::*;

use crate::executor::BidRequest;

/// Accept or reject a proposed bid against the given record.
///
/// Checks run in a fixed order and the first failure wins:
/// 1. auction must be `Active`,
/// 2. the bid must arrive at or before the (possibly extended) deadline,
/// 3. the amount must clear `current_price + bid_increment`,
/// 4. a manual bid must not come from the current leader.
///
/// Proxy auto-bids are exempt from check 4: the resolver only ever bids
/// on behalf of a ceiling holder who is *not* the current leader, so a
/// counter-bid represents a different economic actor's standing
/// instruction rather than self-inflation.
pub fn validate(record: &AuctionRecord, request: &BidRequest) -> Result<()> {
    if record.state.status != AuctionStatus::Active {
        return Err(BidError::AuctionNotActive);
    }

    if request.timestamp > record.config.end_time {
        return Err(BidError::AuctionExpired);
    }

    let minimum = record.minimum_next_bid();
    if request.amount < minimum {
        return Err(BidError::BidTooLow {
            minimum_next_bid: minimum,
        });
    }

    if !request.is_auto_bid && record.state.last_bidder_id == Some(request.bidder_id) {
        return Err(BidError::ConsecutiveSelfBid);
    }

    Ok(())
}
