//! Auction lifecycle controller.
//!
//! `scheduled → active → {ended, cancelled}`; `ended` and `cancelled`
//! are terminal.  Transitions are driven by time (lazily on every bid
//! attempt and periodically by the sweep loop) or administratively
//! (cancel).  The table-driven `legal` check keeps the state machine
//! honest in one place.

use chrono::{DateTime, Utc};
use gavel_common::types::{AuctionRecord, AuctionStatus};

/// What `advance` did to the record.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Transition {
    /// `scheduled → active` because `start_time` passed.
    Activated,
    /// `… → ended` because `end_time` passed (possibly via a same-call
    /// activation for long-idle scheduled auctions).
    Ended,
}

/// Table-driven definition of allowed edges.
pub fn legal(from: AuctionStatus, to: AuctionStatus) -> bool {
    use AuctionStatus::*;
    matches!(
        (from, to),
        (Scheduled, Active) | (Scheduled, Cancelled) | (Active, Ended) | (Active, Cancelled)
    )
}

/// Apply every time-due transition to `record` at instant `now`.
///
/// Returns the most significant transition that happened so the caller
/// can emit the right event; mutating and committing the record is the
/// caller's job (the executor and sweep both run this inside a store
/// transaction).
pub fn advance(record: &mut AuctionRecord, now: DateTime<Utc>) -> Option<Transition> {
    let mut result = None;

    if record.state.status == AuctionStatus::Scheduled && now >= record.config.start_time {
        record.state.status = AuctionStatus::Active;
        result = Some(Transition::Activated);
    }

    if record.state.status == AuctionStatus::Active && now > record.config.end_time {
        record.state.status = AuctionStatus::Ended;
        result = Some(Transition::Ended);
    }

    result
}
