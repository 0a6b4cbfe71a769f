//! Anti-snipe deadline extension.
//!
//! Pure computation: given the current deadline, the extension rule and
//! a bid arrival time, decide where the deadline moves.  Using
//! `max(end_time, timestamp + extend_by)` rather than unconditional
//! addition means a bidder firing many bids just inside the window can
//! never drag the deadline forward by more than each individual bid
//! contributes once, and an already-extended deadline never shrinks.

use chrono::{DateTime, Utc};
use gavel_common::types::ExtendRule;

/// Compute the (possibly unchanged) end time after a bid at `timestamp`.
pub fn extend(
    end_time: DateTime<Utc>,
    rule: &ExtendRule,
    timestamp: DateTime<Utc>,
) -> DateTime<Utc> {
    if !rule.enabled {
        return end_time;
    }
    if end_time - timestamp > rule.trigger_window() {
        return end_time;
    }
    end_time.max(timestamp + rule.extend_by())
}
