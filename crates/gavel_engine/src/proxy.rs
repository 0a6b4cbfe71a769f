//! Proxy auto-bid resolution.
//!
//! A user registers a private ceiling once and the engine bids on their
//! behalf whenever they are outbid, up to that ceiling: classic
//! second-price proxy behaviour: the counter-bid is one increment above
//! what is needed to lead, never the ceiling itself.
//!
//! Resolution runs synchronously after every accepted manual bid and
//! after every ceiling registration, as an explicit bounded loop (each
//! accepted counter-bid strictly increases the price and ceilings are
//! finite, so it converges).  Every counter-bid goes through the
//! transaction executor and therefore inherits the same atomicity and
//! anti-snipe extension behaviour as a human bid.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use gavel_common::prelude::*;
use gavel_store::{snapshot_record, Key, KvStore, StoreError};

use crate::executor::{self, BidRequest};

/// Settle all standing ceilings against the current state and return
/// the final, stable auction state.
///
/// A failure mid-resolution never rolls back the manual bid that
/// triggered it: the engine logs a warning and reports the last state
/// it observed, which is consistent by construction.
pub async fn resolve<S: KvStore>(
    store: &S,
    bus: &EventBus,
    cfg: &EngineConfig,
    auction_id: AuctionId,
    now: DateTime<Utc>,
) -> Result<AuctionState> {
    let mut restarts = 0u32;

    loop {
        let mut record: AuctionRecord =
            match snapshot_record(store, &Key::Auction(auction_id)).await {
                Ok(Some(record)) => record,
                Ok(None) => return Err(BidError::AuctionNotFound),
                Err(e) => return Err(BidError::Storage(e.to_string())),
            };

        if record.state.status != AuctionStatus::Active {
            return Ok(record.state);
        }

        let ceilings = match load_ceilings(store, auction_id).await {
            Ok(ceilings) => ceilings,
            Err(e) => {
                warn!(auction_id = %auction_id, error = %e, "could not load ceilings, leaving manual bid as-is");
                return Ok(record.state);
            }
        };

        // Each ceiling can take the lead at most once per pass.
        let max_rounds = ceilings.len() + 1;
        for _ in 0..max_rounds {
            let price = record.state.current_price;
            let increment = record.config.bid_increment;
            let leader = record.state.last_bidder_id;

            let mut eligible: Vec<&AutoBidCeiling> = ceilings
                .iter()
                .filter(|c| Some(c.user_id) != leader && c.max_amount >= price + increment)
                .collect();
            if eligible.is_empty() {
                return Ok(record.state);
            }
            eligible.sort_by(|a, b| {
                b.max_amount
                    .cmp(&a.max_amount)
                    .then(a.created_at.cmp(&b.created_at))
            });
            let top = eligible[0];

            // The strongest competition the winning ceiling must clear:
            // the highest *other* ceiling (the current leader's standing
            // ceiling included) or the current price, whichever is
            // greater.  Bidding one increment above that is what keeps
            // the ceiling itself private.
            let competition = ceilings
                .iter()
                .filter(|c| c.user_id != top.user_id)
                .map(|c| c.max_amount)
                .max()
                .unwrap_or(0)
                .max(price);
            let counter = top
                .max_amount
                .min(competition + increment)
                .max(price + increment);

            let request = BidRequest {
                auction_id,
                bidder_id: top.user_id,
                amount: counter,
                timestamp: now,
                is_auto_bid: true,
            };
            match executor::place_bid(store, bus, cfg, &request).await {
                Ok(state) => {
                    debug!(auction_id = %auction_id, bidder_id = %top.user_id, amount = %counter, "proxy counter-bid accepted");
                    record.state = state;
                }
                Err(err @ BidError::ContentionExhausted)
                | Err(err @ BidError::BidTooLow { .. })
                | Err(err @ BidError::AuctionNotActive)
                | Err(err @ BidError::AuctionExpired) => {
                    // A concurrent bidder moved the auction under us;
                    // restart from fresh state rather than trusting the
                    // stale view.
                    debug!(auction_id = %auction_id, error = %err, restarts, "proxy resolution restarting");
                    break;
                }
                Err(err) => {
                    warn!(auction_id = %auction_id, error = %err, "proxy resolution aborted");
                    return Ok(record.state);
                }
            }
        }

        // Fell out of the bounded pass (normally a concurrency race);
        // re-read and take another one, within budget.
        restarts += 1;
        if restarts > cfg.max_resolution_restarts {
            warn!(auction_id = %auction_id, "proxy resolution restart budget exhausted");
            return Ok(record.state);
        }
    }
}

/// Load every standing ceiling for `auction_id` via the per-auction
/// index.  Read-only; ceilings are written once at registration and
/// never touched by the resolver.
async fn load_ceilings<S: KvStore>(
    store: &S,
    auction_id: AuctionId,
) -> std::result::Result<Vec<AutoBidCeiling>, StoreError> {
    let users: Vec<UserId> = snapshot_record(store, &Key::CeilingIndex(auction_id))
        .await?
        .unwrap_or_default();
    let mut ceilings = Vec::with_capacity(users.len());
    for user in users {
        if let Some(ceiling) =
            snapshot_record::<AutoBidCeiling, S>(store, &Key::Ceiling(auction_id, user)).await?
        {
            ceilings.push(ceiling);
        }
    }
    Ok(ceilings)
}
