//! Bid transaction executor.
//!
//! The one and only path allowed to mutate auction state.  Each call is
//! an atomic unit of work against the store: re-read, re-validate,
//! apply price/bidder/deadline updates, append the bid-log entry,
//! commit.  A conflicting concurrent writer aborts the commit and the
//! whole attempt restarts from a fresh snapshot, up to a bounded retry
//! count with linear back-off; exhausting it surfaces
//! `ContentionExhausted` instead of silently dropping the bid.

use chrono::{DateTime, Utc};
use tokio::time::sleep;
use tracing::{debug, warn};

use gavel_common::prelude::*;
use gavel_store::{read_record, write_record, CommitError, Key, KvStore};

use crate::{extender, lifecycle, lifecycle::Transition, validator};

/// One proposed bid, manual or proxy.
#[derive(Clone, Debug)]
pub struct BidRequest {
    pub auction_id: AuctionId,
    pub bidder_id: UserId,
    pub amount: Money,
    pub timestamp: DateTime<Utc>,
    pub is_auto_bid: bool,
}

/// Run the full bid protocol for `request` and return the committed
/// auction state.
///
/// Validator rejections are deterministic and never retried; only
/// commit conflicts and transient storage failures are, each attempt
/// against the then-current state.
pub async fn place_bid<S: KvStore>(
    store: &S,
    bus: &EventBus,
    cfg: &EngineConfig,
    request: &BidRequest,
) -> Result<AuctionState> {
    let key = Key::Auction(request.auction_id);

    for attempt in 0..cfg.max_bid_retries {
        if attempt > 0 {
            sleep(cfg.retry_backoff * attempt).await;
        }

        let mut txn = match store.begin().await {
            Ok(txn) => txn,
            Err(e) => {
                warn!(auction_id = %request.auction_id, error = %e, "failed to begin bid transaction");
                continue;
            }
        };

        let mut record: AuctionRecord = match read_record(txn.as_mut(), &key).await {
            Ok(Some(record)) => record,
            Ok(None) => return Err(BidError::AuctionNotFound),
            Err(e) => {
                warn!(auction_id = %request.auction_id, error = %e, "bid transaction read failed");
                continue;
            }
        };

        // Lazy lifecycle transition, committed on its own so a rejected
        // bid still leaves no writes behind.
        if let Some(transition) = lifecycle::advance(&mut record, request.timestamp) {
            if let Err(e) = write_record(txn.as_mut(), key.clone(), &record) {
                return Err(BidError::Storage(e.to_string()));
            }
            match txn.commit().await {
                Ok(()) => {
                    debug!(auction_id = %request.auction_id, ?transition, "lazy lifecycle transition");
                    if transition == Transition::Ended {
                        bus.emit(AuctionEvent::AuctionEnded {
                            auction_id: request.auction_id,
                            winner_id: record.state.last_bidder_id,
                            final_price: record.state.current_price,
                        });
                    }
                }
                Err(CommitError::Conflict) => {
                    debug!(auction_id = %request.auction_id, attempt, "lifecycle commit conflict");
                }
                Err(CommitError::Store(e)) => {
                    warn!(auction_id = %request.auction_id, error = %e, "lifecycle commit failed");
                }
            }
            // Either way, re-read and validate against fresh state.
            continue;
        }

        validator::validate(&record, request)?;

        let old_end = record.config.end_time;
        let new_end = extender::extend(old_end, &record.config.extend_rule, request.timestamp);
        record.config.end_time = new_end;
        record.state.current_price = request.amount;
        record.state.last_bidder_id = Some(request.bidder_id);
        record.state.total_bids += 1;
        let seq = record.log_len;
        record.log_len += 1;

        let entry = BidLogEntry {
            auction_id: request.auction_id,
            bidder_id: request.bidder_id,
            amount: request.amount,
            timestamp: request.timestamp,
            is_auto_bid: request.is_auto_bid,
            status: BidLogStatus::Valid,
        };

        if let Err(e) = write_record(txn.as_mut(), key.clone(), &record) {
            return Err(BidError::Storage(e.to_string()));
        }
        if let Err(e) = write_record(txn.as_mut(), Key::BidLog(request.auction_id, seq), &entry) {
            return Err(BidError::Storage(e.to_string()));
        }

        match txn.commit().await {
            Ok(()) => {
                debug!(
                    auction_id = %request.auction_id,
                    bidder_id = %request.bidder_id,
                    amount = %request.amount,
                    attempt,
                    "bid accepted"
                );
                bus.emit(AuctionEvent::BidAccepted {
                    auction_id: request.auction_id,
                    bidder_id: request.bidder_id,
                    amount: request.amount,
                    is_auto_bid: request.is_auto_bid,
                });
                if new_end != old_end {
                    bus.emit(AuctionEvent::AuctionExtended {
                        auction_id: request.auction_id,
                        new_end_time: new_end,
                    });
                }
                return Ok(record.state);
            }
            Err(CommitError::Conflict) => {
                debug!(auction_id = %request.auction_id, attempt, "bid commit conflict, retrying");
            }
            Err(CommitError::Store(e)) => {
                warn!(auction_id = %request.auction_id, error = %e, attempt, "bid commit failed, retrying");
            }
        }
    }

    Err(BidError::ContentionExhausted)
}
