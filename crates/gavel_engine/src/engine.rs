//! The engine facade.
//!
//! `AuctionEngine` is the public surface callers see: create auctions,
//! place bids (with proxy resolution settled before returning), register
//! ceilings, read state and the audit log, cancel, and run the periodic
//! lifecycle sweep.  It owns nothing but a handle to the store, the
//! config and the event bus, so it is cheap to clone into request
//! handlers and background tasks.

use std::{future::Future, sync::Arc, time::Duration as StdDuration};

use chrono::{DateTime, Utc};
use tokio::{sync::broadcast, task::JoinHandle, time::sleep};
use tracing::{debug, info, warn};

use gavel_common::prelude::*;
use gavel_store::{
    read_record, write_record, CommitError, Key, KvStore, KvTransaction, MemoryKvStore,
};

use crate::{
    executor::{self, BidRequest},
    lifecycle::{self, Transition},
    proxy,
};

/// Parameters for converting a listing into an auction.
#[derive(Clone, Debug)]
pub struct CreateAuction {
    pub start_price: Money,
    pub bid_increment: Money,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub extend_rule: ExtendRule,
}

pub struct AuctionEngine<S: KvStore> {
    store: Arc<S>,
    cfg: EngineConfig,
    bus: EventBus,
}

// Manual impl: the store sits behind an `Arc`, so `S` itself does not
// need to be `Clone` (sled-backed stores are not).
impl<S: KvStore> Clone for AuctionEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            cfg: self.cfg.clone(),
            bus: self.bus.clone(),
        }
    }
}

impl AuctionEngine<MemoryKvStore> {
    /// Convenience helper for tests / local dev.
    pub fn with_memory_store(cfg: EngineConfig) -> Self {
        Self::new(MemoryKvStore::new(), cfg)
    }
}

impl<S: KvStore> AuctionEngine<S> {
    pub fn new(store: S, cfg: EngineConfig) -> Self {
        let bus = EventBus::new(cfg.event_capacity);
        Self {
            store: Arc::new(store),
            cfg,
            bus,
        }
    }

    /// Subscribe to auction events (fire-and-forget).
    pub fn subscribe(&self) -> broadcast::Receiver<AuctionEvent> {
        self.bus.subscribe()
    }

    /// Create a new auction; `Scheduled` until `start_time`, `Active`
    /// immediately when `start_time` is already past.
    pub async fn create_auction(
        &self,
        params: CreateAuction,
        now: DateTime<Utc>,
    ) -> Result<AuctionId> {
        if params.bid_increment == 0 {
            return Err(BidError::InvalidAuctionConfig(
                "bid_increment must be positive".into(),
            ));
        }
        if params.end_time <= params.start_time {
            return Err(BidError::InvalidAuctionConfig(
                "end_time must be after start_time".into(),
            ));
        }

        let auction_id = AuctionId::new();
        let record = AuctionRecord::new(
            AuctionConfig {
                start_price: params.start_price,
                bid_increment: params.bid_increment,
                start_time: params.start_time,
                end_time: params.end_time,
                extend_rule: params.extend_rule,
            },
            now,
        );

        self.transact(|mut txn| {
            let record = record.clone();
            async move {
                let mut index: Vec<AuctionId> = read_record(txn.as_mut(), &Key::AuctionIndex)
                    .await
                    .map_err(|e| BidError::Storage(e.to_string()))?
                    .unwrap_or_default();
                index.push(auction_id);
                write_record(txn.as_mut(), Key::AuctionIndex, &index)
                    .map_err(|e| BidError::Storage(e.to_string()))?;
                write_record(txn.as_mut(), Key::Auction(auction_id), &record)
                    .map_err(|e| BidError::Storage(e.to_string()))?;
                Ok((txn, ()))
            }
        })
        .await?;

        info!(auction_id = %auction_id, status = %record.state.status, "auction created");
        self.bus.emit(AuctionEvent::AuctionCreated(auction_id));
        Ok(auction_id)
    }

    /// Place a manual bid and settle any standing auto-bid ceilings
    /// before returning, so callers always see the final stable price.
    ///
    /// The manual bid's commit is final regardless of whether subsequent
    /// proxy counter-bidding succeeds; a resolution failure is logged
    /// and the last consistent state is returned.
    pub async fn place_bid(
        &self,
        auction_id: AuctionId,
        bidder_id: UserId,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Result<AuctionState> {
        let request = BidRequest {
            auction_id,
            bidder_id,
            amount,
            timestamp: now,
            is_auto_bid: false,
        };
        let state = executor::place_bid(self.store.as_ref(), &self.bus, &self.cfg, &request).await?;
        self.settle(auction_id, state, now).await
    }

    /// Run proxy resolution after a committed write.  The write is final
    /// no matter what happens here: a resolution failure is logged and
    /// the pre-resolution state is returned instead of an error.
    async fn settle(
        &self,
        auction_id: AuctionId,
        committed: AuctionState,
        now: DateTime<Utc>,
    ) -> Result<AuctionState> {
        match proxy::resolve(self.store.as_ref(), &self.bus, &self.cfg, auction_id, now).await {
            Ok(settled) => Ok(settled),
            Err(err) => {
                warn!(auction_id = %auction_id, error = %err, "proxy resolution failed, returning committed state");
                Ok(committed)
            }
        }
    }

    /// Register (or raise) a private max-bid ceiling.  Rejected when the
    /// ceiling does not exceed the current price.  On an active auction
    /// the ceiling competes immediately.
    pub async fn register_auto_bid(
        &self,
        auction_id: AuctionId,
        user_id: UserId,
        max_amount: Money,
        now: DateTime<Utc>,
    ) -> Result<AuctionState> {
        let ceiling = AutoBidCeiling {
            auction_id,
            user_id,
            max_amount,
            created_at: now,
        };

        let record = self
            .transact(move |mut txn| {
                let ceiling = ceiling.clone();
                async move {
                    let record: AuctionRecord =
                        read_record(txn.as_mut(), &Key::Auction(auction_id))
                            .await
                            .map_err(|e| BidError::Storage(e.to_string()))?
                            .ok_or(BidError::AuctionNotFound)?;

                    match record.state.status {
                        AuctionStatus::Scheduled | AuctionStatus::Active => {}
                        AuctionStatus::Ended | AuctionStatus::Cancelled => {
                            return Err(BidError::AuctionNotActive)
                        }
                    }
                    if ceiling.max_amount <= record.state.current_price {
                        return Err(BidError::InvalidAutoBidCeiling {
                            current_price: record.state.current_price,
                        });
                    }

                    let mut index: Vec<UserId> =
                        read_record(txn.as_mut(), &Key::CeilingIndex(auction_id))
                            .await
                            .map_err(|e| BidError::Storage(e.to_string()))?
                            .unwrap_or_default();
                    if !index.contains(&ceiling.user_id) {
                        index.push(ceiling.user_id);
                        write_record(txn.as_mut(), Key::CeilingIndex(auction_id), &index)
                            .map_err(|e| BidError::Storage(e.to_string()))?;
                    }
                    write_record(
                        txn.as_mut(),
                        Key::Ceiling(auction_id, ceiling.user_id),
                        &ceiling,
                    )
                    .map_err(|e| BidError::Storage(e.to_string()))?;
                    Ok((txn, record))
                }
            })
            .await?;

        debug!(auction_id = %auction_id, user_id = %user_id, "auto-bid ceiling registered");

        if record.state.status == AuctionStatus::Active {
            self.settle(auction_id, record.state, now).await
        } else {
            Ok(record.state)
        }
    }

    /// Read-only view of the live state; no transaction required.
    pub async fn get_auction_state(&self, auction_id: AuctionId) -> Result<AuctionState> {
        let record: AuctionRecord =
            gavel_store::snapshot_record(self.store.as_ref(), &Key::Auction(auction_id))
                .await
                .map_err(|e| BidError::Storage(e.to_string()))?
                .ok_or(BidError::AuctionNotFound)?;
        Ok(record.state)
    }

    /// Full append-only bid log for audit / dispute resolution.
    pub async fn bid_log(&self, auction_id: AuctionId) -> Result<Vec<BidLogEntry>> {
        let record: AuctionRecord =
            gavel_store::snapshot_record(self.store.as_ref(), &Key::Auction(auction_id))
                .await
                .map_err(|e| BidError::Storage(e.to_string()))?
                .ok_or(BidError::AuctionNotFound)?;

        let mut entries = Vec::with_capacity(record.log_len as usize);
        for seq in 0..record.log_len {
            if let Some(entry) = gavel_store::snapshot_record::<BidLogEntry, S>(
                self.store.as_ref(),
                &Key::BidLog(auction_id, seq),
            )
            .await
            .map_err(|e| BidError::Storage(e.to_string()))?
            {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Administrative cancellation.  Subsequent bids reject; the
    /// standing leader bid (if any) gets a compensating `Reversed`
    /// log entry; no monetary capture happens for cancelled auctions.
    pub async fn cancel_auction(&self, auction_id: AuctionId, now: DateTime<Utc>) -> Result<()> {
        self.transact(move |mut txn| async move {
            let mut record: AuctionRecord = read_record(txn.as_mut(), &Key::Auction(auction_id))
                .await
                .map_err(|e| BidError::Storage(e.to_string()))?
                .ok_or(BidError::AuctionNotFound)?;

            if !lifecycle::legal(record.state.status, AuctionStatus::Cancelled) {
                return Err(BidError::AuctionNotActive);
            }
            record.state.status = AuctionStatus::Cancelled;

            if let Some(leader) = record.state.last_bidder_id {
                let reversal = BidLogEntry {
                    auction_id,
                    bidder_id: leader,
                    amount: record.state.current_price,
                    timestamp: now,
                    is_auto_bid: false,
                    status: BidLogStatus::Reversed,
                };
                let seq = record.log_len;
                record.log_len += 1;
                write_record(txn.as_mut(), Key::BidLog(auction_id, seq), &reversal)
                    .map_err(|e| BidError::Storage(e.to_string()))?;
            }

            write_record(txn.as_mut(), Key::Auction(auction_id), &record)
                .map_err(|e| BidError::Storage(e.to_string()))?;
            Ok((txn, ()))
        })
        .await?;

        info!(auction_id = %auction_id, "auction cancelled");
        self.bus.emit(AuctionEvent::AuctionCancelled(auction_id));
        Ok(())
    }

    /// Apply due lifecycle transitions to every known auction.
    pub async fn sweep(&self, now: DateTime<Utc>) {
        let index: Vec<AuctionId> =
            match gavel_store::snapshot_record(self.store.as_ref(), &Key::AuctionIndex).await {
                Ok(Some(index)) => index,
                Ok(None) => return,
                Err(e) => {
                    warn!(error = %e, "sweep failed to read auction index");
                    return;
                }
            };

        for auction_id in index {
            if let Err(e) = self.sweep_one(auction_id, now).await {
                warn!(auction_id = %auction_id, error = %e, "sweep failed for auction");
            }
        }
    }

    async fn sweep_one(&self, auction_id: AuctionId, now: DateTime<Utc>) -> Result<()> {
        let mut txn = self
            .store
            .begin()
            .await
            .map_err(|e| BidError::Storage(e.to_string()))?;
        let mut record: AuctionRecord = match read_record(txn.as_mut(), &Key::Auction(auction_id))
            .await
            .map_err(|e| BidError::Storage(e.to_string()))?
        {
            Some(record) => record,
            None => return Ok(()),
        };

        let Some(transition) = lifecycle::advance(&mut record, now) else {
            return Ok(());
        };
        write_record(txn.as_mut(), Key::Auction(auction_id), &record)
            .map_err(|e| BidError::Storage(e.to_string()))?;

        match txn.commit().await {
            Ok(()) => {
                info!(auction_id = %auction_id, ?transition, "sweep applied lifecycle transition");
                if transition == Transition::Ended {
                    self.bus.emit(AuctionEvent::AuctionEnded {
                        auction_id,
                        winner_id: record.state.last_bidder_id,
                        final_price: record.state.current_price,
                    });
                }
                Ok(())
            }
            // A racing bid got there first; the next sweep (or the bid
            // itself) applies the transition.
            Err(CommitError::Conflict) => Ok(()),
            Err(CommitError::Store(e)) => Err(BidError::Storage(e.to_string())),
        }
    }

    /// Spawns a Tokio task that periodically applies due lifecycle
    /// transitions, so idle auctions end without bid traffic.
    ///
    /// NOTE: In a clustered deployment running the sweep on every
    /// instance is safe (transitions are idempotent and conflicts just
    /// mean someone else won the race), merely redundant work.
    pub fn spawn_sweep_loop(self, interval: StdDuration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.sweep(Utc::now()).await;
            }
        })
    }

    /// Run `body` inside a store transaction with the engine's standard
    /// retry policy: conflicts and transient storage failures restart
    /// the whole body against fresh state; deterministic rejections
    /// propagate immediately.
    async fn transact<T, F, Fut>(&self, body: F) -> Result<T>
    where
        F: Fn(Box<dyn KvTransaction>) -> Fut,
        Fut: Future<Output = Result<(Box<dyn KvTransaction>, T)>>,
    {
        for attempt in 0..self.cfg.max_bid_retries {
            if attempt > 0 {
                sleep(self.cfg.retry_backoff * attempt).await;
            }
            let txn = match self.store.begin().await {
                Ok(txn) => txn,
                Err(e) => {
                    warn!(error = %e, "failed to begin transaction");
                    continue;
                }
            };
            let (txn, value) = body(txn).await?;
            match txn.commit().await {
                Ok(()) => return Ok(value),
                Err(CommitError::Conflict) => {
                    debug!(attempt, "transaction conflict, retrying");
                }
                Err(CommitError::Store(e)) => {
                    warn!(error = %e, attempt, "transaction commit failed, retrying");
                }
            }
        }
        Err(BidError::ContentionExhausted)
    }
}
