//! Domain events emitted for external collaborators (notification,
//! audit, settlement).  Delivery is fire-and-forget over a Tokio
//! broadcast channel: the engine never blocks on slow consumers and a
//! send with no active listeners is not an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::{AuctionId, Money, UserId};

/// Everything the outside world may react to.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum AuctionEvent {
    AuctionCreated(AuctionId),
    BidAccepted {
        auction_id: AuctionId,
        bidder_id: UserId,
        amount: Money,
        is_auto_bid: bool,
    },
    AuctionExtended {
        auction_id: AuctionId,
        new_end_time: DateTime<Utc>,
    },
    AuctionEnded {
        auction_id: AuctionId,
        winner_id: Option<UserId>,
        final_price: Money,
    },
    AuctionCancelled(AuctionId),
}

/// Thin wrapper around the broadcast sender so call sites don't care
/// about channel mechanics.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<AuctionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuctionEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; silently drops it when nobody is listening.
    pub fn emit(&self, event: AuctionEvent) {
        let _ = self.tx.send(event);
    }
}
