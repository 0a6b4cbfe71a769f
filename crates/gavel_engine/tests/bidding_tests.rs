//! End-to-end tests for the bidding engine against the in-memory store.
//!
//! The suite focuses on the engine's advertised guarantees:
//! 1. Price monotonicity and the minimum-increment rule.
//! 2. Anti-snipe deadline extension, including the no-op outside the
//!    trigger window.
//! 3. Second-price proxy resolution of standing max-bid ceilings.
//! 4. Exactly-one-winner behaviour under concurrent identical bids.
//! 5. Lifecycle: lazy activation, lazy/sweep termination, cancellation.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::task;

use gavel_common::prelude::*;
use gavel_engine::{AuctionEngine, CreateAuction};
use gavel_store::{Key, KvStore, KvTransaction, MemoryKvStore, StoreError};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
}

fn engine() -> AuctionEngine<MemoryKvStore> {
    AuctionEngine::with_memory_store(EngineConfig::default())
}

/// start_price 100, increment 50, one hour long, 60s/60s anti-snipe.
fn standard_auction(now: DateTime<Utc>) -> CreateAuction {
    CreateAuction {
        start_price: 100,
        bid_increment: 50,
        start_time: now,
        end_time: now + Duration::seconds(3600),
        extend_rule: ExtendRule {
            enabled: true,
            trigger_window_secs: 60,
            extend_by_secs: 60,
        },
    }
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<AuctionEvent>) -> Vec<AuctionEvent> {
    let mut events = Vec::new();
    while let Ok(evt) = rx.try_recv() {
        events.push(evt);
    }
    events
}

/// The canonical scenario: accept, reject-too-low with computed
/// minimum, accept the retry, extend inside the snipe window.
#[tokio::test]
async fn scenario_increment_and_anti_snipe() {
    let engine = engine();
    let mut rx = engine.subscribe();
    let now = t0();
    let auction = engine.create_auction(standard_auction(now), now).await.unwrap();

    let (alice, bob, carol) = (UserId::new(), UserId::new(), UserId::new());

    let state = engine.place_bid(auction, alice, 150, now).await.unwrap();
    assert_eq!(state.current_price, 150);
    assert_eq!(state.last_bidder_id, Some(alice));

    let err = engine
        .place_bid(auction, bob, 150, now + Duration::seconds(10))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        BidError::BidTooLow {
            minimum_next_bid: 200
        }
    );

    let state = engine
        .place_bid(auction, bob, 200, now + Duration::seconds(10))
        .await
        .unwrap();
    assert_eq!(state.current_price, 200);
    assert_eq!(state.total_bids, 2);

    // T+3599 is inside the 60s window: deadline moves to T+3659.
    let state = engine
        .place_bid(auction, carol, 250, now + Duration::seconds(3599))
        .await
        .unwrap();
    assert_eq!(state.current_price, 250);

    let events = drain(&mut rx);
    let extended: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            AuctionEvent::AuctionExtended { new_end_time, .. } => Some(*new_end_time),
            _ => None,
        })
        .collect();
    assert_eq!(extended, vec![now + Duration::seconds(3659)]);

    let accepted = events
        .iter()
        .filter(|e| matches!(e, AuctionEvent::BidAccepted { .. }))
        .count();
    assert_eq!(accepted, 3);
}

#[tokio::test]
async fn early_bids_never_touch_the_deadline() {
    let engine = engine();
    let mut rx = engine.subscribe();
    let now = t0();
    let auction = engine.create_auction(standard_auction(now), now).await.unwrap();

    engine
        .place_bid(auction, UserId::new(), 150, now + Duration::seconds(5))
        .await
        .unwrap();

    assert!(drain(&mut rx)
        .iter()
        .all(|e| !matches!(e, AuctionEvent::AuctionExtended { .. })));
}

#[tokio::test]
async fn price_is_monotonic_and_log_matches_total_bids() {
    let engine = engine();
    let now = t0();
    let auction = engine.create_auction(standard_auction(now), now).await.unwrap();

    let bidders = [UserId::new(), UserId::new()];
    let mut last_price = 0;
    for (i, amount) in [150u128, 220, 300, 777].iter().enumerate() {
        let state = engine
            .place_bid(auction, bidders[i % 2], *amount, now + Duration::seconds(i as i64))
            .await
            .unwrap();
        assert!(state.current_price >= last_price, "price must never decrease");
        last_price = state.current_price;
    }

    let state = engine.get_auction_state(auction).await.unwrap();
    let log = engine.bid_log(auction).await.unwrap();
    let valid = log
        .iter()
        .filter(|e| e.status == BidLogStatus::Valid)
        .count() as u64;
    assert_eq!(state.total_bids, 4);
    assert_eq!(valid, state.total_bids);

    // Every accepted bid cleared the previous price by the increment.
    for pair in log.windows(2) {
        assert!(pair[1].amount >= pair[0].amount + 50);
    }
}

#[tokio::test]
async fn consecutive_self_bid_is_rejected() {
    let engine = engine();
    let now = t0();
    let auction = engine.create_auction(standard_auction(now), now).await.unwrap();
    let alice = UserId::new();

    engine.place_bid(auction, alice, 150, now).await.unwrap();
    let err = engine
        .place_bid(auction, alice, 250, now + Duration::seconds(1))
        .await
        .unwrap_err();
    assert_eq!(err, BidError::ConsecutiveSelfBid);

    // After someone else leads, alice may bid again.
    let bob = UserId::new();
    engine
        .place_bid(auction, bob, 250, now + Duration::seconds(2))
        .await
        .unwrap();
    engine
        .place_bid(auction, alice, 300, now + Duration::seconds(3))
        .await
        .unwrap();
}

/// Two ceilings A=1000 (registered first) and B=1500, increment 50:
/// a manual bid of 100 settles at min(1500, 1000 + 50) = 1050 with B
/// leading, and exactly one proxy counter-bid in the log.
#[tokio::test]
async fn proxy_resolution_converges_to_second_price_plus_increment() {
    let engine = engine();
    let now = t0();
    // Scheduled for one minute from now so ceilings can be registered
    // before any bidding starts.
    let auction = engine
        .create_auction(
            CreateAuction {
                start_price: 50,
                bid_increment: 50,
                start_time: now + Duration::seconds(60),
                end_time: now + Duration::seconds(3600),
                extend_rule: ExtendRule::disabled(),
            },
            now,
        )
        .await
        .unwrap();

    let (a, b, manual) = (UserId::new(), UserId::new(), UserId::new());
    engine.register_auto_bid(auction, a, 1000, now).await.unwrap();
    engine
        .register_auto_bid(auction, b, 1500, now + Duration::seconds(1))
        .await
        .unwrap();

    // First bid after start_time lazily activates, then resolution runs.
    let state = engine
        .place_bid(auction, manual, 100, now + Duration::seconds(120))
        .await
        .unwrap();

    assert_eq!(state.current_price, 1050);
    assert_eq!(state.last_bidder_id, Some(b));
    assert_eq!(state.total_bids, 2, "manual bid plus one proxy counter-bid");

    let log = engine.bid_log(auction).await.unwrap();
    assert!(!log[0].is_auto_bid);
    assert!(log[1].is_auto_bid);
    assert_eq!(log[1].bidder_id, b);
    assert_eq!(log[1].amount, 1050);

    // Stable: another losing manual bid is simply too low.
    let err = engine
        .place_bid(auction, manual, 1050, now + Duration::seconds(121))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        BidError::BidTooLow {
            minimum_next_bid: 1100
        }
    );
}

/// Registering a ceiling on an already-active auction counter-bids
/// immediately when the ceiling beats the current leader.
#[tokio::test]
async fn late_ceiling_takes_the_lead_at_one_increment_over() {
    let engine = engine();
    let now = t0();
    let auction = engine.create_auction(standard_auction(now), now).await.unwrap();

    let (alice, bob) = (UserId::new(), UserId::new());
    engine.place_bid(auction, alice, 200, now).await.unwrap();

    let state = engine
        .register_auto_bid(auction, bob, 5000, now + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(state.last_bidder_id, Some(bob));
    assert_eq!(state.current_price, 250, "one increment over the manual price");
}

#[tokio::test]
async fn ceiling_not_above_current_price_is_rejected() {
    let engine = engine();
    let now = t0();
    let auction = engine.create_auction(standard_auction(now), now).await.unwrap();
    engine.place_bid(auction, UserId::new(), 300, now).await.unwrap();

    let err = engine
        .register_auto_bid(auction, UserId::new(), 300, now)
        .await
        .unwrap_err();
    assert_eq!(err, BidError::InvalidAutoBidCeiling { current_price: 300 });
}

/// N tasks race identical bids: exactly one wins, the rest observe the
/// raised price.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_identical_bids_have_exactly_one_winner() {
    let engine = engine();
    let now = t0();
    let auction = engine.create_auction(standard_auction(now), now).await.unwrap();

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let engine = engine.clone();
            task::spawn(async move { engine.place_bid(auction, UserId::new(), 150, t0()).await })
        })
        .collect();

    let mut accepted = 0;
    let mut too_low = 0;
    for handle in handles {
        match handle.await.expect("join error") {
            Ok(_) => accepted += 1,
            Err(BidError::BidTooLow { minimum_next_bid }) => {
                assert_eq!(minimum_next_bid, 200);
                too_low += 1;
            }
            Err(other) => panic!("unexpected rejection: {other:?}"),
        }
    }
    assert_eq!(accepted, 1);
    assert_eq!(too_low, 5);

    let state = engine.get_auction_state(auction).await.unwrap();
    assert_eq!(state.current_price, 150);
    assert_eq!(state.total_bids, 1);
}

#[tokio::test]
async fn bids_before_start_and_after_end_are_rejected() {
    let engine = engine();
    let now = t0();
    let auction = engine
        .create_auction(
            CreateAuction {
                start_price: 100,
                bid_increment: 50,
                start_time: now + Duration::seconds(100),
                end_time: now + Duration::seconds(200),
                extend_rule: ExtendRule::disabled(),
            },
            now,
        )
        .await
        .unwrap();

    let bidder = UserId::new();
    assert_eq!(
        engine.place_bid(auction, bidder, 150, now).await.unwrap_err(),
        BidError::AuctionNotActive
    );

    // Past the deadline the lazy transition lands first, so the bid
    // sees an ended auction.
    assert_eq!(
        engine
            .place_bid(auction, bidder, 150, now + Duration::seconds(201))
            .await
            .unwrap_err(),
        BidError::AuctionNotActive
    );
    assert_eq!(
        engine.get_auction_state(auction).await.unwrap().status,
        AuctionStatus::Ended
    );
}

#[tokio::test]
async fn sweep_ends_idle_auctions_and_names_the_winner() {
    let engine = engine();
    let mut rx = engine.subscribe();
    let now = t0();
    let auction = engine
        .create_auction(
            CreateAuction {
                start_price: 100,
                bid_increment: 50,
                start_time: now,
                end_time: now + Duration::seconds(60),
                extend_rule: ExtendRule::disabled(),
            },
            now,
        )
        .await
        .unwrap();
    let alice = UserId::new();
    engine.place_bid(auction, alice, 150, now).await.unwrap();

    engine.sweep(now + Duration::seconds(61)).await;

    let state = engine.get_auction_state(auction).await.unwrap();
    assert_eq!(state.status, AuctionStatus::Ended);

    let ended: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            AuctionEvent::AuctionEnded {
                winner_id,
                final_price,
                ..
            } => Some((winner_id, final_price)),
            _ => None,
        })
        .collect();
    assert_eq!(ended, vec![(Some(alice), 150)]);
}

#[tokio::test]
async fn cancellation_reverses_the_standing_bid_and_blocks_new_ones() {
    let engine = engine();
    let now = t0();
    let auction = engine.create_auction(standard_auction(now), now).await.unwrap();
    let alice = UserId::new();
    engine.place_bid(auction, alice, 150, now).await.unwrap();

    engine
        .cancel_auction(auction, now + Duration::seconds(1))
        .await
        .unwrap();

    assert_eq!(
        engine
            .place_bid(auction, UserId::new(), 500, now + Duration::seconds(2))
            .await
            .unwrap_err(),
        BidError::AuctionNotActive
    );

    let state = engine.get_auction_state(auction).await.unwrap();
    assert_eq!(state.status, AuctionStatus::Cancelled);
    assert_eq!(state.total_bids, 1, "reversal must not count as a bid");

    let log = engine.bid_log(auction).await.unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[1].status, BidLogStatus::Reversed);
    assert_eq!(log[1].bidder_id, alice);
    assert_eq!(log[1].amount, 150);

    // Terminal: cancelling twice is rejected.
    assert_eq!(
        engine
            .cancel_auction(auction, now + Duration::seconds(3))
            .await
            .unwrap_err(),
        BidError::AuctionNotActive
    );
}

#[tokio::test]
async fn proxy_bids_extend_the_deadline_like_human_bids() {
    let engine = engine();
    let mut rx = engine.subscribe();
    let now = t0();
    let auction = engine.create_auction(standard_auction(now), now).await.unwrap();

    let sniper_time = now + Duration::seconds(3590);
    engine
        .register_auto_bid(auction, UserId::new(), 10_000, now)
        .await
        .unwrap();
    // Registration already counter-bid the price to 150.  A manual bid
    // just inside the window must clear 200; the proxy reply shares its
    // timestamp, so the deadline ends up at timestamp + 60s.
    engine
        .place_bid(auction, UserId::new(), 200, sniper_time)
        .await
        .unwrap();

    let extended = drain(&mut rx)
        .iter()
        .filter_map(|e| match e {
            AuctionEvent::AuctionExtended { new_end_time, .. } => Some(*new_end_time),
            _ => None,
        })
        .max();
    assert_eq!(extended, Some(sniper_time + Duration::seconds(60)));
}

/// Memory store whose snapshot path can be switched off, leaving the
/// transactional path intact.
struct FlakySnapshotStore {
    inner: MemoryKvStore,
    fail_snapshots: Arc<AtomicBool>,
}

#[async_trait]
impl KvStore for FlakySnapshotStore {
    async fn begin(&self) -> Result<Box<dyn KvTransaction>, StoreError> {
        self.inner.begin().await
    }

    async fn snapshot(&self, key: &Key) -> Result<Option<Vec<u8>>, StoreError> {
        if self.fail_snapshots.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("snapshot path down".into()));
        }
        self.inner.snapshot(key).await
    }
}

/// A committed bid must never be reported as failed just because the
/// proxy-resolution read afterwards hit storage trouble.
#[tokio::test]
async fn resolution_failure_does_not_undo_a_committed_bid() {
    let fail_snapshots = Arc::new(AtomicBool::new(false));
    let store = FlakySnapshotStore {
        inner: MemoryKvStore::new(),
        fail_snapshots: Arc::clone(&fail_snapshots),
    };
    let engine = AuctionEngine::new(store, EngineConfig::default());
    let now = t0();
    let auction = engine.create_auction(standard_auction(now), now).await.unwrap();
    let alice = UserId::new();

    fail_snapshots.store(true, Ordering::SeqCst);
    let state = engine.place_bid(auction, alice, 150, now).await.unwrap();
    assert_eq!(state.current_price, 150);
    assert_eq!(state.last_bidder_id, Some(alice));
    assert_eq!(state.total_bids, 1);

    // The store recovers; the committed bid is there.
    fail_snapshots.store(false, Ordering::SeqCst);
    let state = engine.get_auction_state(auction).await.unwrap();
    assert_eq!(state.current_price, 150);
    assert_eq!(state.total_bids, 1);
}

#[tokio::test]
async fn invalid_auction_configs_are_rejected() {
    let engine = engine();
    let now = t0();

    let mut zero_increment = standard_auction(now);
    zero_increment.bid_increment = 0;
    assert!(matches!(
        engine.create_auction(zero_increment, now).await.unwrap_err(),
        BidError::InvalidAuctionConfig(_)
    ));

    let mut backwards = standard_auction(now);
    backwards.end_time = backwards.start_time - Duration::seconds(1);
    assert!(matches!(
        engine.create_auction(backwards, now).await.unwrap_err(),
        BidError::InvalidAuctionConfig(_)
    ));

    assert_eq!(
        engine.get_auction_state(AuctionId::new()).await.unwrap_err(),
        BidError::AuctionNotFound
    );
}
