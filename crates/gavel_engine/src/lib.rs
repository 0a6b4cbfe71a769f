//! Gavel – real-time auction bidding engine.
//!
//! Responsibilities
//! ----------------
//! 1. Accept competing bids on timed listings, enforcing monotonic price
//!    increase with a minimum increment.
//! 2. Extend the deadline when bids land close to it (anti-sniping).
//! 3. Resolve private max-bid ceilings on behalf of their owners
//!    (proxy / second-price style auto-bidding).
//! 4. Drive the `scheduled → active → {ended, cancelled}` lifecycle,
//!    lazily on traffic and periodically via a sweep loop.
//!
//! The engine is designed for dependency-injection: any transactional
//! storage that implements `gavel_store::KvStore` can be plugged in.
//! All correctness under concurrent bidders comes from the store's
//! commit-time conflict detection: there is no long-lived in-memory
//! auction state, so any number of engine instances can run behind a
//! load balancer.
//!
//! # Example
//! ```no_run
//! # use gavel_engine::{AuctionEngine, CreateAuction};
//! # use gavel_common::prelude::*;
//! # use chrono::{Duration, Utc};
//! # #[tokio::main]
//! # async fn main() -> Result<(), BidError> {
//! let engine = AuctionEngine::with_memory_store(EngineConfig::default());
//!
//! let now = Utc::now();
//! let auction_id = engine
//!     .create_auction(CreateAuction {
//!         start_price: 10_000,
//!         bid_increment: 500,
//!         start_time: now,
//!         end_time: now + Duration::hours(24),
//!         extend_rule: ExtendRule { enabled: true, trigger_window_secs: 60, extend_by_secs: 60 },
//!     }, now)
//!     .await?;
//!
//! let state = engine
//!     .place_bid(auction_id, UserId::new(), 10_500, Utc::now())
//!     .await?;
//! assert_eq!(state.current_price, 10_500);
//! # Ok(()) }
//! ```

pub mod engine;
pub mod executor;
pub mod extender;
pub mod lifecycle;
pub mod proxy;
pub mod validator;

pub use engine::{AuctionEngine, CreateAuction};
pub use executor::BidRequest;
