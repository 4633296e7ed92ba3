//! Query cache for the domain collection.
//!
//! This module keeps fetched pages coherent across consumers:
//! - One entry per (resource, page, limit) key
//! - At most one fetch in flight per key; late subscribers share its result
//! - Invalidation by resource marks every page Stale and refetches observed ones
//! - Subscribers are notified through callbacks, in subscription order, and
//!   never see an older state after a newer one

mod entry;
mod key;
mod notify;
mod store;

pub use entry::{Listener, QuerySnapshot, QueryStatus};
pub use key::{QueryKey, DOMAINS};
pub use store::{CacheOptions, QueryCache, Subscription};
