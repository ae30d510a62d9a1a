//! Store adapters for Tollgate
//!
//! The core only sees two traits:
//! - [`SessionStore`]: user records, the active refresh token and the revoked trail
//! - [`CounterStore`]: atomic increment-with-expiry for rate limiting
//!
//! Postgres and Redis back them in production; the in-memory versions serve
//! tests and single-node development.

pub mod counter;
pub mod session;
pub mod user;

pub use counter::{
    CounterHit, CounterStore, FallbackCounterStore, InMemoryCounterStore, RedisCounterStore,
};
pub use session::{InMemorySessionStore, SessionStore};
pub use user::PgSessionStore;
