//! Common test utilities for API integration tests
//!
//! Fixtures build an [`AuthService`](tollgate_api::AuthService) over the
//! in-memory session store with a pre-generated key pool, so tests need no
//! database and do not pay for RSA generation on every login.

#![allow(unused_imports)]

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
