//! Boundary traits for the hosted backend.
//!
//! Session handling, row persistence and realtime fan-out are delegated to
//! a backend-as-a-service. This crate defines the capabilities the client
//! consumes, as injectable `Arc<dyn Trait>` ports so the sync core can be
//! driven by in-memory doubles in tests:
//!
//! - `AuthProvider`: who is signed in
//! - `RowStore`: select/insert/update rows of a table
//! - `ChangeFeed`: subscribe to a stream of row-change events
//!
//! No implementation lives here; sakay-testkit carries the in-memory ones.

pub mod auth;
pub mod feed;
pub mod rows;

pub use auth::AuthProvider;
pub use feed::{ChangeFeed, FeedFilter, FeedLease};
pub use rows::{Clause, Cmp, RowFilter, RowStore, SortOrder, compare_values};
