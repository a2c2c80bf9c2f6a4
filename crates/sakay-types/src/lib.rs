//! Shared types for the sakay messaging client.
//!
//! Domain models, change-feed event types, and the error taxonomy used
//! across the repository and sync crates. Everything here is plain data;
//! the hosted backend that produces these rows lives behind the traits in
//! sakay-backend.

pub mod error;
pub mod events;
pub mod models;

pub use error::{AuthError, FeedError, QueryError, StoreError};
pub use events::{ChangeOp, RowChange};
pub use models::{AuthUser, Booking, GeoPoint, Message, MessageStatus};
