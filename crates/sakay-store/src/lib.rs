//! Repository façades over the backend row store.
//!
//! Thin by design: these shape insert payloads, translate query intent into
//! [`sakay_backend::RowFilter`]s, and map raw JSON rows into the
//! sakay-types models. No caching, no merging; that is sakay-sync's job.

pub mod bookings;
pub mod messages;
pub mod rows;

pub use bookings::{BOOKINGS_TABLE, BookingRepository};
pub use messages::{MESSAGES_TABLE, MessageRepository};
