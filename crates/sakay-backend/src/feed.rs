use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use sakay_types::{FeedError, RowChange};

/// Scope of one change-feed subscription: row changes on `table` where
/// `participant` occupies either participant slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedFilter {
    pub table: String,
    pub participant: Uuid,
}

impl FeedFilter {
    pub fn table_for(table: &str, participant: Uuid) -> Self {
        Self { table: table.to_string(), participant }
    }
}

/// Handle for one established subscription.
///
/// Events arrive on `events` in feed order, at least once. Dropping the
/// lease releases the subscription on the backend side; the channel
/// closing the other way means the feed died and the consumer should
/// reconnect.
pub struct FeedLease {
    pub events: mpsc::Receiver<RowChange>,
}

impl FeedLease {
    pub fn new(events: mpsc::Receiver<RowChange>) -> Self {
        Self { events }
    }
}

/// Realtime capability of the hosted backend.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// One subscription attempt. Establishment can fail; retry policy is
    /// the caller's concern.
    async fn open(&self, filter: FeedFilter) -> Result<FeedLease, FeedError>;
}
