use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use sakay_backend::{RowFilter, RowStore, SortOrder};
use sakay_types::{Message, MessageStatus, QueryError, StoreError};

use crate::rows::decode_message;

pub const MESSAGES_TABLE: &str = "messages";

/// Query/insert façade over the messages table.
///
/// Takes explicit participant ids; resolving the signed-in user is the
/// sync engine's job, so this stays a pure row façade.
#[derive(Clone)]
pub struct MessageRepository {
    store: Arc<dyn RowStore>,
}

impl MessageRepository {
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        Self { store }
    }

    /// All messages where `user_id` occupies either participant slot,
    /// newest first. `since` narrows to rows created strictly after the
    /// given instant (the incremental-refresh path).
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>, QueryError> {
        let mut filter = RowFilter::new()
            .or_eq("rider_id", json!(user_id))
            .or_eq("passenger_id", json!(user_id))
            .order_by("created_at", SortOrder::Descending);
        if let Some(ts) = since {
            filter = filter.gt("created_at", json!(ts));
        }

        let rows = self.store.select(MESSAGES_TABLE, &filter).await?;
        debug!("store: fetched {} message rows for {}", rows.len(), user_id);
        rows.iter().map(decode_message).collect()
    }

    /// Insert one message row and return it with the backend-assigned id.
    pub async fn insert(
        &self,
        sender_id: Uuid,
        counterparty_id: Uuid,
        content: &str,
        ride_id: Option<i64>,
    ) -> Result<Message, StoreError> {
        if content.is_empty() {
            return Err(StoreError::Validation("message content is empty".into()));
        }
        if counterparty_id.is_nil() {
            return Err(StoreError::Validation("missing counterparty".into()));
        }

        let mut row = json!({
            "rider_id": sender_id,
            "passenger_id": counterparty_id,
            "content": content,
            "read": false,
            "message_status": MessageStatus::Sent.as_column(),
        });
        if let Some(ride) = ride_id {
            row["ride_id"] = json!(ride);
        }

        let stored = self
            .store
            .insert(MESSAGES_TABLE, row)
            .await
            .map_err(StoreError::Query)?;
        decode_message(&stored).map_err(StoreError::Query)
    }

    /// Flip the read flag on one message. Idempotent: re-marking an
    /// already-read row is a successful no-op.
    pub async fn mark_read(&self, message_id: i64) -> Result<(), QueryError> {
        let patch = json!({ "read": true, "message_status": MessageStatus::Read.as_column() });
        self.store.update(MESSAGES_TABLE, message_id, patch).await?;
        Ok(())
    }
}
