//! Raw row shapes for the backend tables, distinct from the sakay-types
//! models so schema quirks (missing columns, status as text) stay here.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use sakay_types::{Booking, GeoPoint, Message, MessageStatus, QueryError};

#[derive(Debug, Deserialize)]
struct MessageRow {
    id: i64,
    rider_id: uuid::Uuid,
    passenger_id: uuid::Uuid,
    content: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    read: bool,
    #[serde(default)]
    message_status: Option<String>,
    #[serde(default)]
    ride_id: Option<i64>,
}

impl MessageRow {
    fn into_message(self) -> Message {
        Message {
            id: self.id,
            rider_id: self.rider_id,
            passenger_id: self.passenger_id,
            content: self.content,
            // Rows written before the column existed carry no timestamp.
            // Fall back to "now" so the row is displayable, but never trust
            // this value for ordering across sources.
            created_at: self.created_at.unwrap_or_else(Utc::now),
            read: self.read,
            status: MessageStatus::from_column(self.message_status.as_deref()),
            ride_id: self.ride_id,
        }
    }
}

/// Decode one messages-table row. Used for both fetched rows and
/// change-feed payloads so the two sources agree on every fallback rule.
pub fn decode_message(row: &Value) -> Result<Message, QueryError> {
    serde_json::from_value::<MessageRow>(row.clone())
        .map(MessageRow::into_message)
        .map_err(|e| QueryError::Decode(e.to_string()))
}

#[derive(Debug, Deserialize)]
struct BookingRow {
    id: i64,
    rider_id: uuid::Uuid,
    location: GeoPoint,
    #[serde(default)]
    rating: Option<f32>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

pub fn decode_booking(row: &Value) -> Result<Booking, QueryError> {
    let row: BookingRow =
        serde_json::from_value(row.clone()).map_err(|e| QueryError::Decode(e.to_string()))?;
    Ok(Booking {
        id: row.id,
        rider_id: row.rider_id,
        location: row.location,
        rating: row.rating,
        created_at: row.created_at.unwrap_or_else(Utc::now),
    })
}
