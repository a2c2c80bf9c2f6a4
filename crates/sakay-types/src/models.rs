use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery state of a message. Stored in the backend's `message_status`
/// column; rows that predate the column decode as `Sent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
    System,
}

impl MessageStatus {
    /// Decode the raw column value. Unknown or missing values map to `Sent`.
    pub fn from_column(value: Option<&str>) -> Self {
        match value {
            Some("delivered") => Self::Delivered,
            Some("read") => Self::Read,
            Some("system") => Self::System,
            _ => Self::Sent,
        }
    }

    pub fn as_column(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::System => "system",
        }
    }
}

/// One unit of a two-party conversation.
///
/// The backend row has two fixed participant slots: `rider_id` is the slot
/// the author writes into, `passenger_id` is the participant the message is
/// addressed to. A message always has exactly one of each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Assigned by the backend on insert; the client never makes one up.
    pub id: i64,
    /// Sender slot.
    pub rider_id: Uuid,
    /// Counterparty slot.
    pub passenger_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Mutated only by the reader (the participant who did not send it).
    pub read: bool,
    pub status: MessageStatus,
    /// Booking reference for ride-scoped conversations.
    pub ride_id: Option<i64>,
}

impl Message {
    /// The participant who authored the message.
    pub fn sender_id(&self) -> Uuid {
        self.rider_id
    }

    /// The other participant, relative to `user`.
    ///
    /// If `user` occupies neither slot this returns the sender slot; callers
    /// filter on [`Message::involves`] first when that matters.
    pub fn counterparty_of(&self, user: Uuid) -> Uuid {
        if self.rider_id == user {
            self.passenger_id
        } else {
            self.rider_id
        }
    }

    /// Whether `user` occupies either participant slot.
    pub fn involves(&self, user: Uuid) -> bool {
        self.rider_id == user || self.passenger_id == user
    }
}

/// A coordinate pair as stored in the bookings table's `location` column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// A ride booking. Messages reference bookings through `Message::ride_id`
/// to scope a conversation to one ride.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub rider_id: Uuid,
    pub location: GeoPoint,
    pub rating: Option<f32>,
    pub created_at: DateTime<Utc>,
}

/// The signed-in user as resolved by the auth collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    /// Provider-defined profile blob (names, avatar url, driver flag, ...).
    /// Opaque to this subsystem.
    pub metadata: serde_json::Value,
}
